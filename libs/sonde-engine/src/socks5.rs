//! Minimal client-side SOCKS5 (RFC 1928/1929): greeting, optional
//! username/password auth, CONNECT. Enough to route probe traffic through a
//! plain SOCKS outbound without the proxy runtime.

use crate::error::DialError;
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_USERPASS: u8 = 0x02;
const METHOD_UNACCEPTABLE: u8 = 0xff;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// Negotiate a CONNECT to `dest` (`host:port`) on an established stream.
pub async fn handshake<S>(
    stream: &mut S,
    dest: &str,
    auth: Option<(&str, &str)>,
) -> Result<(), DialError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Method negotiation. Offer user/pass alongside no-auth when credentials
    // are configured; the server picks.
    let greeting: &[u8] = match auth {
        Some(_) => &[VERSION, 2, METHOD_NO_AUTH, METHOD_USERPASS],
        None => &[VERSION, 1, METHOD_NO_AUTH],
    };
    stream.write_all(greeting).await?;

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;
    if reply[0] != VERSION {
        return Err(DialError::Socks5(format!(
            "server speaks version {:#04x}",
            reply[0]
        )));
    }
    match reply[1] {
        METHOD_NO_AUTH => {}
        METHOD_USERPASS => {
            let (user, pass) =
                auth.ok_or_else(|| DialError::Socks5("server demands credentials".to_string()))?;
            authenticate(stream, user, pass).await?;
        }
        METHOD_UNACCEPTABLE => {
            return Err(DialError::Socks5("no acceptable auth method".to_string()));
        }
        other => {
            return Err(DialError::Socks5(format!(
                "unsupported auth method {other:#04x}"
            )));
        }
    }

    // CONNECT request.
    let mut request = vec![VERSION, CMD_CONNECT, 0x00];
    encode_dest(&mut request, dest)?;
    stream.write_all(&request).await?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[1] != 0x00 {
        return Err(DialError::Socks5(reply_message(head[1]).to_string()));
    }

    // Drain the bound address so the stream is positioned at payload bytes.
    let addr_len = match head[3] {
        ATYP_IPV4 => 4,
        ATYP_IPV6 => 16,
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            len[0] as usize
        }
        other => {
            return Err(DialError::Socks5(format!(
                "unknown bound address type {other:#04x}"
            )));
        }
    };
    let mut bound = vec![0u8; addr_len + 2];
    stream.read_exact(&mut bound).await?;

    Ok(())
}

async fn authenticate<S>(stream: &mut S, user: &str, pass: &str) -> Result<(), DialError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if user.len() > 255 || pass.len() > 255 {
        return Err(DialError::Socks5("credentials longer than 255 bytes".to_string()));
    }
    let mut msg = Vec::with_capacity(3 + user.len() + pass.len());
    msg.push(0x01); // auth sub-negotiation version
    msg.push(user.len() as u8);
    msg.extend_from_slice(user.as_bytes());
    msg.push(pass.len() as u8);
    msg.extend_from_slice(pass.as_bytes());
    stream.write_all(&msg).await?;

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;
    if reply[1] != 0x00 {
        return Err(DialError::Socks5("authentication rejected".to_string()));
    }
    Ok(())
}

fn encode_dest(request: &mut Vec<u8>, dest: &str) -> Result<(), DialError> {
    let (host, port) = dest
        .rsplit_once(':')
        .ok_or_else(|| DialError::Socks5(format!("destination {dest:?} is not host:port")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| DialError::Socks5(format!("bad port in destination {dest:?}")))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');

    if let Ok(v4) = host.parse::<Ipv4Addr>() {
        request.push(ATYP_IPV4);
        request.extend_from_slice(&v4.octets());
    } else if let Ok(v6) = host.parse::<Ipv6Addr>() {
        request.push(ATYP_IPV6);
        request.extend_from_slice(&v6.octets());
    } else {
        if host.is_empty() || host.len() > 255 {
            return Err(DialError::Socks5(format!("bad host in destination {dest:?}")));
        }
        request.push(ATYP_DOMAIN);
        request.push(host.len() as u8);
        request.extend_from_slice(host.as_bytes());
    }
    request.extend_from_slice(&port.to_be_bytes());
    Ok(())
}

fn reply_message(code: u8) -> &'static str {
    match code {
        0x01 => "general SOCKS server failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown SOCKS reply code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn read_connect(server: &mut TcpStream) -> (u8, Vec<u8>) {
        let mut head = [0u8; 4];
        server.read_exact(&mut head).await.unwrap();
        assert_eq!(head[0], VERSION);
        assert_eq!(head[1], CMD_CONNECT);
        let addr = match head[3] {
            ATYP_IPV4 => {
                let mut buf = vec![0u8; 4 + 2];
                server.read_exact(&mut buf).await.unwrap();
                buf
            }
            ATYP_DOMAIN => {
                let mut len = [0u8; 1];
                server.read_exact(&mut len).await.unwrap();
                let mut buf = vec![0u8; len[0] as usize + 2];
                server.read_exact(&mut buf).await.unwrap();
                buf
            }
            other => panic!("unexpected atyp {other}"),
        };
        (head[3], addr)
    }

    async fn write_success(server: &mut TcpStream) {
        server
            .write_all(&[VERSION, 0x00, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn connects_without_auth() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut greeting = [0u8; 3];
            stream.read_exact(&mut greeting).await.unwrap();
            assert_eq!(greeting, [VERSION, 1, METHOD_NO_AUTH]);
            stream.write_all(&[VERSION, METHOD_NO_AUTH]).await.unwrap();

            let (atyp, addr) = read_connect(&mut stream).await;
            assert_eq!(atyp, ATYP_DOMAIN);
            assert_eq!(&addr[..11], b"example.com");
            assert_eq!(&addr[11..], &80u16.to_be_bytes());
            write_success(&mut stream).await;
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        handshake(&mut client, "example.com:80", None).await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connects_with_userpass() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut greeting = [0u8; 4];
            stream.read_exact(&mut greeting).await.unwrap();
            assert_eq!(greeting, [VERSION, 2, METHOD_NO_AUTH, METHOD_USERPASS]);
            stream.write_all(&[VERSION, METHOD_USERPASS]).await.unwrap();

            let mut auth_head = [0u8; 2];
            stream.read_exact(&mut auth_head).await.unwrap();
            assert_eq!(auth_head[0], 0x01);
            let mut user = vec![0u8; auth_head[1] as usize];
            stream.read_exact(&mut user).await.unwrap();
            assert_eq!(user, b"u");
            let mut pass_len = [0u8; 1];
            stream.read_exact(&mut pass_len).await.unwrap();
            let mut pass = vec![0u8; pass_len[0] as usize];
            stream.read_exact(&mut pass).await.unwrap();
            assert_eq!(pass, b"secret");
            stream.write_all(&[0x01, 0x00]).await.unwrap();

            let (atyp, _) = read_connect(&mut stream).await;
            assert_eq!(atyp, ATYP_IPV4);
            write_success(&mut stream).await;
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        handshake(&mut client, "1.2.3.4:443", Some(("u", "secret")))
            .await
            .unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn surfaces_connection_refused_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut greeting = [0u8; 3];
            stream.read_exact(&mut greeting).await.unwrap();
            stream.write_all(&[VERSION, METHOD_NO_AUTH]).await.unwrap();
            let _ = read_connect(&mut stream).await;
            stream
                .write_all(&[VERSION, 0x05, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0])
                .await
                .unwrap();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let err = handshake(&mut client, "example.com:80", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn rejects_servers_without_acceptable_method() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut greeting = [0u8; 3];
            stream.read_exact(&mut greeting).await.unwrap();
            stream
                .write_all(&[VERSION, METHOD_UNACCEPTABLE])
                .await
                .unwrap();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let err = handshake(&mut client, "example.com:80", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no acceptable auth method"));
    }
}
