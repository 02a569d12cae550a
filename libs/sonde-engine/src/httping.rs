//! Minimal HTTP/1.1 probing over a pre-dialled stream. No redirects, no
//! connection reuse, no chunked decoding: the providers we talk to answer a
//! single request with a small payload and close.

use crate::dial::BoxedConn;
use crate::error::DialError;
use once_cell::sync::Lazy;
use rustls::pki_types::ServerName;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_rustls::TlsConnector;

pub const DEFAULT_BUF: usize = 4096;
/// For providers returning larger text bodies (ping0, scamalytics).
pub const LARGE_BUF: usize = 8192;

pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// End-to-end budget for a single tunnelled probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

pub struct HttpProbe<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub host: &'a str,
    pub extra_headers: &'a [(&'a str, &'a str)],
}

impl HttpProbe<'_> {
    fn render(&self) -> String {
        let mut req = format!(
            "{} {} HTTP/1.1\r\nHost: {}\r\n",
            self.method, self.path, self.host
        );
        for (name, value) in self.extra_headers {
            req.push_str(name);
            req.push_str(": ");
            req.push_str(value);
            req.push_str("\r\n");
        }
        req.push_str("Connection: close\r\n\r\n");
        req
    }
}

#[derive(Debug)]
pub struct ProbeResponse {
    pub head: Vec<u8>,
    pub body: Vec<u8>,
    /// Time from write-complete to the first successful read.
    pub elapsed_ms: i32,
}

/// Write the request and read the response into a fixed buffer. EOF after any
/// payload counts as success; EOF before the first byte is an error.
pub async fn send_probe<S>(
    conn: &mut S,
    probe: &HttpProbe<'_>,
    buf_size: usize,
) -> io::Result<ProbeResponse>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    conn.write_all(probe.render().as_bytes()).await?;
    conn.flush().await?;

    let started = Instant::now();
    let mut buf = vec![0u8; buf_size];
    let mut filled = 0usize;
    let mut first_read_ms: Option<i32> = None;

    while filled < buf.len() {
        match conn.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => {
                if first_read_ms.is_none() {
                    first_read_ms = Some(started.elapsed().as_millis() as i32);
                }
                filled += n;
            }
            // A reset after payload still carries a usable response.
            Err(_) if filled > 0 => break,
            Err(e) => return Err(e),
        }
    }

    let elapsed_ms = first_read_ms.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed before any response byte",
        )
    })?;

    buf.truncate(filled);
    let (head, body) = match body_offset(&buf) {
        Some(at) => {
            let body = buf.split_off(at);
            let mut head = buf;
            head.truncate(head.len() - 4);
            (head, body)
        }
        None => (buf, Vec::new()),
    };

    Ok(ProbeResponse {
        head,
        body,
        elapsed_ms,
    })
}

fn body_offset(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|at| at + 4)
}

static TLS_CONFIG: Lazy<Arc<rustls::ClientConfig>> = Lazy::new(|| {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .expect("client config must be valid")
    .with_root_certificates(roots)
    .with_no_client_auth();
    Arc::new(config)
});

/// TLS-wrap an already dialled stream, verifying against the webpki roots.
pub async fn wrap_tls(conn: BoxedConn, server_name: &str) -> Result<BoxedConn, DialError> {
    let name = ServerName::try_from(server_name.to_string())
        .map_err(|_| DialError::InvalidConfig(format!("invalid TLS server name {server_name}")))?;
    let connector = TlsConnector::from(TLS_CONFIG.clone());
    let stream = tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, connector.connect(name, conn))
        .await
        .map_err(|_| DialError::Timeout(TLS_HANDSHAKE_TIMEOUT))?
        .map_err(DialError::Io)?;
    Ok(Box::new(stream))
}
