use crate::error::DialError;
use crate::socks5;
use async_trait::async_trait;
use sonde_db::models::{Outbound, OutboundType};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

pub const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Bidirectional byte stream bound to some outbound route.
pub trait ProxyConnection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ProxyConnection for T {}

pub type BoxedConn = Box<dyn ProxyConnection>;

/// A bound outbound supplied by the co-running proxy engine. `dest` is
/// `host:port`; name resolution happens on the far side of the tunnel.
#[async_trait]
pub trait OutboundAdapter: Send + Sync {
    async fn dial(&self, dest: &str) -> anyhow::Result<BoxedConn>;
}

/// Lookup surface of the external proxy runtime. Injected at construction so
/// the engine stays testable with a mock adapter.
pub trait OutboundRegistry: Send + Sync {
    fn lookup(&self, tag: &str) -> Option<Arc<dyn OutboundAdapter>>;
}

/// Stateless dial capability handed to the probe layers.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, dest: &str) -> Result<BoxedConn, DialError>;
}

/// Self-contained client-side SOCKS5 dialer. The only protocol the engine can
/// drive without the proxy runtime.
pub struct SocksDialer {
    server: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
}

impl SocksDialer {
    pub fn new(server: String, port: u16, username: Option<String>, password: Option<String>) -> Self {
        Self {
            server,
            port,
            username,
            password,
        }
    }
}

#[async_trait]
impl Dialer for SocksDialer {
    async fn dial(&self, dest: &str) -> Result<BoxedConn, DialError> {
        let addr = format!("{}:{}", self.server, self.port);
        let mut stream = tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| DialError::Timeout(DIAL_TIMEOUT))??;

        let auth = self
            .username
            .as_deref()
            .filter(|u| !u.is_empty())
            .map(|u| (u, self.password.as_deref().unwrap_or("")));
        socks5::handshake(&mut stream, dest, auth).await?;

        Ok(Box::new(stream))
    }
}

struct AdapterDialer {
    adapter: Arc<dyn OutboundAdapter>,
}

#[async_trait]
impl Dialer for AdapterDialer {
    async fn dial(&self, dest: &str) -> Result<BoxedConn, DialError> {
        self.adapter.dial(dest).await.map_err(DialError::Adapter)
    }
}

/// Resolves an outbound row to a concrete dial capability. This is the only
/// component aware of the external proxy runtime dependency.
#[derive(Clone, Default)]
pub struct DialProvider {
    registry: Option<Arc<dyn OutboundRegistry>>,
}

impl DialProvider {
    pub fn new(registry: Option<Arc<dyn OutboundRegistry>>) -> Self {
        Self { registry }
    }

    pub fn resolve(&self, outbound: &Outbound) -> Result<Arc<dyn Dialer>, DialError> {
        if outbound.kind == OutboundType::Socks {
            let ep = outbound
                .endpoint()
                .map_err(|e| DialError::InvalidConfig(e.to_string()))?;
            return Ok(Arc::new(SocksDialer::new(
                ep.server,
                ep.server_port,
                ep.username,
                ep.password,
            )));
        }

        let registry = self.registry.as_ref().ok_or(DialError::EngineUnavailable)?;
        let adapter = registry
            .lookup(&outbound.tag)
            .ok_or_else(|| DialError::UnknownOutbound(outbound.tag.clone()))?;
        Ok(Arc::new(AdapterDialer { adapter }))
    }
}
