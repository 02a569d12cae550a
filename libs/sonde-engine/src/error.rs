use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by single-tag probe entry points.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no outbound with tag {0}")]
    RowNotFound(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Failures of resolving or exercising a dial capability.
#[derive(Debug, Error)]
pub enum DialError {
    /// A non-SOCKS5 outbound needs the co-running proxy engine.
    #[error("sing-box not running (required for non-SOCKS5 protocols)")]
    EngineUnavailable,
    #[error("no outbound adapter registered for tag {0}")]
    UnknownOutbound(String),
    #[error("invalid outbound config: {0}")]
    InvalidConfig(String),
    #[error("dial timed out after {0:?}")]
    Timeout(Duration),
    #[error("socks5 handshake failed: {0}")]
    Socks5(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Adapter(#[from] anyhow::Error),
}

/// Failures of the landing-IP lookup pipeline.
#[derive(Debug, Error)]
pub enum GeoError {
    #[error(transparent)]
    Dial(#[from] DialError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("unparseable response: {0}")]
    Parse(String),
    #[error("lookup timed out")]
    Timeout,
    #[error("all IP lookup services failed")]
    Exhausted,
    #[error("probe cancelled")]
    Cancelled,
}
