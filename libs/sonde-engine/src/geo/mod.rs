//! Landing-IP discovery. Four interchangeable providers issue a tunnelled
//! HTTP request through the node's own outbound route and normalize whatever
//! comes back; a race keeps the first answer carrying a non-empty IP.

pub mod ip_api;
pub mod ipinfo;
pub mod ipwhois;
pub mod ping0;

pub use ip_api::IpApi;
pub use ipinfo::IpInfo;
pub use ipwhois::IpWhois;
pub use ping0::Ping0;

use crate::dial::Dialer;
use crate::error::GeoError;
use crate::httping::{self, HttpProbe, PROBE_TIMEOUT, ProbeResponse};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Normalized geolocation record, whichever provider produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoInfo {
    pub ip: String,
    pub country: String,
    pub region: String,
    pub city: String,
    pub isp: String,
    pub hostname: String,
}

pub struct GeoProbe {
    pub info: GeoInfo,
    /// First-byte latency of the lookup, usable as a realLatency fallback.
    pub elapsed_ms: i32,
}

#[async_trait]
pub trait GeoProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn lookup(&self, dialer: Arc<dyn Dialer>) -> Result<GeoProbe, GeoError>;
}

pub fn default_providers() -> Vec<Arc<dyn GeoProvider>> {
    vec![
        Arc::new(IpApi),
        Arc::new(IpInfo),
        Arc::new(IpWhois),
        Arc::new(Ping0),
    ]
}

/// Dial the pinned endpoint and run one probe request over it.
pub(crate) async fn fetch(
    dialer: &Arc<dyn Dialer>,
    endpoint: &str,
    probe: &HttpProbe<'_>,
    buf_size: usize,
) -> Result<ProbeResponse, GeoError> {
    let mut conn = dialer.dial(endpoint).await?;
    let resp = httping::send_probe(conn.as_mut(), probe, buf_size).await?;
    Ok(resp)
}

/// Fan out every provider and take the first result with a non-empty `ip`;
/// losers are aborted. Ties resolve by arrival order, not provider order.
pub async fn race(
    providers: &[Arc<dyn GeoProvider>],
    dialer: &Arc<dyn Dialer>,
    cancel: &CancellationToken,
) -> Result<GeoProbe, GeoError> {
    let mut set = JoinSet::new();
    for provider in providers {
        let provider = provider.clone();
        let dialer = dialer.clone();
        set.spawn(async move {
            let name = provider.name();
            match tokio::time::timeout(PROBE_TIMEOUT, provider.lookup(dialer)).await {
                Ok(outcome) => (name, outcome),
                Err(_) => (name, Err(GeoError::Timeout)),
            }
        });
    }

    loop {
        let joined = tokio::select! {
            _ = cancel.cancelled() => {
                set.abort_all();
                return Err(GeoError::Cancelled);
            }
            joined = set.join_next() => joined,
        };
        match joined {
            None => return Err(GeoError::Exhausted),
            Some(Ok((name, Ok(probe)))) if !probe.info.ip.is_empty() => {
                debug!("geo race won by {}", name);
                set.abort_all();
                return Ok(probe);
            }
            Some(Ok((name, Ok(_)))) => debug!("geo provider {} returned an empty ip", name),
            Some(Ok((name, Err(e)))) => debug!("geo provider {} failed: {}", name, e),
            Some(Err(e)) => debug!("geo task join failed: {}", e),
        }
    }
}
