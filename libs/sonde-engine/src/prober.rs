use crate::classify::{self, FraudChecker};
use crate::dial::{DialProvider, Dialer, OutboundRegistry};
use crate::error::{GeoError, ProbeError};
use crate::geo::{self, GeoProvider};
use crate::httping::{self, HttpProbe, PROBE_TIMEOUT};
use chrono::Utc;
use sonde_db::models::{Outbound, ProbeResult};
use sonde_db::repositories::OutboundStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// TCP handshake budget for the reachability check.
pub const TCP_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

const LATENCY_ENDPOINT: &str = "www.gstatic.com:80";
const LATENCY_HOST: &str = "www.gstatic.com";

/// Per-tag probing pipeline: reachability, true delay, landing-IP race,
/// classification, idempotent persist. Holds no mutable state; cheap to clone
/// into batch tasks.
#[derive(Clone)]
pub struct Prober {
    pub(crate) store: Arc<dyn OutboundStore>,
    dial_provider: DialProvider,
    geo_providers: Vec<Arc<dyn GeoProvider>>,
    fraud: FraudChecker,
}

impl Prober {
    pub fn new(store: Arc<dyn OutboundStore>, registry: Option<Arc<dyn OutboundRegistry>>) -> Self {
        Self {
            store,
            dial_provider: DialProvider::new(registry),
            geo_providers: geo::default_providers(),
            fraud: FraudChecker::new(),
        }
    }

    /// Swap the geolocation backends (tests use synthetic ones).
    pub fn with_geo_providers(mut self, providers: Vec<Arc<dyn GeoProvider>>) -> Self {
        self.geo_providers = providers;
        self
    }

    pub fn with_fraud_checker(mut self, fraud: FraudChecker) -> Self {
        self.fraud = fraud;
        self
    }

    /// Reachability and TCP latency only.
    pub async fn test_outbound(&self, tag: &str) -> Result<ProbeResult, ProbeError> {
        let outbound = self.lookup(tag).await?;
        Ok(self
            .probe_outbound(&outbound, false, &CancellationToken::new())
            .await)
    }

    /// Full pipeline: reachability, true delay, landing IP, classification.
    pub async fn test_outbound_with_landing(&self, tag: &str) -> Result<ProbeResult, ProbeError> {
        let outbound = self.lookup(tag).await?;
        Ok(self
            .probe_outbound(&outbound, true, &CancellationToken::new())
            .await)
    }

    /// Merge an externally held result onto the row, for callers that probed
    /// without persistence.
    pub async fn save_test_result(&self, result: &ProbeResult) -> anyhow::Result<()> {
        self.store.apply_probe_update(&result.tag, result).await
    }

    async fn lookup(&self, tag: &str) -> Result<Outbound, ProbeError> {
        self.store
            .get_by_tag(tag)
            .await
            .map_err(ProbeError::Store)?
            .ok_or_else(|| ProbeError::RowNotFound(tag.to_string()))
    }

    /// Run the state machine for one outbound. Never fails: every outcome,
    /// including errors, lands in the returned `ProbeResult`. A cancelled
    /// probe is returned as-is without being persisted.
    pub(crate) async fn probe_outbound(
        &self,
        outbound: &Outbound,
        enrich: bool,
        cancel: &CancellationToken,
    ) -> ProbeResult {
        let mut result = ProbeResult::new(&outbound.tag, "", 0);

        let ep = match outbound.endpoint() {
            Ok(ep) => ep,
            Err(e) => {
                result.set_error(e);
                self.persist(&mut result).await;
                return result;
            }
        };
        result.server = ep.server.clone();
        result.port = ep.server_port;

        if outbound.kind.is_udp_only() {
            // No TCP listener to shake hands with; QUIC-side reachability is
            // the proxy runtime's concern. Enrichment is skipped with it.
            result.available = true;
            result.latency = 0;
            self.persist(&mut result).await;
            return result;
        }

        let addr = format!("{}:{}", ep.server, ep.server_port);
        let started = Instant::now();
        let connected = tokio::select! {
            _ = cancel.cancelled() => return result,
            out = tokio::time::timeout(TCP_PROBE_TIMEOUT, TcpStream::connect(&addr)) => out,
        };
        match connected {
            Ok(Ok(stream)) => {
                result.latency = (started.elapsed().as_millis() as i32).max(1);
                result.available = true;
                drop(stream);
            }
            Ok(Err(e)) => {
                result.available = false;
                result.latency = -1;
                result.set_error(format!("connect {addr}: {e}"));
                self.persist(&mut result).await;
                return result;
            }
            Err(_) => {
                result.available = false;
                result.latency = -1;
                result.set_error(format!(
                    "connect {addr}: timed out after {TCP_PROBE_TIMEOUT:?}"
                ));
                self.persist(&mut result).await;
                return result;
            }
        }

        if !enrich {
            self.persist(&mut result).await;
            return result;
        }

        let dialer = match self.dial_provider.resolve(outbound) {
            Ok(dialer) => dialer,
            Err(e) => {
                // Reachability stands; only the tunnelled stages are off the
                // table without a dial capability.
                result.set_error(e);
                self.persist(&mut result).await;
                return result;
            }
        };

        match self.real_latency(&dialer).await {
            Ok(ms) => result.real_latency = ms,
            Err(e) => {
                debug!("true-delay probe for {} failed: {}", outbound.tag, e);
                result.real_latency = 0;
            }
        }
        if cancel.is_cancelled() {
            return result;
        }

        match geo::race(&self.geo_providers, &dialer, cancel).await {
            Ok(probe) => {
                if result.real_latency == 0 {
                    result.real_latency = probe.elapsed_ms.max(1);
                }
                if let Some(kind) = classify::infer_ip_type(&probe.info.isp, &probe.info.hostname)
                {
                    result.ip_type = kind.to_string();
                }
                result.landing_ip = probe.info.ip;
                result.country = probe.info.country;
                result.region = probe.info.region;
                result.city = probe.info.city;
                result.isp = probe.info.isp;
            }
            Err(GeoError::Cancelled) => return result,
            Err(e) => result.set_error(e),
        }

        if !result.landing_ip.is_empty() && !cancel.is_cancelled() {
            match tokio::time::timeout(
                PROBE_TIMEOUT,
                self.fraud.score(&dialer, &result.landing_ip),
            )
            .await
            {
                Ok(Ok(score)) => result.fraud_score = score,
                Ok(Err(e)) => debug!("fraud lookup for {} failed: {}", result.landing_ip, e),
                Err(_) => debug!("fraud lookup for {} timed out", result.landing_ip),
            }
        }

        self.persist(&mut result).await;
        result
    }

    /// HEAD a fixed fast endpoint through the tunnel; one byte of response is
    /// enough to stamp the true delay.
    async fn real_latency(&self, dialer: &Arc<dyn Dialer>) -> Result<i32, GeoError> {
        let fut = async {
            let mut conn = dialer.dial(LATENCY_ENDPOINT).await?;
            let probe = HttpProbe {
                method: "HEAD",
                path: "/generate_204",
                host: LATENCY_HOST,
                extra_headers: &[],
            };
            let resp = httping::send_probe(conn.as_mut(), &probe, 1).await?;
            Ok::<i32, GeoError>(resp.elapsed_ms.max(1))
        };
        tokio::time::timeout(PROBE_TIMEOUT, fut)
            .await
            .map_err(|_| GeoError::Timeout)?
    }

    async fn persist(&self, result: &mut ProbeResult) {
        result.last_test_time = Utc::now().timestamp();
        if let Err(e) = self.store.apply_probe_update(&result.tag, result).await {
            warn!("failed to persist probe result for {}: {:#}", result.tag, e);
        }
    }
}
