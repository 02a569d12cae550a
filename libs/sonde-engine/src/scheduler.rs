//! Batch probing: a semaphore-bounded worker pool over tag sets with
//! cancellation and per-task error isolation.

use crate::prober::Prober;
use sonde_db::models::{Outbound, ProbeResult};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default worker count for reachability-only sweeps.
pub const DEFAULT_PROBE_CONCURRENCY: usize = 50;
/// Default worker count for the enriched pipeline; the geolocation services
/// throttle aggressively.
pub const DEFAULT_ENRICH_CONCURRENCY: usize = 10;

impl Prober {
    /// Probe every non-synthetic outbound. `concurrency = 0` picks the
    /// default for the selected pipeline.
    pub async fn test_all(
        &self,
        concurrency: usize,
        with_enrichment: bool,
        cancel: CancellationToken,
    ) -> anyhow::Result<Vec<ProbeResult>> {
        let outbounds = self.store.list_probeable().await?;
        Ok(self
            .run_batch(outbounds, concurrency, with_enrichment, cancel)
            .await)
    }

    /// Probe the given tags; unknown tags are silently dropped.
    pub async fn test_selected(
        &self,
        tags: &[String],
        concurrency: usize,
        with_enrichment: bool,
        cancel: CancellationToken,
    ) -> anyhow::Result<Vec<ProbeResult>> {
        let outbounds = self.store.list_by_tags(tags).await?;
        Ok(self
            .run_batch(outbounds, concurrency, with_enrichment, cancel)
            .await)
    }

    async fn run_batch(
        &self,
        outbounds: Vec<Outbound>,
        concurrency: usize,
        enrich: bool,
        cancel: CancellationToken,
    ) -> Vec<ProbeResult> {
        let cap = if concurrency > 0 {
            concurrency
        } else if enrich {
            DEFAULT_ENRICH_CONCURRENCY
        } else {
            DEFAULT_PROBE_CONCURRENCY
        };

        let semaphore = Arc::new(Semaphore::new(cap));
        let mut set: JoinSet<Option<ProbeResult>> = JoinSet::new();
        let mut submitted = 0usize;

        for outbound in outbounds {
            if outbound.kind.is_synthetic() {
                continue;
            }
            submitted += 1;

            let prober = self.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            set.spawn(async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return None,
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return None,
                    },
                };
                Some(prober.probe_outbound(&outbound, enrich, &cancel).await)
            });
        }

        info!(
            "probing {} outbounds (concurrency {}, enrichment {})",
            submitted, cap, enrich
        );

        let mut results = Vec::with_capacity(submitted);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(e) => warn!("probe task failed to join: {}", e),
            }
        }
        results
    }
}
