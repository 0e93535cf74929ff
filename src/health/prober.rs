//! Concurrent liveness probing.
//!
//! # Responsibilities
//! - Ping every known authority at once through the gateway
//! - Wait for all probes; a slow or failing one never holds up the rest
//! - Turn outcomes into statuses and a fan-out summary

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Instant;

use crate::discovery::DiscoveryCache;
use crate::error::{ClientError, ClientResult, FailureKind};
use crate::gateway::Gateway;
use crate::model::{unix_millis, AuthorityStatus, DiscoverySnapshot, FanOutReport, ProbeResult};
use crate::observability::MetricsAggregator;

/// One probe outcome and the status it implies, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub result: ProbeResult,
    /// `None` when the probe says nothing about the authority itself,
    /// e.g. the breaker refused it locally.
    pub status: Option<AuthorityStatus>,
}

#[derive(Debug)]
pub struct FanOutProber {
    gateway: Arc<Gateway>,
    metrics: Arc<MetricsAggregator>,
}

impl FanOutProber {
    pub fn new(gateway: Arc<Gateway>, metrics: Arc<MetricsAggregator>) -> Self {
        Self { gateway, metrics }
    }

    /// Ping one authority.
    pub async fn probe(&self, authority: &str) -> ProbeOutcome {
        let started = Instant::now();
        let outcome = self.gateway.ping(authority).await;
        let checked_at_ms = unix_millis();

        let (result, status) = match outcome {
            Ok(_) => (
                ProbeResult::succeeded(authority, started.elapsed(), checked_at_ms),
                Some(AuthorityStatus::Online),
            ),
            Err(err) => {
                let status = match &err {
                    ClientError::Communication { .. } if !is_local_abort(&err) => {
                        Some(AuthorityStatus::Offline)
                    }
                    _ => None,
                };
                tracing::debug!(authority, error = %err, "Authority probe failed");
                (ProbeResult::failed(authority, &err, checked_at_ms), status)
            }
        };

        self.metrics.record_probe(result.success);
        ProbeOutcome { result, status }
    }

    /// Ping every authority in `snapshot` concurrently.
    pub async fn probe_all(&self, snapshot: &DiscoverySnapshot) -> Vec<ProbeOutcome> {
        join_all(snapshot.names().map(|name| self.probe(name))).await
    }

    /// Discover, probe everything, and write the statuses back.
    pub async fn sweep(&self, cache: &Arc<DiscoveryCache>) -> ClientResult<FanOutReport> {
        let discovery = cache.get().await?;
        let started = Instant::now();
        let outcomes = self.probe_all(&discovery.snapshot).await;

        let updates: Vec<(String, AuthorityStatus)> = outcomes
            .iter()
            .filter_map(|o| o.status.map(|s| (o.result.authority.clone(), s)))
            .collect();
        let changed = cache.apply_statuses(discovery.generation, &updates);

        let report = FanOutReport::new(outcomes.into_iter().map(|o| o.result).collect());
        tracing::info!(
            total = report.summary.total,
            successful = report.summary.successful,
            failed = report.summary.failed,
            status_changes = changed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Authority probe round complete"
        );
        Ok(report)
    }
}

fn is_local_abort(err: &ClientError) -> bool {
    matches!(err.failure_kind(), Some(FailureKind::Aborted))
}
