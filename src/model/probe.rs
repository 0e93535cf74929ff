//! Probe outcomes and their aggregate.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Outcome of one liveness probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub authority: String,
    pub success: bool,
    /// Round-trip latency; present only for successful probes.
    pub latency_ms: Option<f64>,
    pub error: Option<String>,
    pub checked_at_ms: u64,
}

impl ProbeResult {
    pub fn succeeded(authority: impl Into<String>, latency: Duration, checked_at_ms: u64) -> Self {
        Self {
            authority: authority.into(),
            success: true,
            latency_ms: Some(latency.as_secs_f64() * 1000.0),
            error: None,
            checked_at_ms,
        }
    }

    pub fn failed(authority: impl Into<String>, error: impl ToString, checked_at_ms: u64) -> Self {
        Self {
            authority: authority.into(),
            success: false,
            latency_ms: None,
            error: Some(error.to_string()),
            checked_at_ms,
        }
    }
}

/// Aggregate over one fan-out round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// `successful / total`; 0.0 when nothing was probed.
    pub success_rate: f64,
    /// Mean over successful probes only.
    pub average_latency_ms: Option<f64>,
}

impl ProbeSummary {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a ProbeResult>) -> Self {
        let mut total = 0usize;
        let mut successful = 0usize;
        let mut latency_sum = 0.0f64;
        let mut latency_samples = 0usize;

        for result in results {
            total += 1;
            if result.success {
                successful += 1;
                if let Some(latency) = result.latency_ms {
                    latency_sum += latency;
                    latency_samples += 1;
                }
            }
        }

        Self {
            total,
            successful,
            failed: total - successful,
            success_rate: if total == 0 {
                0.0
            } else {
                successful as f64 / total as f64
            },
            average_latency_ms: (latency_samples > 0).then(|| latency_sum / latency_samples as f64),
        }
    }
}

/// Per-authority results of `ping_all` plus their summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FanOutReport {
    pub results: BTreeMap<String, ProbeResult>,
    pub summary: ProbeSummary,
}

impl FanOutReport {
    pub fn new(results: Vec<ProbeResult>) -> Self {
        let summary = ProbeSummary::from_results(&results);
        let results = results
            .into_iter()
            .map(|r| (r.authority.clone(), r))
            .collect();
        Self { results, summary }
    }
}
