//! In-process metrics aggregation backing `get_metrics()`.
//!
//! Counters are plain atomics so fan-out probes can record concurrently
//! without coordination. The breaker timeline is the only locked piece and
//! is touched once per state transition.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::FailureKind;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::BreakerState;

const ERROR_KIND_COUNT: usize = 7;

const ERROR_KINDS: [&str; ERROR_KIND_COUNT] = [
    "timeout",
    "connect",
    "transport",
    "status",
    "decode",
    "rejected",
    "aborted",
];

#[derive(Debug)]
struct BreakerTimeline {
    state: BreakerState,
    since: Instant,
    accumulated: [Duration; 3],
    transitions: u64,
}

impl BreakerTimeline {
    fn durations_at(&self, now: Instant) -> [Duration; 3] {
        let mut totals = self.accumulated;
        totals[self.state.index()] += now.saturating_duration_since(self.since);
        totals
    }
}

/// Lock-light accumulator shared by every component of one client.
#[derive(Debug)]
pub struct MetricsAggregator {
    started: Instant,
    requests_total: AtomicU64,
    requests_succeeded: AtomicU64,
    requests_failed: AtomicU64,
    retries: AtomicU64,
    breaker_rejections: AtomicU64,
    latency_total_us: AtomicU64,
    latency_samples: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    stale_served: AtomicU64,
    fallback_served: AtomicU64,
    probes_total: AtomicU64,
    probes_failed: AtomicU64,
    authorities_known: AtomicU64,
    authorities_online: AtomicU64,
    errors: [AtomicU64; ERROR_KIND_COUNT],
    breaker: Mutex<BreakerTimeline>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            requests_total: AtomicU64::new(0),
            requests_succeeded: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            breaker_rejections: AtomicU64::new(0),
            latency_total_us: AtomicU64::new(0),
            latency_samples: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            stale_served: AtomicU64::new(0),
            fallback_served: AtomicU64::new(0),
            probes_total: AtomicU64::new(0),
            probes_failed: AtomicU64::new(0),
            authorities_known: AtomicU64::new(0),
            authorities_online: AtomicU64::new(0),
            errors: Default::default(),
            breaker: Mutex::new(BreakerTimeline {
                state: BreakerState::Closed,
                since: now,
                accumulated: [Duration::ZERO; 3],
                transitions: 0,
            }),
        }
    }

    /// One dispatched request that produced a usable response.
    pub fn record_request_success(&self, route: &'static str, latency: Duration) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.requests_succeeded.fetch_add(1, Ordering::Relaxed);
        self.latency_total_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
        metrics::record_request(route, "success", Some(latency));
    }

    /// One dispatched request that failed.
    pub fn record_request_failure(&self, route: &'static str, kind: &FailureKind) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
        if let Some(idx) = ERROR_KINDS.iter().position(|k| *k == kind.label()) {
            self.errors[idx].fetch_add(1, Ordering::Relaxed);
        }
        metrics::record_request(route, kind.label(), None);
    }

    pub fn record_retry(&self, route: &'static str) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        metrics::record_retry(route);
    }

    pub fn record_breaker_rejection(&self) {
        self.breaker_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_lookup("hit");
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_lookup("miss");
    }

    pub fn record_stale_served(&self) {
        self.stale_served.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_lookup("stale");
    }

    pub fn record_fallback_served(&self) {
        self.fallback_served.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_lookup("fallback");
    }

    pub fn record_probe(&self, success: bool) {
        self.probes_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.probes_failed.fetch_add(1, Ordering::Relaxed);
        }
        metrics::record_probe(if success { "success" } else { "failure" });
    }

    /// Gauge-style: current size of the known authority set.
    pub fn record_authorities(&self, known: usize, online: usize) {
        self.authorities_known.store(known as u64, Ordering::Relaxed);
        self.authorities_online.store(online as u64, Ordering::Relaxed);
        metrics::record_authorities(known, online);
    }

    /// Called by the circuit breaker on every state change.
    pub fn record_breaker_transition(&self, to: BreakerState) {
        let now = Instant::now();
        let mut timeline = self.breaker.lock().unwrap_or_else(PoisonError::into_inner);
        if timeline.state == to {
            return;
        }
        let elapsed = now.saturating_duration_since(timeline.since);
        let idx = timeline.state.index();
        timeline.accumulated[idx] += elapsed;
        timeline.state = to;
        timeline.since = now;
        timeline.transitions += 1;
        drop(timeline);
        metrics::record_breaker_state(to.code());
    }

    /// Read-only point-in-time view of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = Instant::now();
        let (state, transitions, durations) = {
            let timeline = self.breaker.lock().unwrap_or_else(PoisonError::into_inner);
            (timeline.state, timeline.transitions, timeline.durations_at(now))
        };

        let total = self.requests_total.load(Ordering::Relaxed);
        let succeeded = self.requests_succeeded.load(Ordering::Relaxed);
        let failed = self.requests_failed.load(Ordering::Relaxed);
        let samples = self.latency_samples.load(Ordering::Relaxed);
        let latency_total_us = self.latency_total_us.load(Ordering::Relaxed);
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests: RequestMetrics {
                total,
                successful: succeeded,
                failed,
                retries: self.retries.load(Ordering::Relaxed),
                rejected_by_breaker: self.breaker_rejections.load(Ordering::Relaxed),
                success_rate: ratio(succeeded, succeeded + failed),
            },
            performance: PerformanceMetrics {
                average_latency_ms: (samples > 0)
                    .then(|| latency_total_us as f64 / samples as f64 / 1000.0),
                latency_samples: samples,
            },
            cache: CacheMetrics {
                hits,
                misses,
                hit_rate: ratio(hits, hits + misses),
                stale_served: self.stale_served.load(Ordering::Relaxed),
                fallback_served: self.fallback_served.load(Ordering::Relaxed),
            },
            circuit_breaker: BreakerMetrics {
                state,
                transitions,
                closed_ms: durations[BreakerState::Closed.index()].as_millis() as u64,
                open_ms: durations[BreakerState::Open.index()].as_millis() as u64,
                half_open_ms: durations[BreakerState::HalfOpen.index()].as_millis() as u64,
            },
            probes: ProbeMetrics {
                total: self.probes_total.load(Ordering::Relaxed),
                failed: self.probes_failed.load(Ordering::Relaxed),
            },
            authorities: AuthorityMetrics {
                known: self.authorities_known.load(Ordering::Relaxed),
                online: self.authorities_online.load(Ordering::Relaxed),
            },
            errors: ERROR_KINDS
                .iter()
                .zip(self.errors.iter())
                .map(|(kind, count)| (*kind, count.load(Ordering::Relaxed)))
                .filter(|(_, count)| *count > 0)
                .collect(),
            uptime_secs: now.duration_since(self.started).as_secs(),
        }
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests: RequestMetrics,
    pub performance: PerformanceMetrics,
    pub cache: CacheMetrics,
    pub circuit_breaker: BreakerMetrics,
    pub probes: ProbeMetrics,
    pub authorities: AuthorityMetrics,
    /// Failed requests by failure kind; kinds never seen are omitted.
    pub errors: BTreeMap<&'static str, u64>,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestMetrics {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub retries: u64,
    pub rejected_by_breaker: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    /// Running mean over successful requests.
    pub average_latency_ms: Option<f64>,
    pub latency_samples: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub stale_served: u64,
    pub fallback_served: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerMetrics {
    pub state: BreakerState,
    pub transitions: u64,
    pub closed_ms: u64,
    pub open_ms: u64,
    pub half_open_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeMetrics {
    pub total: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorityMetrics {
    pub known: u64,
    pub online: u64,
}
