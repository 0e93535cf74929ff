//! Metrics exposition.
//!
//! # Responsibilities
//! - Emit gateway client metrics through the `metrics` facade
//! - Expose a Prometheus-compatible scrape endpoint when enabled
//!
//! # Metrics
//! - `gateway_requests_total` (counter): dispatched requests by route, outcome
//! - `gateway_request_duration_seconds` (histogram): successful request latency
//! - `gateway_retries_total` (counter): retry attempts
//! - `discovery_cache_lookups_total` (counter): lookups by result
//! - `circuit_breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `authority_probe_total` (counter): probes by outcome
//! - `authorities_known` / `authorities_online` (gauges)
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics recorder"),
    }
}

pub fn record_request(route: &'static str, outcome: &'static str, duration: Option<Duration>) {
    ::metrics::counter!("gateway_requests_total", "route" => route, "outcome" => outcome)
        .increment(1);
    if let Some(duration) = duration {
        ::metrics::histogram!("gateway_request_duration_seconds", "route" => route)
            .record(duration.as_secs_f64());
    }
}

pub fn record_retry(route: &'static str) {
    ::metrics::counter!("gateway_retries_total", "route" => route).increment(1);
}

pub fn record_cache_lookup(result: &'static str) {
    ::metrics::counter!("discovery_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_breaker_state(code: u8) {
    ::metrics::gauge!("circuit_breaker_state").set(f64::from(code));
}

pub fn record_probe(outcome: &'static str) {
    ::metrics::counter!("authority_probe_total", "outcome" => outcome).increment(1);
}

pub fn record_authorities(known: usize, online: usize) {
    ::metrics::gauge!("authorities_known").set(known as f64);
    ::metrics::gauge!("authorities_online").set(online as f64);
}
