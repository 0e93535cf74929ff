//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway
//! client. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the authority gateway client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Gateway bridge endpoint and transport settings.
    pub gateway: GatewayConfig,

    /// Discovery cache and fallback store settings.
    pub discovery: DiscoveryConfig,

    /// Circuit breaker guarding the gateway endpoint.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Periodic authority probing.
    pub health_check: HealthCheckConfig,

    /// Transfer order validation limits.
    pub orders: OrderConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Gateway bridge transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the gateway bridge (e.g., "http://10.0.0.254:8080").
    pub base_url: String,

    /// Per-call deadline in milliseconds, covering send and body read.
    pub request_timeout_ms: u64,

    /// Connection establishment timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Maximum calls in flight to the gateway at once.
    pub max_concurrent_requests: usize,

    /// Idle pooled connections kept per host.
    pub pool_max_idle_per_host: usize,

    /// Idle pooled connections are closed after this many seconds.
    pub pool_idle_timeout_secs: u64,
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://10.0.0.254:8080".to_string(),
            request_timeout_ms: 10_000,
            connect_timeout_ms: 3_000,
            max_concurrent_requests: 50,
            pool_max_idle_per_host: 16,
            pool_idle_timeout_secs: 90,
        }
    }
}

/// Discovery cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Maximum age of a fresh snapshot, in seconds.
    pub ttl_secs: u64,

    /// Run the background refresher that keeps the snapshot warm.
    pub background_refresh: bool,

    /// Where the last good snapshot is persisted.
    pub fallback_path: PathBuf,
}

impl DiscoveryConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            background_refresh: true,
            fallback_path: PathBuf::from("data/authorities_snapshot.json"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,

    /// Milliseconds the breaker stays open before admitting a trial call.
    pub recovery_timeout_ms: u64,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 30_000,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per logical call (1 disables retries).
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// Health probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable the periodic fan-out probe.
    pub enabled: bool,

    /// Probe interval in seconds.
    pub interval_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
        }
    }
}

/// Limits applied to transfer orders before they are forwarded.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrderConfig {
    /// Tokens the authorities accept.
    pub supported_tokens: Vec<String>,

    /// Largest transfer amount, in the token's smallest unit.
    pub max_transfer_amount: u64,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            supported_tokens: vec!["USDT".to_string(), "USDC".to_string()],
            max_transfer_amount: 10_000_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
