//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and reports every
//! problem it finds, not just the first.

use thiserror::Error;
use url::Url;

use crate::config::schema::ClientConfig;

/// A single semantic problem in a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, returning all errors found.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match Url::parse(&config.gateway.base_url) {
        Ok(url) if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") => {
            errors.push(ValidationError::new("gateway.base_url", "must be an http(s) URL"));
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::new("gateway.base_url", e.to_string())),
    }

    if config.gateway.request_timeout_ms == 0 {
        errors.push(ValidationError::new("gateway.request_timeout_ms", "must be greater than 0"));
    }
    if config.gateway.connect_timeout_ms == 0 {
        errors.push(ValidationError::new("gateway.connect_timeout_ms", "must be greater than 0"));
    }
    if config.gateway.max_concurrent_requests == 0 {
        errors.push(ValidationError::new("gateway.max_concurrent_requests", "must be greater than 0"));
    }
    // Semaphore permits are u32 when draining on shutdown.
    if config.gateway.max_concurrent_requests > u32::MAX as usize {
        errors.push(ValidationError::new("gateway.max_concurrent_requests", "too large"));
    }

    if config.discovery.ttl_secs == 0 {
        errors.push(ValidationError::new("discovery.ttl_secs", "must be greater than 0"));
    }
    if config.discovery.fallback_path.as_os_str().is_empty() {
        errors.push(ValidationError::new("discovery.fallback_path", "must not be empty"));
    }

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be greater than 0"));
    }
    if config.circuit_breaker.recovery_timeout_ms == 0 {
        errors.push(ValidationError::new("circuit_breaker.recovery_timeout_ms", "must be greater than 0"));
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }
    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            format!(
                "base delay {} ms exceeds max delay {} ms",
                config.retries.base_delay_ms, config.retries.max_delay_ms
            ),
        ));
    }

    if config.health_check.enabled && config.health_check.interval_secs == 0 {
        errors.push(ValidationError::new("health_check.interval_secs", "must be greater than 0"));
    }

    if config.orders.supported_tokens.is_empty() {
        errors.push(ValidationError::new("orders.supported_tokens", "must list at least one token"));
    }
    if config.orders.max_transfer_amount == 0 {
        errors.push(ValidationError::new("orders.max_transfer_amount", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
