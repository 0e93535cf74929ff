//! Retry logic.
//!
//! # Responsibilities
//! - Run one logical call as up to `max_attempts` physical attempts
//! - Ask the circuit breaker before every attempt
//! - Report each attempt's outcome back to the breaker
//! - Sleep with jittered exponential backoff between attempts
//!
//! # Design Decisions
//! - The caller decides which errors are retryable; transfers only retry
//!   when nothing reached the gateway
//! - A breaker that opens mid-sequence ends the sequence at once with
//!   `CircuitOpen`
//! - 4xx, decode and rejection replies prove the gateway is alive and count
//!   as breaker successes even though the call failed

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{ClientError, ClientResult, FailureKind};
use crate::observability::MetricsAggregator;
use crate::resilience::backoff::Backoff;
use crate::resilience::circuit_breaker::{BreakerPermit, BreakerState, CircuitBreaker};

/// Predicate deciding whether a failed attempt may be repeated.
pub type Retryable = fn(&ClientError) -> bool;

#[derive(Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    metrics: Arc<MetricsAggregator>,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig, metrics: Arc<MetricsAggregator>) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Backoff::new(
                Duration::from_millis(config.base_delay_ms),
                Duration::from_millis(config.max_delay_ms),
            ),
            metrics,
        }
    }

    /// Execute `attempt` until it succeeds, fails permanently, or the
    /// attempts run out. The closure receives the 1-based attempt
    /// number.
    pub async fn execute<T, F, Fut>(
        &self,
        breaker: &CircuitBreaker,
        route: &'static str,
        retryable: Retryable,
        mut attempt: F,
    ) -> ClientResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let mut number = 0;
        loop {
            number += 1;
            let permit = breaker.try_acquire()?;

            let err = match attempt(number).await {
                Ok(value) => {
                    permit.succeed();
                    return Ok(value);
                }
                Err(err) => err,
            };
            settle(permit, &err);

            if number >= self.max_attempts || !retryable(&err) {
                return Err(err);
            }
            if breaker.state() == BreakerState::Open {
                tracing::debug!(route, attempt = number, "Breaker opened, abandoning retries");
                self.metrics.record_breaker_rejection();
                return Err(ClientError::CircuitOpen {
                    endpoint: breaker.endpoint().to_string(),
                });
            }

            let delay = self.backoff.delay_for(number);
            tracing::debug!(
                route,
                attempt = number,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying gateway call"
            );
            self.metrics.record_retry(route);
            tokio::time::sleep(delay).await;
        }
    }
}

fn settle(permit: BreakerPermit<'_>, err: &ClientError) {
    match err.failure_kind() {
        Some(kind) if kind.is_transient() => permit.fail(),
        Some(FailureKind::Aborted) | None => permit.release(),
        Some(_) => permit.succeed(),
    }
}

/// Retry any transient failure. Used for reads and pings.
pub fn retry_transient(err: &ClientError) -> bool {
    err.is_transient()
}

/// Retry only when the request never reached the gateway.
pub fn retry_unsent(err: &ClientError) -> bool {
    err.failure_kind().is_some_and(FailureKind::request_not_sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        let config = RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 5,
        };
        RetryPolicy::new(&config, Arc::new(MetricsAggregator::new()))
    }

    fn breaker(threshold: u32) -> CircuitBreaker {
        let config = CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout_ms: 60_000,
        };
        CircuitBreaker::new("http://gateway", &config, Arc::new(MetricsAggregator::new()))
    }

    fn transient() -> ClientError {
        ClientError::communication("/authorities", FailureKind::Status(503))
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let policy = policy(3);
        let cb = breaker(10);
        let calls = AtomicU32::new(0);

        let result = policy
            .execute(&cb, "discovery", retry_transient, |n| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Err(transient())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let policy = policy(2);
        let cb = breaker(10);
        let calls = AtomicU32::new(0);

        let result: ClientResult<()> = policy
            .execute(&cb, "discovery", retry_transient, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await;

        assert_eq!(result, Err(transient()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cb.consecutive_failures(), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let policy = policy(3);
        let cb = breaker(10);
        let calls = AtomicU32::new(0);

        let result: ClientResult<()> = policy
            .execute(&cb, "ping", retry_transient, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ClientError::communication("/ping", FailureKind::Status(404))) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_unsent_only_predicate() {
        let policy = policy(3);
        let cb = breaker(10);
        let calls = AtomicU32::new(0);

        let result: ClientResult<()> = policy
            .execute(&cb, "transfer", retry_unsent, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ClientError::communication("/transfer", FailureKind::Timeout(10))) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        calls.store(0, Ordering::SeqCst);
        let result: ClientResult<()> = policy
            .execute(&cb, "transfer", retry_unsent, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ClientError::communication(
                        "/transfer",
                        FailureKind::Connect("refused".into()),
                    ))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_breaker_opening_stops_retries() {
        let policy = policy(5);
        let cb = breaker(2);
        let calls = AtomicU32::new(0);

        let result: ClientResult<()> = policy
            .execute(&cb, "discovery", retry_transient, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await;

        assert!(matches!(result, Err(ClientError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn test_open_breaker_skips_io() {
        let policy = policy(3);
        let cb = breaker(1);
        cb.try_acquire().unwrap().fail();

        let calls = AtomicU32::new(0);
        let result: ClientResult<()> = policy
            .execute(&cb, "discovery", retry_transient, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(ClientError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
