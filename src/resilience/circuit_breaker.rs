//! Circuit breaker guarding the gateway endpoint.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: gateway assumed down, requests fail fast
//! - Half-Open: one trial request decides whether the gateway recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: after recovery timeout (first caller becomes the trial)
//! Half-Open → Closed: trial request succeeds
//! Half-Open → Open: trial request fails, recovery timer restarts
//! ```
//!
//! One breaker per gateway endpoint, since every authority is reached
//! through the same bridge. All state lives behind one mutex that is never
//! held across an await.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::CircuitBreakerConfig;
use crate::error::{ClientError, ClientResult};
use crate::observability::MetricsAggregator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub(crate) fn index(self) -> usize {
        match self {
            BreakerState::Closed => 0,
            BreakerState::Open => 1,
            BreakerState::HalfOpen => 2,
        }
    }

    /// Gauge encoding: 0=closed, 1=open, 2=half-open.
    pub fn code(self) -> u8 {
        self.index() as u8
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    endpoint: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<BreakerInner>,
    metrics: Arc<MetricsAggregator>,
}

impl CircuitBreaker {
    pub fn new(
        endpoint: impl Into<String>,
        config: &CircuitBreakerConfig,
        metrics: Arc<MetricsAggregator>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            failure_threshold: config.failure_threshold.max(1),
            recovery_timeout: config.recovery_timeout(),
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
            metrics,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    fn open_error(&self) -> ClientError {
        self.metrics.record_breaker_rejection();
        ClientError::CircuitOpen {
            endpoint: self.endpoint.clone(),
        }
    }

    /// Ask to issue one call. Fails fast with `CircuitOpen` while open, and
    /// while half-open with the trial already taken.
    pub fn try_acquire(&self) -> ClientResult<BreakerPermit<'_>> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => Ok(BreakerPermit::new(self, false)),
            BreakerState::Open => {
                let ready = inner
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.recovery_timeout);
                if !ready {
                    drop(inner);
                    return Err(self.open_error());
                }
                self.transition(&mut inner, BreakerState::HalfOpen);
                inner.trial_in_flight = true;
                drop(inner);
                tracing::info!(endpoint = %self.endpoint, "Circuit half-open, admitting trial request");
                Ok(BreakerPermit::new(self, true))
            }
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    drop(inner);
                    return Err(self.open_error());
                }
                inner.trial_in_flight = true;
                Ok(BreakerPermit::new(self, true))
            }
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: BreakerState) {
        inner.state = to;
        self.metrics.record_breaker_transition(to);
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.lock();
        if trial {
            inner.trial_in_flight = false;
            inner.consecutive_failures = 0;
            inner.opened_at = None;
            self.transition(&mut inner, BreakerState::Closed);
            drop(inner);
            tracing::info!(endpoint = %self.endpoint, "Circuit closed after successful trial");
        } else if inner.state == BreakerState::Closed {
            inner.consecutive_failures = 0;
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.lock();
        if trial {
            inner.trial_in_flight = false;
            inner.opened_at = Some(Instant::now());
            self.transition(&mut inner, BreakerState::Open);
            drop(inner);
            tracing::warn!(endpoint = %self.endpoint, "Trial request failed, circuit re-opened");
            return;
        }

        // Late results from calls admitted before the breaker opened are ignored.
        if inner.state != BreakerState::Closed {
            return;
        }

        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.failure_threshold {
            let failures = inner.consecutive_failures;
            inner.opened_at = Some(Instant::now());
            self.transition(&mut inner, BreakerState::Open);
            drop(inner);
            tracing::warn!(
                endpoint = %self.endpoint,
                failures,
                recovery_ms = self.recovery_timeout.as_millis() as u64,
                "Circuit opened"
            );
        }
    }

    fn on_release(&self, trial: bool) {
        if trial {
            self.lock().trial_in_flight = false;
        }
    }
}

/// Admission ticket for one call; must be settled with its outcome.
///
/// Dropping an unsettled permit releases it without counting an outcome,
/// so a cancelled trial frees the half-open slot.
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> BreakerPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    /// Whether this permit is the single half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }

    /// Settle without an outcome, e.g. the call was aborted locally.
    pub fn release(mut self) {
        self.settled = true;
        self.breaker.on_release(self.trial);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_release(self.trial);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, recovery_ms: u64) -> CircuitBreaker {
        let config = CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout_ms: recovery_ms,
        };
        CircuitBreaker::new("http://gateway", &config, Arc::new(MetricsAggregator::new()))
    }

    fn fail_once(breaker: &CircuitBreaker) {
        breaker.try_acquire().unwrap().fail();
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = breaker(3, 60_000);
        fail_once(&cb);
        fail_once(&cb);
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.consecutive_failures(), 2);
        fail_once(&cb);
        assert_eq!(cb.state(), BreakerState::Open);

        let started = Instant::now();
        let err = cb.try_acquire().unwrap_err();
        assert!(matches!(err, ClientError::CircuitOpen { .. }));
        assert!(started.elapsed() < Duration::from_millis(5));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let cb = breaker(3, 60_000);
        fail_once(&cb);
        fail_once(&cb);
        cb.try_acquire().unwrap().succeed();
        assert_eq!(cb.consecutive_failures(), 0);
        fail_once(&cb);
        fail_once(&cb);
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_admits_single_trial() {
        let cb = breaker(1, 10);
        fail_once(&cb);
        std::thread::sleep(Duration::from_millis(20));

        let trial = cb.try_acquire().unwrap();
        assert!(trial.is_trial());
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        for _ in 0..3 {
            assert!(matches!(cb.try_acquire(), Err(ClientError::CircuitOpen { .. })));
        }

        trial.succeed();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(!cb.try_acquire().unwrap().is_trial());
    }

    #[test]
    fn test_failed_trial_reopens() {
        let cb = breaker(1, 10);
        fail_once(&cb);
        std::thread::sleep(Duration::from_millis(20));

        cb.try_acquire().unwrap().fail();
        assert_eq!(cb.state(), BreakerState::Open);
        // Recovery timer restarted.
        assert!(cb.try_acquire().is_err());
    }

    #[test]
    fn test_dropped_trial_frees_slot() {
        let cb = breaker(1, 10);
        fail_once(&cb);
        std::thread::sleep(Duration::from_millis(20));

        drop(cb.try_acquire().unwrap());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        let next = cb.try_acquire().unwrap();
        assert!(next.is_trial());
    }

    #[test]
    fn test_late_failure_while_open_is_ignored() {
        let cb = breaker(2, 60_000);
        let early = cb.try_acquire().unwrap();
        fail_once(&cb);
        fail_once(&cb);
        assert_eq!(cb.state(), BreakerState::Open);
        early.fail();
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn test_concurrent_trial_race() {
        let cb = Arc::new(breaker(1, 10));
        fail_once(&cb);
        std::thread::sleep(Duration::from_millis(20));

        let admitted: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let cb = cb.clone();
                    s.spawn(move || match cb.try_acquire() {
                        Ok(permit) => {
                            std::thread::sleep(Duration::from_millis(20));
                            permit.succeed();
                            1
                        }
                        Err(_) => 0,
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(admitted, 1);
        assert_eq!(cb.state(), BreakerState::Closed);
    }
}
