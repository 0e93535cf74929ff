//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Doubling delay schedule bounded by `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// Up to 10% of the delay is shaved off at random so concurrent callers
    /// spread out; the result never exceeds `max`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let capped = self.ceiling_for(attempt);
        let jitter_range = capped.as_millis() as u64 / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };
        capped.saturating_sub(Duration::from_millis(jitter))
    }

    /// Un-jittered delay for the given attempt.
    pub fn ceiling_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base.saturating_mul(factor).min(self.max)
    }
}
