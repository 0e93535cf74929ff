//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Logical gateway call:
//!     → retries.rs (attempt loop, retry predicate per route)
//!     → circuit_breaker.rs (admission before each attempt, outcome after)
//!     → backoff.rs (jittered delay between attempts)
//! ```
//!
//! # Design Decisions
//! - Timeouts live in the dispatcher; every external call has a deadline
//! - Non-idempotent calls only retry when nothing was sent
//! - One breaker per gateway endpoint prevents hammering a dead bridge

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use retries::RetryPolicy;
