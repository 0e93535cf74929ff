//! Authority health subsystem.
//!
//! # Data Flow
//! ```text
//! ping_all() / periodic tick (monitor.rs):
//!     → DiscoveryCache::get() (authority set + generation)
//!     → prober.rs: one ping per authority, all concurrent
//!     → statuses applied to that generation only
//!     → FanOutReport (per-authority results + summary)
//! ```
//!
//! # Design Decisions
//! - A probe refused by the open breaker leaves the status untouched
//! - Probes share the gateway breaker with every other call

pub mod monitor;
pub mod prober;

pub use monitor::HealthMonitor;
pub use prober::{FanOutProber, ProbeOutcome};
