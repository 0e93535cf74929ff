//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher / breaker / cache / prober outcomes:
//!     → aggregator.rs (atomic counters served by get_metrics())
//!     → metrics.rs (metrics facade, optional Prometheus scrape)
//!     → logging.rs (structured tracing events)
//! ```

pub mod aggregator;
pub mod logging;
pub mod metrics;

pub use aggregator::{MetricsAggregator, MetricsSnapshot};
