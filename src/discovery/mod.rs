//! Authority discovery subsystem.
//!
//! # Data Flow
//! ```text
//! get():
//!     cache.rs fresh entry → return (no I/O)
//!     otherwise → one shared refresh → Gateway GET /authorities
//!         success → fallback.rs save → install new generation
//!         failure → stale entry → fallback.rs load → DiscoveryError
//!
//! refresher.rs: every TTL, refresh only if the entry went stale
//! ```
//!
//! # Design Decisions
//! - A fallback snapshot is never reported as fresh
//! - Forced refreshes surface their errors instead of degrading

pub mod cache;
pub mod fallback;
pub mod refresher;

pub use cache::{Discovery, DiscoveryCache, Freshness};
pub use fallback::FallbackStore;
pub use refresher::DiscoveryRefresher;
