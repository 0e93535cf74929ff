//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! AuthorityClient::start():
//!     Open transport → spawn monitors into a TaskGroup (shutdown.rs)
//!
//! AuthorityClient::stop():
//!     Broadcast shutdown → abort in-flight calls → close transport → await monitors
//!
//! Signals (signals.rs):
//!     SIGTERM/Ctrl-C → CLI `watch` stops the client
//! ```
//!
//! # Design Decisions
//! - Monitors are signalled before the transport closes, so a sweep stuck
//!   on a slow call unwinds immediately
//! - Every spawned task is awaited; nothing outlives `stop()`

pub mod shutdown;
pub mod signals;

pub use shutdown::TaskGroup;
pub use signals::shutdown_signal;
