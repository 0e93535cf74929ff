//! Domain types shared by every component.

pub mod authority;
pub mod orders;
pub mod probe;

pub use authority::{AuthorityRecord, AuthorityStatus, DiscoverySnapshot, NetworkAddress, Position};
pub use orders::{ConfirmationOrder, TransferOrder};
pub use probe::{FanOutReport, ProbeResult, ProbeSummary};

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
