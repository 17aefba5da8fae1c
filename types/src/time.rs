//! Wall-clock helpers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds. Saturates at zero if the clock is set
/// before the epoch.
pub fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
