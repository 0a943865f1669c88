//! Wall-clock sampling.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in microseconds since the Unix epoch.
///
/// Returns 0 if the system clock is before the epoch. Components that need
/// testable time take a `now_us: i64` parameter instead of calling this.
#[must_use]
pub fn now_us() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
}
