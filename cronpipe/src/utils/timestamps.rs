//! Timestamp helpers.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Timestamp type stored in the ledger.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Converts an elapsed duration to whole milliseconds, saturating.
#[must_use]
pub fn duration_ms(elapsed: Duration) -> i64 {
    i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
}
