//! Time utilities for safe timestamp handling.
//!
//! All timestamps in this crate are epoch milliseconds, because issuance
//! time is part of the signed payload and must survive round-trips
//! through storage without losing precision.

use crate::qsl::error::QslError;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds in one day, for expiry arithmetic.
pub(crate) const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Get the current time in milliseconds since the Unix epoch.
///
/// Returns an error instead of panicking in the rare case the system
/// clock reads before the epoch.
pub(crate) fn current_millis() -> Result<i64, QslError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .map_err(|_| QslError::TimeError("System time is before Unix epoch".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_millis() {
        let ts = current_millis().unwrap();
        // Should be a reasonable timestamp (after year 2020)
        assert!(ts > 1_577_836_800_000);
    }

    #[test]
    fn test_millis_per_day() {
        assert_eq!(MILLIS_PER_DAY, 86_400_000);
    }
}
