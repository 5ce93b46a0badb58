//! Token lifetime policy.
//!
//! A token carries an optional explicit expiry; when absent, expiry is
//! derived from its issuance time plus a configurable default lifetime.
//! Pure functions over timestamps, no side effects.

use crate::qsl::time_utils::MILLIS_PER_DAY;

/// Default token lifetime when no explicit expiry is stored.
pub const DEFAULT_EXPIRY_DAYS: u32 = 365;

/// Decides whether a token is past its lifetime.
///
/// An explicit `expires_at_ms` wins; otherwise the cutoff is
/// `issued_at_ms + default_days`. In both cases expiry is strict:
/// a token is valid at the cutoff instant and expired one millisecond
/// after it.
pub fn is_expired(
    issued_at_ms: i64,
    expires_at_ms: Option<i64>,
    now_ms: i64,
    default_days: u32,
) -> bool {
    match expires_at_ms {
        Some(expires_at) => now_ms > expires_at,
        None => now_ms > default_expiry(issued_at_ms, default_days),
    }
}

/// Computes the implicit expiry timestamp for a token issued at
/// `issued_at_ms` with a lifetime of `default_days`.
pub fn default_expiry(issued_at_ms: i64, default_days: u32) -> i64 {
    issued_at_ms + i64::from(default_days) * MILLIS_PER_DAY
}
