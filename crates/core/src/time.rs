//! Millisecond timestamps and validity windows
//!
//! Artifacts carry `notBefore` / `notAfter` as epoch milliseconds on the wire.
//! Timestamps are kept at millisecond precision so that a value survives a
//! JSON round trip unchanged.

use crate::error::TrustError;
use chrono::{DateTime, Duration, Utc};

pub type Timestamp = DateTime<Utc>;

/// Current time truncated to whole milliseconds
pub fn now() -> Timestamp {
    let millis = Utc::now().timestamp_millis();
    from_millis(millis).unwrap_or_else(Utc::now)
}

pub fn from_millis(millis: i64) -> Option<Timestamp> {
    DateTime::from_timestamp_millis(millis)
}

/// Check `now` against an inclusive window.
///
/// `now == not_before` and `now == not_after` are both inside the window.
/// An absent `not_after` never expires.
pub fn check_window(
    now: Timestamp,
    not_before: Timestamp,
    not_after: Option<Timestamp>,
) -> Result<(), TrustError> {
    if now < not_before {
        return Err(TrustError::NotYetValid);
    }
    match not_after {
        Some(exp) if now > exp => Err(TrustError::Expired),
        _ => Ok(()),
    }
}

/// Window `[now, now + ttl]`
pub fn window_from(now: Timestamp, ttl: Duration) -> (Timestamp, Timestamp) {
    (now, now + ttl)
}
