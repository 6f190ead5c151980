//! Timestamp utilities

use chrono::{DateTime, Duration, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current time as unix seconds
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Unix seconds `hours` from now
pub fn expiry_from_now(hours: i64) -> i64 {
    (Utc::now() + Duration::hours(hours)).timestamp()
}

/// Convert unix seconds back to a timestamp (epoch on out-of-range input)
pub fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
