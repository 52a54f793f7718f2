pub mod activity;
pub mod contact;
pub mod enrollment;
pub mod newsletter;
pub mod session;
pub mod user;

use chrono::{DateTime, Utc};

/// True when the RFC 3339 timestamp is still in the future.
/// Unparseable values count as expired.
#[must_use]
pub fn is_future(rfc3339: &str) -> bool {
    DateTime::parse_from_rfc3339(rfc3339)
        .map(|t| t.with_timezone(&Utc) > Utc::now())
        .unwrap_or(false)
}
