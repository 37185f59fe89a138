//! Expiry instant for long-lived signed URLs
//!
//! Links should stay valid for as long as the platform allows. Signed URL
//! expiry is a 32-bit signed epoch on the service side, so anything past
//! 2038-01-18 is rejected and the candidate is clamped there.

use chrono::{DateTime, Months, Utc};

/// Years a signed URL is meant to live
pub const URL_LIFETIME_YEARS: u32 = 20;

/// 2038-01-18T00:00:00Z, the latest expiry the storage service accepts
pub const PLATFORM_CEILING_EPOCH: i64 = 2_147_385_600;

pub fn platform_ceiling() -> DateTime<Utc> {
    DateTime::from_timestamp(PLATFORM_CEILING_EPOCH, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `min(now + 20 years, 2038-01-18)`
pub fn doomsday_from(now: DateTime<Utc>) -> DateTime<Utc> {
    let ceiling = platform_ceiling();
    match now.checked_add_months(Months::new(URL_LIFETIME_YEARS * 12)) {
        Some(candidate) if candidate <= ceiling => candidate,
        _ => ceiling,
    }
}

pub fn doomsday() -> DateTime<Utc> {
    doomsday_from(Utc::now())
}
