//! Tick arithmetic for `LastModifiedTicksSinceEpoch` style timestamps
//!
//! A tick is 100 nanoseconds; the epoch is 1970-01-01T00:00:00Z.

use chrono::{DateTime, TimeZone, Utc};

pub const TICKS_PER_SECOND: i64 = 10_000_000;
const NANOS_PER_TICK: i64 = 100;

/// Convert a UTC timestamp to ticks since the Unix epoch
pub fn ticks_from_datetime(at: DateTime<Utc>) -> i64 {
    at.timestamp() * TICKS_PER_SECOND + i64::from(at.timestamp_subsec_nanos()) / NANOS_PER_TICK
}

/// Convert ticks since the Unix epoch back to a UTC timestamp
pub fn datetime_from_ticks(ticks: i64) -> Option<DateTime<Utc>> {
    let secs = ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = (ticks.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}

/// Current time in ticks
pub fn now_ticks() -> i64 {
    ticks_from_datetime(Utc::now())
}
