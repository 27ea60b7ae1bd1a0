use chrono::{DateTime, Timelike, Utc};

use crate::engine::EngineError;
use crate::model::Slot;

/// Slot boundaries sit on this minute grid, with zero seconds.
pub const SLOT_GRANULARITY_MINUTES: u32 = 10;

fn parse_instant(s: &str, field: &'static str) -> Result<DateTime<Utc>, EngineError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| EngineError::InvalidFormat { field })
}

fn check_granularity(t: DateTime<Utc>, field: &'static str) -> Result<(), EngineError> {
    if t.minute() % SLOT_GRANULARITY_MINUTES != 0 || t.second() != 0 || t.nanosecond() != 0 {
        return Err(EngineError::InvalidGranularity { field });
    }
    Ok(())
}

/// Validate a proposed `[start, end)` pair: ISO-8601 format, 10-minute
/// granularity, start strictly after `now`, start strictly before end.
///
/// `now` is an explicit input so the check is deterministic. All
/// arithmetic is UTC; offsets in the input are normalized away.
pub fn validate_slot(start: &str, end: &str, now: DateTime<Utc>) -> Result<Slot, EngineError> {
    let start = parse_instant(start, "start_time")?;
    let end = parse_instant(end, "end_time")?;
    check_granularity(start, "start_time")?;
    check_granularity(end, "end_time")?;
    if start <= now {
        return Err(EngineError::NotFuture);
    }
    if start >= end {
        return Err(EngineError::InvalidOrder);
    }
    Ok(Slot::new(start, end))
}

/// User ids are opaque but must be non-empty ASCII alphanumeric.
pub fn validate_user_id(user_id: &str) -> Result<(), EngineError> {
    if user_id.is_empty() || !user_id.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(EngineError::InvalidUserId);
    }
    Ok(())
}
