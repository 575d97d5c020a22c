//! Timestamp helpers
//!
//! Runners are driven by logical, minute-aligned timestamps (milliseconds
//! since the Unix epoch) rather than by wall-clock ticks, so every node
//! processes the same logical instant regardless of scheduling jitter.

use crate::error::{CoreError, Result};

/// One minute in milliseconds
pub const MINUTE_MS: u64 = 60_000;

/// One day in milliseconds
pub const DAY_MS: u64 = 24 * 60 * MINUTE_MS;

/// Current wall-clock time in milliseconds
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Whether `timestamp` falls exactly on a minute boundary
pub fn is_minute_aligned(timestamp: u64) -> bool {
    timestamp % MINUTE_MS == 0
}

/// Round `timestamp` down to a multiple of `frame`
pub fn align_to(timestamp: u64, frame: u64) -> u64 {
    if frame == 0 {
        return timestamp;
    }
    timestamp - timestamp % frame
}

/// Reject timestamps that are not minute-aligned
pub fn ensure_minute_aligned(timestamp: u64) -> Result<u64> {
    if !is_minute_aligned(timestamp) {
        return Err(CoreError::UnalignedTimestamp(timestamp));
    }
    Ok(timestamp)
}

/// Validate a timeframe: positive multiple of one minute
pub fn check_timeframe(timeframe: u64) -> Result<u64> {
    if timeframe == 0 || timeframe % MINUTE_MS != 0 {
        return Err(CoreError::InvalidTimeframe(timeframe));
    }
    Ok(timeframe)
}

/// Minute timestamps covered by the timeframe ending (exclusive) at `end`
pub fn minutes_in_frame(end: u64, timeframe: u64) -> impl Iterator<Item = u64> {
    let start = end.saturating_sub(timeframe);
    (start..end).step_by(MINUTE_MS as usize)
}
