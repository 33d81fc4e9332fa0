//! Request timestamp freshness.
//!
//! A timestamp is accepted when it lies within `window` of the server clock,
//! in either direction, boundaries included. The window is symmetric so that
//! callers whose clocks run slightly ahead are not rejected.

use chrono::Utc;

const MS_PER_MINUTE: f64 = 60_000.0;

/// The timestamp is not a number of milliseconds since epoch.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unsupported timestamp format: {0:?}")]
pub struct TimestampFormatError(pub String);

/// Parse an integer or float millisecond timestamp.
pub fn parse_timestamp_ms(raw: &str) -> Result<f64, TimestampFormatError> {
    let trimmed = raw.trim();
    if let Ok(ms) = trimmed.parse::<i64>() {
        return Ok(ms as f64);
    }
    match trimmed.parse::<f64>() {
        Ok(ms) if ms.is_finite() => Ok(ms),
        _ => Err(TimestampFormatError(raw.to_string())),
    }
}

/// Check `timestamp_ms` against the current server time.
pub fn is_fresh(timestamp_ms: &str, window_minutes: u32) -> Result<bool, TimestampFormatError> {
    is_fresh_at(timestamp_ms, window_minutes, Utc::now().timestamp_millis())
}

/// Check `timestamp_ms` against an explicit `now_ms`.
pub fn is_fresh_at(
    timestamp_ms: &str,
    window_minutes: u32,
    now_ms: i64,
) -> Result<bool, TimestampFormatError> {
    let target = parse_timestamp_ms(timestamp_ms)?;
    let now = now_ms as f64;
    let window = f64::from(window_minutes) * MS_PER_MINUTE;
    Ok(now - window <= target && target <= now + window)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_766_416_500_000;
    const TEN_MIN: i64 = 600_000;

    #[test]
    fn test_now_is_fresh() {
        assert_eq!(is_fresh_at(&NOW.to_string(), 10, NOW), Ok(true));
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        assert_eq!(is_fresh_at(&(NOW - TEN_MIN).to_string(), 10, NOW), Ok(true));
        assert_eq!(is_fresh_at(&(NOW + TEN_MIN).to_string(), 10, NOW), Ok(true));
        assert_eq!(
            is_fresh_at(&(NOW - TEN_MIN - 1).to_string(), 10, NOW),
            Ok(false)
        );
        assert_eq!(
            is_fresh_at(&(NOW + TEN_MIN + 1).to_string(), 10, NOW),
            Ok(false)
        );
    }

    #[test]
    fn test_window_is_symmetric() {
        let skew = 5 * 60_000;
        assert_eq!(is_fresh_at(&(NOW + skew).to_string(), 10, NOW), Ok(true));
        assert_eq!(is_fresh_at(&(NOW - skew).to_string(), 10, NOW), Ok(true));
    }

    #[test]
    fn test_twenty_minutes_old_is_stale() {
        let old = NOW - 20 * 60_000;
        assert_eq!(is_fresh_at(&old.to_string(), 10, NOW), Ok(false));
        assert_eq!(is_fresh_at(&old.to_string(), 15, NOW), Ok(false));
        assert_eq!(is_fresh_at(&old.to_string(), 30, NOW), Ok(true));
    }

    #[test]
    fn test_float_timestamp() {
        let ts = format!("{}.75", NOW - 1000);
        assert_eq!(is_fresh_at(&ts, 10, NOW), Ok(true));
        assert_eq!(parse_timestamp_ms("1.5e3"), Ok(1500.0));
    }

    #[test]
    fn test_unsupported_format() {
        for raw in ["", "yesterday", "2024-01-01T00:00:00Z", "NaN", "inf"] {
            assert_eq!(
                is_fresh_at(raw, 10, NOW),
                Err(TimestampFormatError(raw.to_string())),
                "{raw:?} should not parse"
            );
        }
    }

    #[test]
    fn test_wall_clock() {
        let now = Utc::now().timestamp_millis();
        assert_eq!(is_fresh(&now.to_string(), 10), Ok(true));
        assert_eq!(is_fresh("1000", 10), Ok(false));
    }
}
