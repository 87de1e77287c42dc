//! Cadence-aligned timestamps.
//!
//! Every instant the pipeline handles sits on the 10-minute grid. Filenames
//! carry the `YYYYMMDDHHMM000` datestring form; operators type the shorter
//! `YYYYMMDDHHMM` form on the command line.

use std::fmt;

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Spacing of the time grid, in minutes
pub const CADENCE_MINUTES: i64 = 10;

/// Errors produced while parsing or aligning timestamps
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("'{input}' is not a valid time (expected YYYYMMDDHHMM)")]
    Unparsable { input: String },

    #[error("{time} is not aligned to the 10-minute cadence")]
    OffGrid { time: String },
}

/// A UTC instant on the cadence grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Wrap an instant that is already on the grid
    pub fn from_datetime(dt: DateTime<Utc>) -> Result<Self, TimestampError> {
        if dt.second() != 0
            || dt.nanosecond() != 0
            || i64::from(dt.minute()) % CADENCE_MINUTES != 0
        {
            return Err(TimestampError::OffGrid {
                time: dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            });
        }
        Ok(Self(dt))
    }

    /// Truncate an instant down to the grid
    pub fn floor(dt: DateTime<Utc>) -> Self {
        let minute = (i64::from(dt.minute()) / CADENCE_MINUTES * CADENCE_MINUTES) as u32;
        let truncated = dt
            .with_nanosecond(0)
            .and_then(|d| d.with_second(0))
            .and_then(|d| d.with_minute(minute))
            .unwrap_or(dt);
        Self(truncated)
    }

    /// Current time truncated down to the grid
    pub fn now_floor() -> Self {
        Self::floor(Utc::now())
    }

    /// Parse `YYYYMMDDHHMM` or the datestring form `YYYYMMDDHHMM000`
    pub fn parse(input: &str) -> Result<Self, TimestampError> {
        let unparsable = || TimestampError::Unparsable {
            input: input.to_string(),
        };

        let trimmed = input.trim();
        let digits = match trimmed.len() {
            12 => trimmed,
            15 if trimmed.ends_with("000") => &trimmed[..12],
            _ => return Err(unparsable()),
        };
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(unparsable());
        }

        let field = |range: std::ops::Range<usize>| -> Result<u32, TimestampError> {
            digits[range].parse::<u32>().map_err(|_| unparsable())
        };
        let year = field(0..4)? as i32;
        let dt = Utc
            .with_ymd_and_hms(year, field(4..6)?, field(6..8)?, field(8..10)?, field(10..12)?, 0)
            .single()
            .ok_or_else(unparsable)?;

        Self::from_datetime(dt)
    }

    /// The `YYYYMMDDHHMM000` form used inside artifact filenames
    pub fn datestring(&self) -> String {
        self.0.format("%Y%m%d%H%M000").to_string()
    }

    /// The `YYYYMMDDHHMM` form
    pub fn compact(&self) -> String {
        self.0.format("%Y%m%d%H%M").to_string()
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Step back `steps` cadence intervals
    pub fn minus_steps(&self, steps: u32) -> Self {
        Self(self.0 - Duration::minutes(CADENCE_MINUTES * i64::from(steps)))
    }

    /// Step forward `steps` cadence intervals
    pub fn plus_steps(&self, steps: u32) -> Self {
        Self(self.0 + Duration::minutes(CADENCE_MINUTES * i64::from(steps)))
    }

    /// Signed distance from `earlier` to `self`, in minutes
    pub fn minutes_since(&self, earlier: &Timestamp) -> i64 {
        (self.0 - earlier.0).num_minutes()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M UTC"))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.datestring())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Timestamp::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compact_and_datestring_forms() {
        let a = Timestamp::parse("202501151230").unwrap();
        let b = Timestamp::parse("202501151230000").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.datestring(), "202501151230000");
        assert_eq!(a.compact(), "202501151230");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            Timestamp::parse("2025-01-15"),
            Err(TimestampError::Unparsable { .. })
        ));
        assert!(matches!(
            Timestamp::parse("202513151230"),
            Err(TimestampError::Unparsable { .. })
        ));
        assert!(matches!(
            Timestamp::parse("20250115123a"),
            Err(TimestampError::Unparsable { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_off_grid() {
        assert!(matches!(
            Timestamp::parse("202501151234"),
            Err(TimestampError::OffGrid { .. })
        ));
    }

    #[test]
    fn test_floor_truncates_to_grid() {
        let dt = Utc.with_ymd_and_hms(2025, 1, 15, 12, 37, 45).unwrap();
        let ts = Timestamp::floor(dt);
        assert_eq!(ts.compact(), "202501151230");
    }

    #[test]
    fn test_minus_steps_crosses_midnight() {
        let ts = Timestamp::parse("202501150010").unwrap();
        assert_eq!(ts.minus_steps(2).compact(), "202501142350");
        assert_eq!(ts.minutes_since(&ts.minus_steps(2)), 20);
        assert_eq!(ts.minus_steps(2).plus_steps(2), ts);
    }

    #[test]
    fn test_serde_uses_datestring() {
        let ts = Timestamp::parse("202501151230").unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"202501151230000\"");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }
}
