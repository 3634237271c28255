//! The historian's native time format.
//!
//! The archive stores instants as a 64-bit fixed point number: the upper 32 bits are whole
//! seconds since the Unix epoch and the lower 32 bits are the fraction of a second. This is
//! the only module that knows about that layout. Everything else converts through
//! [EpicsTime] into `f64` seconds or the `time` crate types.
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use super::error::EpicsTimeError;

/// One second in the fixed point format
pub const EPICS_SECOND: u64 = 1 << 32;

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// An instant in the historian's fixed point format.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EpicsTime(pub u64);

impl EpicsTime {
    /// Build from (fractional) seconds since the Unix epoch. Negative input clamps to the epoch.
    pub fn from_seconds(seconds: f64) -> Self {
        if seconds <= 0.0 || seconds.is_nan() {
            return Self(0);
        }
        Self((seconds * EPICS_SECOND as f64) as u64)
    }

    /// Seconds since the Unix epoch
    pub fn as_seconds(&self) -> f64 {
        self.0 as f64 / EPICS_SECOND as f64
    }

    /// Signed number of seconds from `earlier` to `self`
    pub fn seconds_since(&self, earlier: EpicsTime) -> f64 {
        if self.0 >= earlier.0 {
            (self.0 - earlier.0) as f64 / EPICS_SECOND as f64
        } else {
            -((earlier.0 - self.0) as f64 / EPICS_SECOND as f64)
        }
    }

    /// Same as [EpicsTime::seconds_since], as a `time::Duration`
    pub fn duration_since(&self, earlier: EpicsTime) -> Duration {
        Duration::seconds_f64(self.seconds_since(earlier))
    }

    /// Shift by a (possibly negative) number of seconds, saturating at the ends of the format
    pub fn add_seconds(&self, seconds: f64) -> Self {
        let shift = seconds * EPICS_SECOND as f64;
        if shift >= 0.0 {
            Self(self.0.saturating_add(shift as u64))
        } else {
            Self(self.0.saturating_sub((-shift) as u64))
        }
    }

    pub fn from_datetime(datetime: OffsetDateTime) -> Result<Self, EpicsTimeError> {
        let nanos = datetime.unix_timestamp_nanos();
        if nanos < 0 {
            return Err(EpicsTimeError::OutOfRange(datetime.to_string()));
        }
        let nanos = nanos as u128;
        let seconds = nanos / NANOS_PER_SECOND;
        if seconds > u32::MAX as u128 {
            return Err(EpicsTimeError::OutOfRange(datetime.to_string()));
        }
        let fraction = ((nanos % NANOS_PER_SECOND) << 32) / NANOS_PER_SECOND;
        Ok(Self(((seconds << 32) + fraction) as u64))
    }

    pub fn to_datetime(&self) -> Result<OffsetDateTime, EpicsTimeError> {
        let seconds = (self.0 >> 32) as i128;
        let fraction = (self.0 & (EPICS_SECOND - 1)) as u128;
        let nanos = ((fraction * NANOS_PER_SECOND) >> 32) as i128;
        OffsetDateTime::from_unix_timestamp_nanos(seconds * NANOS_PER_SECOND as i128 + nanos)
            .map_err(|_| EpicsTimeError::OutOfRange(format!("{:#x}", self.0)))
    }

    /// Parse a `YYYY-MM-DD HH:MM:SS` string, optionally with fractional seconds. The string
    /// is read as a wall clock time at the given offset from UTC.
    pub fn parse(time_str: &str, offset: UtcOffset) -> Result<Self, EpicsTimeError> {
        let format = format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"
        );
        let datetime = PrimitiveDateTime::parse(time_str.trim(), format)
            .map_err(|_| EpicsTimeError::BadTimeString(time_str.to_string()))?;
        Self::from_datetime(datetime.assume_offset(offset))
    }

    /// Format as `YYYY-MM-DD HH:MM:SS` at the given offset from UTC
    pub fn format(&self, offset: UtcOffset) -> Result<String, EpicsTimeError> {
        let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        self.to_datetime()?
            .to_offset(offset)
            .format(format)
            .map_err(|_| EpicsTimeError::OutOfRange(format!("{:#x}", self.0)))
    }
}

/// Always shown in UTC, marked as such, whatever offset the time was read at
impl Display for EpicsTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.format(UtcOffset::UTC) {
            Ok(s) => write!(f, "{s} UTC"),
            Err(_) => write!(f, "{:#x}", self.0),
        }
    }
}

/// Build a fixed UTC offset from a whole number of hours
pub fn utc_offset_hours(hours: i8) -> Result<UtcOffset, EpicsTimeError> {
    UtcOffset::from_hms(hours, 0, 0).map_err(|_| EpicsTimeError::BadOffset(hours))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_second_scaling() {
        let t = EpicsTime::parse("1970-01-01 00:00:10", UtcOffset::UTC).unwrap();
        assert_eq!(t.0, 10 * EPICS_SECOND);
        assert_eq!(t.as_seconds(), 10.0);
    }

    #[test]
    fn test_string_round_trip() {
        let s = "2018-09-01 00:00:00";
        let t = EpicsTime::parse(s, UtcOffset::UTC).unwrap();
        assert_eq!(t.format(UtcOffset::UTC).unwrap(), s);
        assert_eq!(t.to_datetime().unwrap(), datetime!(2018-09-01 00:00:00 UTC));
    }

    #[test]
    fn test_offset_applied() {
        let eastern = utc_offset_hours(-5).unwrap();
        let local = EpicsTime::parse("2018-09-01 00:00:00", eastern).unwrap();
        let utc = EpicsTime::parse("2018-09-01 05:00:00", UtcOffset::UTC).unwrap();
        assert_eq!(local, utc);
        assert_eq!(local.format(eastern).unwrap(), "2018-09-01 00:00:00");
        assert_eq!(local.to_string(), "2018-09-01 05:00:00 UTC");
    }

    #[test]
    fn test_fractional_seconds() {
        let t = EpicsTime::parse("1970-01-01 00:00:01.5", UtcOffset::UTC).unwrap();
        assert_eq!(t.0, EPICS_SECOND + EPICS_SECOND / 2);
    }

    #[test]
    fn test_bad_strings() {
        assert!(matches!(
            EpicsTime::parse("2018/09/01", UtcOffset::UTC),
            Err(EpicsTimeError::BadTimeString(_))
        ));
        assert!(matches!(
            EpicsTime::parse("1960-01-01 00:00:00", UtcOffset::UTC),
            Err(EpicsTimeError::OutOfRange(_))
        ));
        assert!(utc_offset_hours(30).is_err());
    }

    #[test]
    fn test_differences() {
        let a = EpicsTime::from_seconds(100.0);
        let b = a.add_seconds(2.5);
        assert_eq!(b.seconds_since(a), 2.5);
        assert_eq!(a.seconds_since(b), -2.5);
        assert_eq!(b.duration_since(a), Duration::milliseconds(2500));
        assert_eq!(a.add_seconds(-1000.0), EpicsTime(0));
    }
}
