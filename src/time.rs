// Time utility functions

use crate::error::{self, CacheError};
use crate::Error;
use crate::Result;
use chrono::{DateTime, TimeDelta, Utc};

enum Time {
    Second,
    Minute,
    Hour,
    Day,
}

impl Time {
    fn to_seconds(&self) -> u64 {
        match self {
            Time::Second => 1,
            Time::Minute => 60,
            Time::Hour => 3600,
            Time::Day => 86400,
        }
    }
}

impl TryFrom<char> for Time {
    type Error = Error;

    fn try_from(time: char) -> std::result::Result<Self, Self::Error> {
        match time {
            's' => Ok(Time::Second),
            'm' => Ok(Time::Minute),
            'h' => Ok(Time::Hour),
            'd' => Ok(Time::Day),
            _ => Err(error::gen(format!(
                "Unknown char time format: {time} - valid types are s, m, h, d"
            ))),
        }
    }
}

/// Wall clock used to stamp and check cache expirations.
pub type Clock = fn() -> DateTime<Utc>;

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct Seconds(u64);

impl Seconds {
    pub const fn new(seconds: u64) -> Self {
        Seconds(seconds)
    }

    /// Signed duration suitable for timestamp arithmetic. Saturates at the
    /// largest representable delta.
    pub fn to_delta(self) -> TimeDelta {
        i64::try_from(self.0)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }
}

/// Convert a string with time format to seconds.
/// A string with time format can be anything like:
/// 1s, 2s, 2 seconds, 2 second, 2seconds, 2second, 2 s
/// The same would apply for minutes, hours and days
/// Processing stops at the first non-digit character
fn string_to_seconds(str_fmt: &str) -> Result<Seconds> {
    let mut seconds: u64 = 0;
    for c in str_fmt.chars() {
        if let Some(digit) = c.to_digit(10) {
            seconds = seconds
                .checked_mul(10)
                .and_then(|s| s.checked_add(digit as u64))
                .ok_or_else(|| error::gen(format!("Time value too large: {str_fmt}")))?;
        } else {
            if c.is_whitespace() {
                continue;
            }
            seconds = seconds.saturating_mul(Time::try_from(c)?.to_seconds());
            break;
        }
    }
    Ok(Seconds(seconds))
}

impl TryFrom<&str> for Seconds {
    type Error = CacheError;

    fn try_from(str_fmt: &str) -> std::result::Result<Self, Self::Error> {
        match string_to_seconds(str_fmt) {
            Ok(seconds) => Ok(seconds),
            Err(err) => Err(CacheError::TimeConversionError(format!(
                "Could not convert {str_fmt} to time format: {err}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_formatted_string_to_seconds() {
        let test_table = vec![
            ("1s", Seconds(1)),
            ("2 seconds", Seconds(2)),
            ("2second", Seconds(2)),
            ("1m", Seconds(60)),
            ("2 minutes", Seconds(120)),
            ("1h", Seconds(3600)),
            ("2hours", Seconds(7200)),
            ("1d", Seconds(86400)),
            ("2 days", Seconds(172800)),
            // If no time format is specified, it defaults to seconds
            ("300", Seconds(300)),
            // empty string is zero
            ("", Seconds(0)),
        ];
        for (input, expected) in test_table {
            let actual = string_to_seconds(input).unwrap();
            assert_eq!(expected.0, actual.0);
        }
    }

    #[test]
    fn test_cannot_convert_time_formatted_string_to_seconds() {
        let input_err = "2x"; // user meant 2d and typed 2x
        assert!(string_to_seconds(input_err).is_err());
        match Seconds::try_from(input_err) {
            Err(CacheError::TimeConversionError(msg)) => assert!(msg.contains("2x")),
            _ => panic!("Expected TimeConversionError"),
        }
    }

    #[test]
    fn test_overflowing_time_is_error() {
        assert!(string_to_seconds("99999999999999999999999").is_err());
    }

    #[test]
    fn test_seconds_to_delta() {
        assert_eq!(TimeDelta::seconds(3600), Seconds::new(3600).to_delta());
        assert_eq!(TimeDelta::MAX, Seconds::new(u64::MAX).to_delta());
    }
}
