//! Daily cron-style schedule expressions
//!
//! Only the subset needed for a daily backup is accepted: `minute hour * * *`,
//! where minute and hour are each a number or `*`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BackupError;

/// A single field of the expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Any,
    At(u32),
}

impl Field {
    fn parse(raw: &str, name: &str, max: u32) -> Result<Self, BackupError> {
        if raw == "*" {
            return Ok(Self::Any);
        }
        let value: u32 = raw.parse().map_err(|_| {
            BackupError::Config(format!("Invalid {} field in schedule: '{}'", name, raw))
        })?;
        if value > max {
            return Err(BackupError::Config(format!(
                "Schedule {} must be between 0 and {}, got {}",
                name, max, value
            )));
        }
        Ok(Self::At(value))
    }

    fn matches(&self, value: u32) -> bool {
        match self {
            Self::Any => true,
            Self::At(expected) => *expected == value,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::At(value) => write!(f, "{}", value),
        }
    }
}

/// When the scheduled backup fires, evaluated in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScheduleSpec {
    minute: Field,
    hour: Field,
}

impl ScheduleSpec {
    /// Every day at `hour:minute` UTC
    pub fn daily_at(hour: u32, minute: u32) -> Result<Self, BackupError> {
        Ok(Self {
            minute: Field::parse(&minute.to_string(), "minute", 59)?,
            hour: Field::parse(&hour.to_string(), "hour", 23)?,
        })
    }

    /// Whether the schedule fires at the given (minute-aligned) instant
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        self.minute.matches(at.minute()) && self.hour.matches(at.hour())
    }

    /// The first firing strictly after `after`
    pub fn next_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let floor = after
            .duration_trunc(Duration::minutes(1))
            .unwrap_or(after);
        let mut candidate = floor + Duration::minutes(1);

        // A daily schedule always matches within one day of minutes
        for _ in 0..=(24 * 60) {
            if self.matches(candidate) {
                return candidate;
            }
            candidate += Duration::minutes(1);
        }
        candidate
    }
}

impl Default for ScheduleSpec {
    /// Midnight UTC every day
    fn default() -> Self {
        Self {
            minute: Field::At(0),
            hour: Field::At(0),
        }
    }
}

impl FromStr for ScheduleSpec {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(BackupError::Config(format!(
                "Schedule must have 5 fields (minute hour day month weekday), got '{}'",
                s
            )));
        }
        if fields[2..].iter().any(|f| *f != "*") {
            return Err(BackupError::Config(format!(
                "Only daily schedules are supported; day, month and weekday must be '*' in '{}'",
                s
            )));
        }

        Ok(Self {
            minute: Field::parse(fields[0], "minute", 59)?,
            hour: Field::parse(fields[1], "hour", 23)?,
        })
    }
}

impl TryFrom<String> for ScheduleSpec {
    type Error = BackupError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScheduleSpec> for String {
    fn from(spec: ScheduleSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} * * *", self.minute, self.hour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_default_is_midnight() {
        assert_eq!(ScheduleSpec::default().to_string(), "0 0 * * *");
    }

    #[test]
    fn test_parse_round_trip() {
        let spec: ScheduleSpec = "30 2 * * *".parse().unwrap();
        assert_eq!(spec.to_string(), "30 2 * * *");
        assert_eq!(spec, ScheduleSpec::daily_at(2, 30).unwrap());
    }

    #[test]
    fn test_parse_rejects_unsupported() {
        assert!("0 0 1 * *".parse::<ScheduleSpec>().is_err());
        assert!("0 24 * * *".parse::<ScheduleSpec>().is_err());
        assert!("0 0 * *".parse::<ScheduleSpec>().is_err());
        assert!("x 0 * * *".parse::<ScheduleSpec>().is_err());
    }

    #[test]
    fn test_next_after_same_day() {
        let spec: ScheduleSpec = "30 2 * * *".parse().unwrap();
        assert_eq!(spec.next_after(at(1, 0, 0)), at(2, 30, 0));
    }

    #[test]
    fn test_next_after_is_strict() {
        let spec = ScheduleSpec::default();
        let midnight = at(0, 0, 0);
        assert_eq!(spec.next_after(midnight), midnight + Duration::days(1));
        assert_eq!(
            spec.next_after(midnight + Duration::seconds(5)),
            midnight + Duration::days(1)
        );
    }

    #[test]
    fn test_next_after_wildcard_minute() {
        let spec: ScheduleSpec = "* 3 * * *".parse().unwrap();
        assert_eq!(spec.next_after(at(3, 10, 30)), at(3, 11, 0));
        assert_eq!(spec.next_after(at(3, 59, 0)), at(3, 0, 0) + Duration::days(1));
    }

    #[test]
    fn test_serde_as_string() {
        let spec: ScheduleSpec = serde_json::from_str("\"15 4 * * *\"").unwrap();
        assert_eq!(spec, ScheduleSpec::daily_at(4, 15).unwrap());
        assert_eq!(serde_json::to_string(&spec).unwrap(), "\"15 4 * * *\"");
        assert!(serde_json::from_str::<ScheduleSpec>("\"bogus\"").is_err());
    }
}
