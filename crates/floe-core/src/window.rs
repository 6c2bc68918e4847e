//! Processing windows and schedule step sizes.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{ConfigError, InvalidIntervalSnafu, InvalidStepSizeSnafu};
use snafu::prelude::*;

/// Clock skew subtracted from the execution timestamp before deriving a
/// window, so a run triggered at the boundary still covers the period
/// that just closed.
pub const DEFAULT_CLOCK_SKEW_HOURS: i64 = 3;

/// A schedule step of the form `<amount><unit>`, e.g. `1D` or `6H`.
///
/// Units are hours (`H`), days (`D`) and months (`M`); a month is a
/// fixed 30 days for stepping purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSize {
    pub amount: u32,
    pub unit: StepUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepUnit {
    Hour,
    Day,
    Month,
}

impl StepUnit {
    pub fn seconds(&self) -> i64 {
        match self {
            StepUnit::Hour => 3_600,
            StepUnit::Day => 86_400,
            StepUnit::Month => 30 * 86_400,
        }
    }
}

impl StepSize {
    pub fn duration(&self) -> Duration {
        Duration::seconds(self.amount as i64 * self.unit.seconds())
    }

    /// Minimum age a bucket must reach before it is considered settled.
    pub fn threshold(&self) -> Duration {
        self.duration()
    }
}

impl FromStr for StepSize {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let unit_char = value.chars().last().context(InvalidStepSizeSnafu { value })?;
        let digits = &value[..value.len() - unit_char.len_utf8()];

        let amount: u32 = digits
            .parse()
            .ok()
            .filter(|amount| *amount > 0)
            .context(InvalidStepSizeSnafu { value })?;
        let unit = match unit_char {
            'H' => StepUnit::Hour,
            'D' => StepUnit::Day,
            'M' => StepUnit::Month,
            _ => return InvalidStepSizeSnafu { value }.fail(),
        };
        Ok(StepSize { amount, unit })
    }
}

impl<'de> Deserialize<'de> for StepSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for StepSize {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let unit = match self.unit {
            StepUnit::Hour => "H",
            StepUnit::Day => "D",
            StepUnit::Month => "M",
        };
        serializer.serialize_str(&format!("{}{}", self.amount, unit))
    }
}

/// A recurring run interval, matching cron-preset style tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Hourly,
    Daily,
    Weekly,
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        Interval::parse(&tag).map_err(serde::de::Error::custom)
    }
}

impl Interval {
    /// Parse an interval tag, accepting an optional `@` prefix.
    pub fn parse(tag: &str) -> Result<Self, ConfigError> {
        match tag.trim_start_matches('@') {
            "hourly" => Ok(Interval::Hourly),
            "daily" => Ok(Interval::Daily),
            "weekly" => Ok(Interval::Weekly),
            _ => InvalidIntervalSnafu { tag }.fail(),
        }
    }

    pub fn length(&self) -> Duration {
        match self {
            Interval::Hourly => Duration::hours(1),
            Interval::Daily => Duration::days(1),
            Interval::Weekly => Duration::weeks(1),
        }
    }
}

/// A half-open-in-spirit extraction window `[start, end]` at second
/// precision, derived from an execution timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ProcessingWindow {
    /// Derive the window for a scheduled execution.
    ///
    /// The skew is subtracted first, then the window spans one interval
    /// length back from the adjusted timestamp.
    pub fn from_execution(
        execution_ts: NaiveDateTime,
        interval: Interval,
        skew: Duration,
    ) -> Self {
        let end = execution_ts - skew;
        let start = end - interval.length();
        ProcessingWindow { start, end }
    }

    pub fn start_str(&self) -> String {
        self.start.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_step_size_parse() {
        assert_eq!(
            "1D".parse::<StepSize>().unwrap(),
            StepSize {
                amount: 1,
                unit: StepUnit::Day
            }
        );
        assert_eq!(
            "6H".parse::<StepSize>().unwrap().duration(),
            Duration::hours(6)
        );
        assert_eq!(
            "1M".parse::<StepSize>().unwrap().duration(),
            Duration::days(30)
        );

        assert!("".parse::<StepSize>().is_err());
        assert!("D".parse::<StepSize>().is_err());
        assert!("0D".parse::<StepSize>().is_err());
        assert!("1W".parse::<StepSize>().is_err());
    }

    #[test]
    fn test_threshold_scales_with_amount() {
        assert_eq!(
            "12H".parse::<StepSize>().unwrap().threshold(),
            Duration::hours(12)
        );
        assert_eq!(
            "2D".parse::<StepSize>().unwrap().threshold(),
            Duration::days(2)
        );
    }

    #[test]
    fn test_interval_parse() {
        assert_eq!(Interval::parse("daily").unwrap(), Interval::Daily);
        assert_eq!(Interval::parse("@hourly").unwrap(), Interval::Hourly);
        assert!(Interval::parse("@monthly").is_err());
    }

    #[test]
    fn test_window_from_execution() {
        let window = ProcessingWindow::from_execution(
            ts(2024, 1, 2, 3),
            Interval::Daily,
            Duration::hours(DEFAULT_CLOCK_SKEW_HOURS),
        );
        assert_eq!(window.end, ts(2024, 1, 2, 0));
        assert_eq!(window.start, ts(2024, 1, 1, 0));
        assert_eq!(window.start_str(), "2024-01-01 00:00:00");
        assert_eq!(window.end_str(), "2024-01-02 00:00:00");
    }
}
