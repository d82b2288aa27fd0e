//! Temporal types for month-granular bookkeeping
//!
//! This module provides:
//! - `YearMonth`: the granularity at which profit is distributed
//! - Clamped month arithmetic for due-date generation
//! - A `Clock` port so date-dependent logic is deterministic in tests

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;
use thiserror::Error;

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid month number: {0} (expected 1-12)")]
    InvalidMonth(u32),

    #[error("Invalid year-month string: {0} (expected YYYY-MM)")]
    Parse(String),
}

/// A calendar year and month, e.g. 2025-07
///
/// Earnings are keyed by `(shareholder, YearMonth)`, so this type needs
/// total ordering and a stable string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Creates a year-month, validating the month number
    pub fn new(year: i32, month: u32) -> Result<Self, TemporalError> {
        if !(1..=12).contains(&month) {
            return Err(TemporalError::InvalidMonth(month));
        }
        Ok(Self { year, month })
    }

    /// The year-month a date falls in
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// First day of this month
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .expect("valid year-month always has a first day")
    }

    /// This month shifted forward by `months`
    pub fn plus_months(&self, months: u32) -> Self {
        let total = self.year * 12 + (self.month as i32 - 1) + months as i32;
        Self {
            year: total.div_euclid(12),
            month: (total.rem_euclid(12) + 1) as u32,
        }
    }

    /// This month shifted backward by `months`
    pub fn minus_months(&self, months: u32) -> Self {
        let total = self.year * 12 + (self.month as i32 - 1) - months as i32;
        Self {
            year: total.div_euclid(12),
            month: (total.rem_euclid(12) + 1) as u32,
        }
    }

    /// True if this month is strictly after `other`
    pub fn is_after(&self, other: &YearMonth) -> bool {
        self > other
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = TemporalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| TemporalError::Parse(s.to_string()))?;
        let year: i32 = year.parse().map_err(|_| TemporalError::Parse(s.to_string()))?;
        let month: u32 = month.parse().map_err(|_| TemporalError::Parse(s.to_string()))?;
        Self::new(year, month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Returns the number of days in the month of the given year
fn days_in_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next.expect("valid month")
        .pred_opt()
        .expect("month has a last day")
        .day()
}

/// Shifts a date forward by whole months, clamping the day of month
///
/// `2025-01-31 + 1 month` is `2025-02-28`; due-date sequences generated from
/// a month-end start date stay at month end where possible.
pub fn add_months_clamped(date: NaiveDate, months: u32) -> NaiveDate {
    let target = YearMonth::from_date(date).plus_months(months);
    let day = date.day().min(days_in_month(target.year(), target.month()));
    NaiveDate::from_ymd_opt(target.year(), target.month(), day)
        .expect("clamped day is always valid")
}

/// Time source consumed by the domain services
///
/// Production code uses [`SystemClock`]; tests pin dates with [`FixedClock`]
/// so overdue checks and month keys are reproducible.
pub trait Clock: Send + Sync {
    /// Today's calendar date
    fn today(&self) -> NaiveDate;

    /// The current instant
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// The current year-month
    fn current_month(&self) -> YearMonth {
        YearMonth::from_date(self.today())
    }
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Clock pinned to a settable date, for tests
#[derive(Debug)]
pub struct FixedClock {
    today: RwLock<NaiveDate>,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: RwLock::new(today),
        }
    }

    /// Moves the pinned date
    pub fn set_today(&self, today: NaiveDate) {
        *self.today.write().expect("clock lock poisoned") = today;
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.today.read().expect("clock lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_month_validation() {
        assert!(YearMonth::new(2025, 12).is_ok());
        assert_eq!(YearMonth::new(2025, 13), Err(TemporalError::InvalidMonth(13)));
        assert_eq!(YearMonth::new(2025, 0), Err(TemporalError::InvalidMonth(0)));
    }

    #[test]
    fn test_year_month_display_and_parse() {
        let ym = YearMonth::new(2025, 7).unwrap();
        assert_eq!(ym.to_string(), "2025-07");
        assert_eq!("2025-07".parse::<YearMonth>().unwrap(), ym);
        assert!("garbage".parse::<YearMonth>().is_err());
    }

    #[test]
    fn test_year_month_arithmetic() {
        let ym = YearMonth::new(2025, 11).unwrap();
        assert_eq!(ym.plus_months(1), YearMonth::new(2025, 12).unwrap());
        assert_eq!(ym.plus_months(2), YearMonth::new(2026, 1).unwrap());
        assert_eq!(ym.minus_months(11), YearMonth::new(2024, 12).unwrap());
    }

    #[test]
    fn test_year_month_ordering() {
        let earlier = YearMonth::new(2025, 6).unwrap();
        let later = YearMonth::new(2025, 7).unwrap();
        assert!(later.is_after(&earlier));
        assert!(!earlier.is_after(&later));
    }

    #[test]
    fn test_add_months_clamps_day() {
        let jan31 = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        assert_eq!(
            add_months_clamped(jan31, 1),
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()
        );
        assert_eq!(
            add_months_clamped(jan31, 2),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()
        );
    }

    #[test]
    fn test_add_months_crosses_year() {
        let nov15 = NaiveDate::from_ymd_opt(2025, 11, 15).unwrap();
        assert_eq!(
            add_months_clamped(nov15, 3),
            NaiveDate::from_ymd_opt(2026, 2, 15).unwrap()
        );
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock::new(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap());
        assert_eq!(clock.current_month(), YearMonth::new(2025, 7).unwrap());

        clock.set_today(NaiveDate::from_ymd_opt(2025, 8, 2).unwrap());
        assert_eq!(clock.current_month(), YearMonth::new(2025, 8).unwrap());
    }
}
