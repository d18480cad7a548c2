//! ISO-8601 week buckets.

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::EventError;

/// An ISO-8601 week (`2026-W42`).
///
/// Buckets are always derived from an absolute instant plus the organization
/// reference timezone through [`WeekBucket::of`], so every writer and reader
/// agrees on which week an interview belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeekBucket {
    iso_year: i32,
    week: u32,
}

impl WeekBucket {
    /// The ISO week containing `instant` as observed in `tz`.
    pub fn of(instant: DateTime<Utc>, tz: Tz) -> Self {
        let iso = instant.with_timezone(&tz).iso_week();
        Self {
            iso_year: iso.year(),
            week: iso.week(),
        }
    }

    /// ISO week-numbering year (may differ from the calendar year near January 1).
    pub fn iso_year(&self) -> i32 {
        self.iso_year
    }

    /// Week number, 1 through 53.
    pub fn week(&self) -> u32 {
        self.week
    }

    /// Parses the `YYYY-Www` form.
    pub fn parse(s: &str) -> Result<Self, EventError> {
        let invalid = || EventError::InvalidWeekBucket(s.to_string());

        let (year, week) = s.split_once("-W").ok_or_else(invalid)?;
        let iso_year: i32 = year.parse().map_err(|_| invalid())?;
        let week: u32 = week.parse().map_err(|_| invalid())?;

        if !(1..=53).contains(&week) {
            return Err(invalid());
        }

        Ok(Self { iso_year, week })
    }
}

impl std::fmt::Display for WeekBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-W{:02}", self.iso_year, self.week)
    }
}

impl std::str::FromStr for WeekBucket {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for WeekBucket {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WeekBucket {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_week_bucket_display() {
        let bucket = WeekBucket::of(utc(2026, 1, 1, 12), chrono_tz::UTC);
        assert_eq!(bucket.to_string(), "2026-W01");
    }

    #[test]
    fn test_week_bucket_year_boundary() {
        // 2027-01-01 is a Friday and still belongs to the last week of 2026.
        let bucket = WeekBucket::of(utc(2027, 1, 1, 12), chrono_tz::UTC);
        assert_eq!(bucket.iso_year(), 2026);
        assert_eq!(bucket.week(), 53);
    }

    #[test]
    fn test_week_bucket_depends_on_reference_zone() {
        // Monday 03:00 UTC is still Sunday evening in Los Angeles.
        let instant = utc(2026, 10, 19, 3);
        let in_utc = WeekBucket::of(instant, chrono_tz::UTC);
        let in_la = WeekBucket::of(instant, chrono_tz::America::Los_Angeles);
        assert_eq!(in_utc.to_string(), "2026-W43");
        assert_eq!(in_la.to_string(), "2026-W42");
    }

    #[test]
    fn test_week_bucket_parse() {
        let bucket: WeekBucket = "2026-W07".parse().unwrap();
        assert_eq!(bucket.iso_year(), 2026);
        assert_eq!(bucket.week(), 7);

        assert!(WeekBucket::parse("2026-07").is_err());
        assert!(WeekBucket::parse("2026-W00").is_err());
        assert!(WeekBucket::parse("2026-W54").is_err());
    }

    #[test]
    fn test_week_bucket_ordering() {
        let a = WeekBucket::parse("2025-W52").unwrap();
        let b = WeekBucket::parse("2026-W01").unwrap();
        assert!(a < b);
    }
}
