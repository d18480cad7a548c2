//! Working hours and UTC interval arithmetic.
//!
//! All slot math happens on UTC instants. Local wall-clock times only appear
//! when a party's working window for a given local date is turned into an
//! absolute interval.

use chrono::{DateTime, Datelike, LocalResult, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// A half-open UTC interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn duration(&self) -> TimeDelta {
        if self.is_empty() {
            TimeDelta::zero()
        } else {
            self.end - self.start
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        let clipped = Interval::new(self.start.max(other.start), self.end.min(other.end));
        (!clipped.is_empty()).then_some(clipped)
    }
}

/// Sorts intervals and merges overlapping or touching ones.
pub fn normalize(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.retain(|i| !i.is_empty());
    intervals.sort();

    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end => {
                last.end = last.end.max(interval.end);
            }
            _ => merged.push(interval),
        }
    }
    merged
}

/// Pairwise intersection of two interval sets.
pub fn intersect_all(a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    let a = normalize(a.to_vec());
    let b = normalize(b.to_vec());

    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if let Some(overlap) = a[i].intersect(&b[j]) {
            out.push(overlap);
        }
        if a[i].end < b[j].end {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

/// Removes every `busy` interval from `free`.
pub fn subtract(free: &[Interval], busy: &[Interval]) -> Vec<Interval> {
    let busy = normalize(busy.to_vec());

    let mut out = Vec::new();
    for window in normalize(free.to_vec()) {
        let mut cursor = window.start;
        for blocked in busy.iter().filter(|b| b.end > window.start && b.start < window.end) {
            if blocked.start > cursor {
                out.push(Interval::new(cursor, blocked.start));
            }
            cursor = cursor.max(blocked.end);
        }
        if cursor < window.end {
            out.push(Interval::new(cursor, window.end));
        }
    }
    out
}

/// Daily working window in a party's local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub skip_weekends: bool,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
            skip_weekends: true,
        }
    }
}

impl WorkingHours {
    /// Builds weekday hours from whole local hours; `None` unless
    /// `start < end <= 23`.
    pub fn from_hours(start_hour: u32, end_hour: u32) -> Option<Self> {
        let start = NaiveTime::from_hms_opt(start_hour, 0, 0)?;
        let end = NaiveTime::from_hms_opt(end_hour, 0, 0)?;
        (start < end).then_some(Self {
            start,
            end,
            skip_weekends: true,
        })
    }

    pub fn skipping_weekends(mut self, skip: bool) -> Self {
        self.skip_weekends = skip;
        self
    }

    /// Length of one working day.
    pub fn day_length(&self) -> TimeDelta {
        self.end - self.start
    }

    /// The working window on a local `date` in `tz`, as a UTC interval.
    ///
    /// Ignores `skip_weekends`; callers that tile slots filter weekends
    /// themselves through [`WorkingHours::windows`].
    pub fn window_on(&self, tz: Tz, date: NaiveDate) -> Option<Interval> {
        let start = local_to_utc(tz, date, self.start)?;
        let end = local_to_utc(tz, date, self.end)?;
        let window = Interval::new(start, end);
        (!window.is_empty()).then_some(window)
    }

    /// Working windows in `tz` that overlap `range`, clipped to it.
    pub fn windows(&self, tz: Tz, range: Interval) -> Vec<Interval> {
        if range.is_empty() {
            return Vec::new();
        }

        let first = range.start.with_timezone(&tz).date_naive();
        let last = range.end.with_timezone(&tz).date_naive();

        first
            .iter_days()
            .take_while(|date| *date <= last)
            .filter(|date| !(self.skip_weekends && is_weekend(*date)))
            .filter_map(|date| self.window_on(tz, date))
            .filter_map(|window| window.intersect(&range))
            .collect()
    }

    /// Share of a working day during which both parties are working, on the
    /// day `at` falls on for each of them. Clamped to `[0, 1]`.
    pub fn overlap_ratio(&self, a: Tz, b: Tz, at: DateTime<Utc>) -> f64 {
        let day = self.day_length().num_seconds();
        if day <= 0 {
            return 0.0;
        }

        let window_a = self.window_on(a, at.with_timezone(&a).date_naive());
        let window_b = self.window_on(b, at.with_timezone(&b).date_naive());

        let shared = match (window_a, window_b) {
            (Some(wa), Some(wb)) => wa.intersect(&wb).map(|i| i.duration()).unwrap_or_default(),
            _ => TimeDelta::zero(),
        };

        (shared.num_seconds() as f64 / day as f64).clamp(0.0, 1.0)
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Resolves a local wall-clock time. Ambiguous times take the earlier
/// instant; times inside a DST gap resolve to the instant after the gap.
pub fn local_to_utc(tz: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => tz
            .from_local_datetime(&(naive + TimeDelta::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}
