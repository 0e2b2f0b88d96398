//! Date windows for a run.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid date window: start {start} is not before end {end}")]
pub struct WindowError {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Half-open date range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, WindowError> {
        if start >= end {
            return Err(WindowError { start, end });
        }
        Ok(Self { start, end })
    }

    /// The single calendar day `date`.
    pub fn single_day(date: NaiveDate) -> Self {
        let end = date.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX);
        Self { start: date, end }
    }

    /// The day before `today`.
    pub fn yesterday(today: NaiveDate) -> Self {
        let start = today.checked_sub_days(Days::new(1)).unwrap_or(NaiveDate::MIN);
        Self { start, end: today }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Exclusive end date.
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Inclusive UTC start instant.
    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// Exclusive UTC end instant.
    pub fn end_utc(&self) -> DateTime<Utc> {
        self.end.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start_utc() && ts < self.end_utc()
    }

    /// Calendar days covered, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d < self.end)
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn yesterday_is_one_day_before_today() {
        let w = DateWindow::yesterday(date(2024, 3, 5));
        assert_eq!(w.start(), date(2024, 3, 4));
        assert_eq!(w.end(), date(2024, 3, 5));
        assert_eq!(w.days().collect::<Vec<_>>(), vec![date(2024, 3, 4)]);
    }

    #[test]
    fn window_is_half_open() {
        let w = DateWindow::single_day(date(2024, 3, 4));
        assert!(w.contains(Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()));
        assert!(w.contains(Utc.with_ymd_and_hms(2024, 3, 4, 23, 59, 0).unwrap()));
        assert!(!w.contains(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap()));
    }

    #[test]
    fn empty_window_is_rejected() {
        assert!(DateWindow::new(date(2024, 3, 4), date(2024, 3, 4)).is_err());
    }
}
