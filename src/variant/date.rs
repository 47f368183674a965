//! Foreign date representation
//!
//! A foreign date is a double counting days since 1899-12-30 00:00, with the
//! time of day in the fractional part. For dates before the epoch the integer
//! part is negative but the fraction still moves forward through the day, so
//! `-1.25` is 1899-12-29 06:00.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use std::fmt;

const MS_PER_DAY: i64 = 86_400_000;
const MIN_YEAR: i32 = 100;
const MAX_YEAR: i32 = 9999;

/// Broken-down local calendar time, millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CalendarFields {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub millisecond: u32,
}

impl CalendarFields {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self {
            year,
            month,
            day,
            hour: 0,
            minute: 0,
            second: 0,
            millisecond: 0,
        }
    }

    pub fn at(mut self, hour: u32, minute: u32, second: u32, millisecond: u32) -> Self {
        self.hour = hour;
        self.minute = minute;
        self.second = second;
        self.millisecond = millisecond;
        self
    }

    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)?.and_hms_milli_opt(
            self.hour,
            self.minute,
            self.second,
            self.millisecond,
        )
    }

    pub fn from_naive(dt: &NaiveDateTime) -> Self {
        Self {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            hour: dt.hour(),
            minute: dt.minute(),
            second: dt.second(),
            millisecond: dt.nanosecond() / 1_000_000 % 1000,
        }
    }
}

/// Foreign date value.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct OleDate(f64);

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

impl OleDate {
    pub const fn from_raw(value: f64) -> Self {
        Self(value)
    }

    pub const fn raw(self) -> f64 {
        self.0
    }

    /// Encode calendar fields. `None` if the fields are not a valid date in
    /// years 100 through 9999.
    pub fn from_fields(fields: &CalendarFields) -> Option<Self> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&fields.year) {
            return None;
        }
        let dt = fields.to_naive()?;
        let days = (dt.date() - epoch().date()).num_days();
        let ms_of_day = i64::from(dt.num_seconds_from_midnight()) * 1000
            + i64::from(fields.millisecond);
        let frac = ms_of_day as f64 / MS_PER_DAY as f64;
        let value = if days >= 0 {
            days as f64 + frac
        } else {
            days as f64 - frac
        };
        Some(Self(value))
    }

    /// Decode to calendar fields, rounding to the nearest millisecond.
    pub fn to_fields(self) -> Option<CalendarFields> {
        if !self.0.is_finite() {
            return None;
        }
        let whole = self.0.trunc();
        let mut days = whole as i64;
        let mut ms_of_day = ((self.0 - whole).abs() * MS_PER_DAY as f64).round() as i64;
        if ms_of_day >= MS_PER_DAY {
            days += 1;
            ms_of_day -= MS_PER_DAY;
        }
        let date = epoch()
            .date()
            .checked_add_signed(chrono::Duration::try_days(days)?)?;
        if !(MIN_YEAR..=MAX_YEAR).contains(&date.year()) {
            return None;
        }
        let ms = ms_of_day as u32;
        let dt = date.and_hms_milli_opt(
            ms / 3_600_000,
            ms / 60_000 % 60,
            ms / 1000 % 60,
            ms % 1000,
        )?;
        Some(CalendarFields::from_naive(&dt))
    }
}

impl From<f64> for OleDate {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl fmt::Display for OleDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_fields().and_then(|c| c.to_naive()) {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.3f")),
            None => write!(f, "<invalid date {}>", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        let at = |f: CalendarFields| OleDate::from_fields(&f).unwrap().raw();
        assert_eq!(at(CalendarFields::new(1899, 12, 30)), 0.0);
        assert_eq!(at(CalendarFields::new(1900, 1, 1)), 2.0);
        assert_eq!(at(CalendarFields::new(2000, 1, 1).at(12, 0, 0, 0)), 36526.5);
        assert_eq!(at(CalendarFields::new(1899, 12, 29).at(6, 0, 0, 0)), -1.25);
    }

    #[test]
    fn test_decode_negative() {
        let fields = OleDate::from_raw(-1.25).to_fields().unwrap();
        assert_eq!(fields, CalendarFields::new(1899, 12, 29).at(6, 0, 0, 0));
    }

    #[test]
    fn test_millisecond_roundtrip() {
        let fields = CalendarFields::new(2021, 3, 14).at(1, 59, 26, 535);
        let date = OleDate::from_fields(&fields).unwrap();
        assert_eq!(date.to_fields(), Some(fields));
    }

    #[test]
    fn test_out_of_range() {
        assert!(OleDate::from_fields(&CalendarFields::new(99, 12, 31)).is_none());
        assert!(OleDate::from_fields(&CalendarFields::new(2021, 2, 30)).is_none());
        assert!(OleDate::from_raw(f64::NAN).to_fields().is_none());
        assert!(OleDate::from_raw(1.0e9).to_fields().is_none());
    }
}
