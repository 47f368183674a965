//! Local calendar conversions
//!
//! Host dates are absolute instants (milliseconds since the Unix epoch);
//! foreign dates are wall-clock local time. A [`Calendar`] converts between
//! the two in some time zone.

use crate::variant::CalendarFields;
use chrono::{Local, TimeZone};

/// Instant <-> local wall-clock conversion.
pub trait Calendar: Send + Sync {
    /// Local fields of an instant. `None` if out of range.
    fn to_local(&self, epoch_ms: i64) -> Option<CalendarFields>;

    /// Instant for local fields. Ambiguous local times resolve to the
    /// earliest instant; nonexistent ones (a forward transition) fail.
    fn from_local(&self, fields: &CalendarFields) -> Option<i64>;
}

/// [`Calendar`] over a chrono time zone.
#[derive(Debug, Clone, Copy)]
pub struct LocalCalendar<Tz: TimeZone> {
    tz: Tz,
}

impl LocalCalendar<Local> {
    /// The process's local time zone.
    pub fn system() -> Self {
        Self { tz: Local }
    }
}

impl Default for LocalCalendar<Local> {
    fn default() -> Self {
        Self::system()
    }
}

impl<Tz: TimeZone> LocalCalendar<Tz> {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn time_zone(&self) -> &Tz {
        &self.tz
    }
}

impl<Tz> Calendar for LocalCalendar<Tz>
where
    Tz: TimeZone + Send + Sync,
{
    fn to_local(&self, epoch_ms: i64) -> Option<CalendarFields> {
        let instant = self.tz.timestamp_millis_opt(epoch_ms).single()?;
        Some(CalendarFields::from_naive(&instant.naive_local()))
    }

    fn from_local(&self, fields: &CalendarFields) -> Option<i64> {
        let naive = fields.to_naive()?;
        let instant = self.tz.from_local_datetime(&naive).earliest()?;
        Some(instant.timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_utc_roundtrip() {
        let calendar = LocalCalendar::new(Utc);
        let fields = CalendarFields::new(2020, 2, 29).at(23, 59, 59, 999);
        let ms = calendar.from_local(&fields).unwrap();
        assert_eq!(ms, 1_583_020_799_999);
        assert_eq!(calendar.to_local(ms), Some(fields));
    }

    #[test]
    fn test_before_unix_epoch() {
        let calendar = LocalCalendar::new(Utc);
        let fields = CalendarFields::new(1969, 12, 31).at(23, 59, 59, 500);
        assert_eq!(calendar.from_local(&fields), Some(-500));
        assert_eq!(calendar.to_local(-500), Some(fields));
    }
}
