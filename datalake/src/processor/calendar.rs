use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeZone, Timelike, Utc};
use common::config::TimeZoneMode;

/// Calendar breakdown of one event timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFields {
    /// Wall-clock time in the chosen zone, as epoch-style milliseconds.
    pub start_time: i64,
    pub hour: i32,
    pub day: i32,
    /// ISO 8601 week number.
    pub week: i32,
    pub month: i32,
    pub year: i32,
    /// 1 = Sunday ... 7 = Saturday.
    pub weekday: i32,
}

impl CalendarFields {
    /// Converts epoch milliseconds. `None` when the value is outside chrono's range.
    pub fn from_epoch_millis(ts: i64, zone: TimeZoneMode) -> Option<Self> {
        let utc = DateTime::<Utc>::from_timestamp_millis(ts)?;
        let wall_clock = match zone {
            TimeZoneMode::Utc => utc.naive_utc(),
            TimeZoneMode::Local => Local.from_utc_datetime(&utc.naive_utc()).naive_local(),
        };
        Some(Self::from_wall_clock(wall_clock))
    }

    fn from_wall_clock(dt: NaiveDateTime) -> Self {
        Self {
            start_time: dt.and_utc().timestamp_millis(),
            hour: dt.hour() as i32,
            day: dt.day() as i32,
            week: dt.iso_week().week() as i32,
            month: dt.month() as i32,
            year: dt.year(),
            weekday: dt.weekday().number_from_sunday() as i32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakdown_of_known_timestamp() {
        // 2018-11-01T21:01:46.796Z, a Thursday
        let fields = CalendarFields::from_epoch_millis(1541106106796, TimeZoneMode::Utc).unwrap();

        assert_eq!(fields.start_time, 1541106106796);
        assert_eq!(fields.year, 2018);
        assert_eq!(fields.month, 11);
        assert_eq!(fields.day, 1);
        assert_eq!(fields.hour, 21);
        assert_eq!(fields.week, 44);
        assert_eq!(fields.weekday, 5);
    }

    #[test]
    fn test_iso_week_crosses_year_boundary() {
        // 2018-12-31 belongs to ISO week 1 of 2019
        let fields = CalendarFields::from_epoch_millis(1546214400000, TimeZoneMode::Utc).unwrap();
        assert_eq!((fields.year, fields.month, fields.day), (2018, 12, 31));
        assert_eq!(fields.week, 1);
        assert_eq!(fields.weekday, 2);
    }

    #[test]
    fn test_local_zone_matches_chrono_local() {
        let ts = 1541106106796;
        let expected = Local.timestamp_millis_opt(ts).unwrap();
        let fields = CalendarFields::from_epoch_millis(ts, TimeZoneMode::Local).unwrap();

        assert_eq!(fields.hour, expected.hour() as i32);
        assert_eq!(fields.day, expected.day() as i32);
        assert_eq!(fields.year, expected.year());
    }

    #[test]
    fn test_out_of_range_timestamp_is_rejected() {
        assert!(CalendarFields::from_epoch_millis(i64::MAX, TimeZoneMode::Utc).is_none());
    }
}
