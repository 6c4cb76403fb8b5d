//! Text formats for temporal values.
//!
//! SQLite has no temporal storage class, so timestamps, dates and times are
//! stored as text: `YYYY-MM-DD HH:MM:SS[.ffffff]`, `YYYY-MM-DD` and
//! `HH:MM:SS[.ffffff]`. The fractional part is written only when non-zero.

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, SubsecRound, Timelike};

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

/// Formats a timestamp as `YYYY-MM-DD HH:MM:SS[.ffffff]`.
pub fn format_timestamp(dt: &NaiveDateTime) -> String {
    if dt.nanosecond() == 0 {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

/// Formats a date as `YYYY-MM-DD`.
pub fn format_date(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Formats a time as `HH:MM:SS[.ffffff]`.
pub fn format_time(t: &NaiveTime) -> String {
    if t.nanosecond() == 0 {
        t.format("%H:%M:%S").to_string()
    } else {
        t.format("%H:%M:%S%.6f").to_string()
    }
}

/// Parses a timestamp. A bare date is accepted and read as midnight.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| parse_date(s).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// Parses a date. A full timestamp is accepted and truncated to its date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().or_else(|| {
        TIMESTAMP_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .map(|dt| dt.date())
    })
}

/// Parses a time of day.
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}

/// The current local time at microsecond precision, which is what survives
/// a round trip through the text format.
pub fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(6)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(h: u32, m: u32, s: u32, micro: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2012, 2, 6)
            .unwrap()
            .and_hms_micro_opt(h, m, s, micro)
            .unwrap()
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(&ts(9, 5, 1, 0)), "2012-02-06 09:05:01");
        assert_eq!(
            format_timestamp(&ts(9, 5, 1, 250)),
            "2012-02-06 09:05:01.000250"
        );
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("2012-02-06 09:05:01"), Some(ts(9, 5, 1, 0)));
        assert_eq!(
            parse_timestamp("2012-02-06 09:05:01.000250"),
            Some(ts(9, 5, 1, 250))
        );
        assert_eq!(parse_timestamp("2012-02-06T09:05:01"), Some(ts(9, 5, 1, 0)));
        assert_eq!(parse_timestamp("2012-02-06"), Some(ts(0, 0, 0, 0)));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_dates_and_times() {
        let d = NaiveDate::from_ymd_opt(2012, 2, 6).unwrap();
        assert_eq!(format_date(&d), "2012-02-06");
        assert_eq!(parse_date("2012-02-06"), Some(d));
        assert_eq!(parse_date("2012-02-06 10:00:00"), Some(d));

        let t = NaiveTime::from_hms_micro_opt(10, 30, 0, 5).unwrap();
        assert_eq!(format_time(&t), "10:30:00.000005");
        assert_eq!(parse_time("10:30:00.000005"), Some(t));
        assert_eq!(
            parse_time("10:30"),
            NaiveTime::from_hms_opt(10, 30, 0)
        );
    }

    #[test]
    fn test_now_round_trips() {
        let n = now();
        assert_eq!(parse_timestamp(&format_timestamp(&n)), Some(n));
    }
}
