// 📅 Calendar Primitives - Date-only values, timezone-safe
//
// A CalendarDate is "a day on the Gregorian calendar": no time-of-day,
// no offset. `YYYY-MM-DD` strings are built straight from their y/m/d
// components, so formatting then parsing never drifts by a day whatever
// the host timezone is. Only the fallback path for full timestamps looks
// at a timezone, to find the local day the instant falls on.

use crate::error::{RenewalError, Result};
use chrono::{DateTime, Datelike, Days, Local, Months, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Timestamp shapes without an offset: already local wall-clock time.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Date-only shapes seen in imported data.
const NAIVE_DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y/%m/%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y"];

/// Years expressible as four `YYYY` digits. Arithmetic leaving this range
/// is `DateOutOfRange`, so every CalendarDate formats and parses back.
pub const MIN_YEAR: i32 = 0;
pub const MAX_YEAR: i32 = 9999;

// ============================================================================
// CALENDAR DATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CalendarDate(NaiveDate);

impl CalendarDate {
    /// Build from components; Feb 30, month 13 etc. are InvalidDate.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(in_range)
            .ok_or_else(|| RenewalError::InvalidDate(format!("{year:04}-{month:02}-{day:02}")))
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }

    pub fn add_days(self, n: i64) -> Result<Self> {
        let shifted = if n >= 0 {
            self.0.checked_add_days(Days::new(n.unsigned_abs()))
        } else {
            self.0.checked_sub_days(Days::new(n.unsigned_abs()))
        };

        shifted
            .and_then(in_range)
            .ok_or_else(|| RenewalError::DateOutOfRange(format!("{self} {n:+} days")))
    }

    /// Add calendar months, clamping to the last day of the target month.
    ///
    /// 2024-01-31 + 1 → 2024-02-29, 2023-01-31 + 1 → 2023-02-28. The result
    /// always lands in the targeted month; it never rolls over into the next.
    pub fn add_months(self, n: i32) -> Result<Self> {
        let months = Months::new(n.unsigned_abs());
        let shifted = if n >= 0 {
            self.0.checked_add_months(months)
        } else {
            self.0.checked_sub_months(months)
        };

        shifted
            .and_then(in_range)
            .ok_or_else(|| RenewalError::DateOutOfRange(format!("{self} {n:+} months")))
    }

    /// Add whole years; Feb 29 lands on Feb 28 in a non-leap target year.
    pub fn add_years(self, n: i32) -> Result<Self> {
        let months = n
            .checked_mul(12)
            .ok_or_else(|| RenewalError::DateOutOfRange(format!("{self} {n:+} years")))?;
        self.add_months(months)
    }

    /// Signed number of days from `self` to `other` (positive if `other` is later).
    pub fn days_until(self, other: CalendarDate) -> i64 {
        (other.0 - self.0).num_days()
    }
}

impl TryFrom<NaiveDate> for CalendarDate {
    type Error = RenewalError;

    fn try_from(date: NaiveDate) -> Result<Self> {
        in_range(date).ok_or_else(|| RenewalError::DateOutOfRange(date.to_string()))
    }
}

fn in_range(date: NaiveDate) -> Option<CalendarDate> {
    (MIN_YEAR..=MAX_YEAR).contains(&date.year()).then_some(CalendarDate(date))
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.0.year(), self.0.month(), self.0.day())
    }
}

impl FromStr for CalendarDate {
    type Err = RenewalError;

    fn from_str(s: &str) -> Result<Self> {
        parse_calendar_date(s)
    }
}

impl TryFrom<String> for CalendarDate {
    type Error = RenewalError;

    fn try_from(value: String) -> Result<Self> {
        parse_calendar_date(&value)
    }
}

impl From<CalendarDate> for String {
    fn from(date: CalendarDate) -> Self {
        format_calendar_date(date)
    }
}

// ============================================================================
// PARSING & FORMATTING
// ============================================================================

/// Parse a date string against the process-local timezone.
///
/// See [`parse_calendar_date_in`] for the rules.
pub fn parse_calendar_date(s: &str) -> Result<CalendarDate> {
    parse_calendar_date_in(s, &Local)
}

/// Parse a date string, resolving full timestamps against `tz`.
///
/// `YYYY-MM-DD` is taken literally and `tz` is never consulted. Anything
/// else is read as a timestamp and truncated to the calendar day it falls
/// on in `tz`.
pub fn parse_calendar_date_in<Tz: TimeZone>(s: &str, tz: &Tz) -> Result<CalendarDate> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(RenewalError::InvalidDate(s.to_string()));
    }

    if let Some((year, month, day)) = split_ymd(trimmed) {
        return NaiveDate::from_ymd_opt(year, month, day)
            .map(CalendarDate)
            .ok_or_else(|| RenewalError::InvalidDate(s.to_string()));
    }

    parse_timestamp_in(trimmed, tz)
        .and_then(in_range)
        .ok_or_else(|| RenewalError::InvalidDate(s.to_string()))
}

/// Canonical zero-padded `YYYY-MM-DD`.
pub fn format_calendar_date(date: CalendarDate) -> String {
    date.to_string()
}

/// Current local calendar day. The only wall-clock read in the core.
pub fn today() -> CalendarDate {
    CalendarDate(Local::now().date_naive())
}

pub fn compare(a: CalendarDate, b: CalendarDate) -> Ordering {
    a.cmp(&b)
}

fn split_ymd(s: &str) -> Option<(i32, u32, u32)> {
    let bytes = s.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }

    let all_digits = |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_digit);
    if !(all_digits(0..4) && all_digits(5..7) && all_digits(8..10)) {
        return None;
    }

    Some((s[0..4].parse().ok()?, s[5..7].parse().ok()?, s[8..10].parse().ok()?))
}

fn parse_timestamp_in<Tz: TimeZone>(s: &str, tz: &Tz) -> Option<NaiveDate> {
    // Offset-bearing instants: find the day they fall on in `tz`
    let with_offset = DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_rfc2822(s))
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z"));
    if let Ok(instant) = with_offset {
        return Some(instant.with_timezone(tz).date_naive());
    }

    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|local| local.date())
        .or_else(|| {
            NAIVE_DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use proptest::prelude::*;

    fn date(s: &str) -> CalendarDate {
        parse_calendar_date(s).unwrap()
    }

    #[test]
    fn test_parse_and_format_ymd() {
        let d = date("2025-03-10");
        assert_eq!(d.year(), 2025);
        assert_eq!(d.month(), 3);
        assert_eq!(d.day(), 10);
        assert_eq!(format_calendar_date(d), "2025-03-10");

        // Zero padding survives
        assert_eq!(format_calendar_date(date("0999-01-05")), "0999-01-05");
    }

    #[test]
    fn test_invalid_dates() {
        for bad in ["", "   ", "2025-13-01", "2025-02-30", "2023-02-29", "not a date", "2025-1-1x"] {
            assert!(
                matches!(parse_calendar_date(bad), Err(RenewalError::InvalidDate(_))),
                "{bad:?} should be InvalidDate"
            );
        }
    }

    #[test]
    fn test_timezone_independence_for_ymd() {
        let west = FixedOffset::west_opt(12 * 3600).unwrap();
        let east = FixedOffset::east_opt(14 * 3600).unwrap();

        for tz in [west, east] {
            let d = parse_calendar_date_in("2025-03-10", &tz).unwrap();
            assert_eq!(format_calendar_date(d), "2025-03-10");
        }
    }

    #[test]
    fn test_timestamp_fallback_truncates_to_local_day() {
        let west = FixedOffset::west_opt(12 * 3600).unwrap();
        let east = FixedOffset::east_opt(14 * 3600).unwrap();

        // Midday UTC is still the 10th at UTC-12 but already the 11th at UTC+14
        let s = "2025-03-10T12:00:00Z";
        assert_eq!(parse_calendar_date_in(s, &west).unwrap().to_string(), "2025-03-10");
        assert_eq!(parse_calendar_date_in(s, &east).unwrap().to_string(), "2025-03-11");

        // Midnight UTC is the previous day behind UTC
        let s = "2025-03-10T00:00:00.000Z";
        assert_eq!(parse_calendar_date_in(s, &west).unwrap().to_string(), "2025-03-09");

        // No offset: the wall-clock day is taken as-is in any zone
        let s = "2025-03-10T23:30:00";
        assert_eq!(parse_calendar_date_in(s, &west).unwrap().to_string(), "2025-03-10");
        assert_eq!(parse_calendar_date_in(s, &east).unwrap().to_string(), "2025-03-10");
    }

    #[test]
    fn test_other_date_shapes() {
        assert_eq!(date("12/31/2024").to_string(), "2024-12-31");
        assert_eq!(date("2024/02/29").to_string(), "2024-02-29");
        assert_eq!(date("March 5, 2025").to_string(), "2025-03-05");
        assert_eq!(date("  2025-03-10  ").to_string(), "2025-03-10");
    }

    #[test]
    fn test_month_end_clamping() {
        assert_eq!(date("2024-01-31").add_months(1).unwrap(), date("2024-02-29"));
        assert_eq!(date("2023-01-31").add_months(1).unwrap(), date("2023-02-28"));
        assert_eq!(date("2025-03-31").add_months(1).unwrap(), date("2025-04-30"));
        assert_eq!(date("2025-08-31").add_months(6).unwrap(), date("2026-02-28"));
        assert_eq!(date("2025-03-31").add_months(-1).unwrap(), date("2025-02-28"));
    }

    #[test]
    fn test_leap_year_clamping() {
        assert_eq!(date("2024-02-29").add_years(1).unwrap(), date("2025-02-28"));
        assert_eq!(date("2024-02-29").add_years(4).unwrap(), date("2028-02-29"));
        assert_eq!(date("2023-02-28").add_years(1).unwrap(), date("2024-02-28"));
    }

    #[test]
    fn test_add_days() {
        assert_eq!(date("2024-12-25").add_days(7).unwrap(), date("2025-01-01"));
        assert_eq!(date("2024-03-01").add_days(-1).unwrap(), date("2024-02-29"));
        assert_eq!(date("2024-03-01").add_days(0).unwrap(), date("2024-03-01"));
    }

    #[test]
    fn test_out_of_range_arithmetic() {
        let d = date("2025-01-01");
        assert!(matches!(d.add_days(i64::MAX), Err(RenewalError::DateOutOfRange(_))));
        assert!(matches!(d.add_years(i32::MAX), Err(RenewalError::DateOutOfRange(_))));
    }

    #[test]
    fn test_four_digit_year_range() {
        assert_eq!(format_calendar_date(date("0000-01-01")), "0000-01-01");
        assert_eq!(format_calendar_date(date("9999-12-31")), "9999-12-31");

        assert!(matches!(date("9999-12-31").add_days(1), Err(RenewalError::DateOutOfRange(_))));
        assert!(matches!(date("0000-01-01").add_days(-1), Err(RenewalError::DateOutOfRange(_))));
        assert!(matches!(date("2025-01-01").add_years(8000), Err(RenewalError::DateOutOfRange(_))));
        assert!(matches!(date("9999-06-30").add_months(7), Err(RenewalError::DateOutOfRange(_))));
        assert!(CalendarDate::from_ymd(10_025, 1, 1).is_err());

        let far = NaiveDate::from_ymd_opt(10_025, 1, 1).unwrap();
        assert!(CalendarDate::try_from(far).is_err());
        assert_eq!(date("2025-01-01").add_years(7974).unwrap(), date("9999-01-01"));
    }

    #[test]
    fn test_compare_and_days_until() {
        let a = date("2025-01-01");
        let b = date("2025-01-11");
        assert_eq!(compare(a, b), Ordering::Less);
        assert_eq!(compare(b, a), Ordering::Greater);
        assert_eq!(compare(a, a), Ordering::Equal);
        assert_eq!(a.days_until(b), 10);
        assert_eq!(b.days_until(a), -10);
    }

    #[test]
    fn test_serde_as_string() {
        let d = date("2025-01-15");
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, "\"2025-01-15\"");

        let back: CalendarDate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);

        assert!(serde_json::from_str::<CalendarDate>("\"2025-02-30\"").is_err());
    }

    fn any_date() -> impl Strategy<Value = CalendarDate> {
        (MIN_YEAR..=MAX_YEAR, 1u32..=12, 1u32..=31)
            .prop_filter_map("valid date", |(y, m, d)| CalendarDate::from_ymd(y, m, d).ok())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn prop_round_trip(d in any_date()) {
            let s = format_calendar_date(d);
            prop_assert_eq!(parse_calendar_date(&s).unwrap(), d);
            prop_assert_eq!(format_calendar_date(parse_calendar_date(&s).unwrap()), s);
        }

        #[test]
        fn prop_round_trip_any_offset(d in any_date(), offset_hours in -12i32..=14) {
            let tz = FixedOffset::east_opt(offset_hours * 3600).unwrap();
            let s = format_calendar_date(d);
            prop_assert_eq!(parse_calendar_date_in(&s, &tz).unwrap(), d);
        }

        #[test]
        fn prop_arithmetic_result_round_trips(d in any_date(), years in -10_000i32..10_000) {
            // Either out of range, or a date that formats and parses back
            if let Ok(shifted) = d.add_years(years) {
                prop_assert_eq!(parse_calendar_date(&format_calendar_date(shifted)).unwrap(), shifted);
            }
        }

        #[test]
        fn prop_add_months_stays_in_target_month(d in any_date(), n in 0i32..240) {
            prop_assume!(d.year() < MAX_YEAR - 20);
            let shifted = d.add_months(n).unwrap();
            let target = (d.month() as i32 - 1 + n).rem_euclid(12) as u32 + 1;
            prop_assert_eq!(shifted.month(), target);
            prop_assert!(shifted.day() <= d.day());
        }
    }
}
