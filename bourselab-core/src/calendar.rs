//! Calendar normalization.
//!
//! The price source reports trading days in the exchange's own calendar
//! (Jalali) or as Gregorian instants, depending on the endpoint and era of
//! the row. Everything downstream works on a single canonical type:
//! `chrono::NaiveDate`, day granularity, timezone-naive.
//!
//! Normalization is a pure total function. Input that cannot be interpreted
//! as a date yields `None` rather than an error — callers filter and count
//! the drops.

use chrono::{NaiveDate, NaiveDateTime};

/// A date as it arrives from the wire, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawDate {
    /// A Gregorian-compatible instant (time-of-day is discarded).
    Gregorian(NaiveDateTime),
    /// A Jalali (Solar Hijri) calendar date.
    Jalali { year: i32, month: u32, day: u32 },
    /// The source supplied something unrecognizable as a date.
    Undated,
}

/// Normalize a raw date to a canonical Gregorian calendar day.
///
/// Returns `None` for `Undated` input and for Jalali dates outside the
/// representable range. Idempotent: normalizing an already-canonical
/// Gregorian date returns the same day.
pub fn normalize(raw: &RawDate) -> Option<NaiveDate> {
    match raw {
        RawDate::Gregorian(dt) => Some(dt.date()),
        RawDate::Jalali { year, month, day } => jalali_to_gregorian(*year, *month, *day),
        RawDate::Undated => None,
    }
}

/// Whether a Jalali year is a leap year under the 33-year arithmetic cycle.
pub fn is_jalali_leap_year(year: i32) -> bool {
    (25 * year as i64 + 11).rem_euclid(33) < 8
}

/// Number of days in a Jalali month.
fn jalali_month_days(year: i32, month: u32) -> u32 {
    match month {
        1..=6 => 31,
        7..=11 => 30,
        12 => {
            if is_jalali_leap_year(year) {
                30
            } else {
                29
            }
        }
        _ => 0,
    }
}

/// Convert a Jalali calendar date to the proleptic Gregorian calendar.
///
/// Uses the widely deployed 33-year-cycle civil algorithm, which agrees
/// with the astronomical calendar for every year that carries market data.
/// Returns `None` for out-of-range components (including day 30 of Esfand
/// in a non-leap year).
pub fn jalali_to_gregorian(jy: i32, jm: u32, jd: u32) -> Option<NaiveDate> {
    if !(1..=12).contains(&jm) || jd < 1 || jd > jalali_month_days(jy, jm) {
        return None;
    }
    let jy = i64::from(jy) + 1595;
    if jy <= 0 {
        return None;
    }

    let month_days = if jm < 7 {
        (i64::from(jm) - 1) * 31
    } else {
        (i64::from(jm) - 7) * 30 + 186
    };
    let mut days: i64 =
        -355668 + 365 * jy + (jy / 33) * 8 + ((jy % 33) + 3) / 4 + i64::from(jd) + month_days;
    if days < 1 {
        return None;
    }

    let mut gy: i64 = 400 * (days / 146097);
    days %= 146097;
    if days > 36524 {
        days -= 1;
        gy += 100 * (days / 36524);
        days %= 36524;
        if days >= 365 {
            days += 1;
        }
    }
    gy += 4 * (days / 1461);
    days %= 1461;
    if days > 365 {
        gy += (days - 1) / 365;
        days = (days - 1) % 365;
    }

    let leap = (gy % 4 == 0 && gy % 100 != 0) || gy % 400 == 0;
    let month_table: [i64; 12] = [
        31,
        if leap { 29 } else { 28 },
        31,
        30,
        31,
        30,
        31,
        31,
        30,
        31,
        30,
        31,
    ];

    let mut gd = days + 1;
    let mut gm = 0usize;
    while gm < 12 && gd > month_table[gm] {
        gd -= month_table[gm];
        gm += 1;
    }

    NaiveDate::from_ymd_opt(i32::try_from(gy).ok()?, gm as u32 + 1, gd as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn nowruz_conversions() {
        assert_eq!(jalali_to_gregorian(1403, 1, 1), Some(date(2024, 3, 20)));
        assert_eq!(jalali_to_gregorian(1400, 1, 1), Some(date(2021, 3, 21)));
        assert_eq!(jalali_to_gregorian(1398, 1, 1), Some(date(2019, 3, 21)));
    }

    #[test]
    fn end_of_year_conversions() {
        // 1399 is a leap year: Esfand has 30 days.
        assert_eq!(jalali_to_gregorian(1399, 12, 30), Some(date(2021, 3, 20)));
        // 1402 is not: Esfand 29 is the last day.
        assert_eq!(jalali_to_gregorian(1402, 12, 29), Some(date(2024, 3, 19)));
    }

    #[test]
    fn leap_year_cycle() {
        assert!(is_jalali_leap_year(1399));
        assert!(is_jalali_leap_year(1403));
        assert!(!is_jalali_leap_year(1400));
        assert!(!is_jalali_leap_year(1402));
    }

    #[test]
    fn rejects_invalid_components() {
        assert_eq!(jalali_to_gregorian(1400, 13, 1), None);
        assert_eq!(jalali_to_gregorian(1400, 0, 1), None);
        assert_eq!(jalali_to_gregorian(1400, 1, 32), None);
        assert_eq!(jalali_to_gregorian(1400, 7, 31), None);
        // Esfand 30 only exists in leap years.
        assert_eq!(jalali_to_gregorian(1400, 12, 30), None);
    }

    #[test]
    fn normalize_truncates_time_of_day() {
        let dt = date(2020, 6, 1).and_hms_opt(14, 30, 5).unwrap();
        assert_eq!(normalize(&RawDate::Gregorian(dt)), Some(date(2020, 6, 1)));
    }

    #[test]
    fn normalize_is_idempotent_on_canonical_dates() {
        let d = date(2023, 11, 7);
        let once = normalize(&RawDate::Gregorian(d.and_hms_opt(0, 0, 0).unwrap())).unwrap();
        let twice = normalize(&RawDate::Gregorian(once.and_hms_opt(0, 0, 0).unwrap())).unwrap();
        assert_eq!(once, d);
        assert_eq!(twice, once);
    }

    #[test]
    fn normalize_undated_is_none() {
        assert_eq!(normalize(&RawDate::Undated), None);
    }
}
