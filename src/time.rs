//! Wall-clock helpers. All instants in tidepool are milliseconds since the
//! Unix epoch, UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// The current time in milliseconds since the epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Floor `ts` to a multiple of `width`
///
/// Flooring is Euclidean so instants before the epoch still land on exact
/// multiples. `width` must be positive.
#[inline]
pub fn align(ts: i64, width: i64) -> i64 {
    ts.div_euclid(width) * width
}

/// Parse a user supplied instant
///
/// Accepts epoch milliseconds, RFC 3339 instants, and offset-less
/// `YYYY-MM-DDTHH:MM:SS[.fff]` or `YYYY-MM-DD` forms which are read as UTC.
/// Anything else is `None`.
pub fn parse_instant(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ms) = raw.parse::<i64>() {
        return Some(ms);
    }
    if let Ok(ms) = raw.parse::<f64>() {
        if ms.is_finite() && ms.abs() < 9.0e15 {
            return Some(ms.floor() as i64);
        }
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    for fmt in &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive).timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp_millis())
}

/// Render an instant as ISO-8601 with millisecond precision, `Z` suffixed.
pub fn format_instant(ms: i64) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => ms.to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use quickcheck::{QuickCheck, TestResult};

    #[test]
    fn align_floors_to_width() {
        assert_eq!(10_000, align(14_999, 5_000));
        assert_eq!(15_000, align(15_000, 5_000));
        assert_eq!(-5_000, align(-1, 5_000));
    }

    #[test]
    fn align_is_exact_multiple() {
        fn inner(ts: i32, width: u16) -> TestResult {
            if width == 0 {
                return TestResult::discard();
            }
            let (ts, width) = (i64::from(ts), i64::from(width));
            let start = align(ts, width);
            assert_eq!(0, start % width);
            assert!(start <= ts);
            assert!(ts - start < width);
            TestResult::passed()
        }
        QuickCheck::new()
            .tests(1000)
            .quickcheck(inner as fn(i32, u16) -> TestResult);
    }

    #[test]
    fn parses_epoch_millis() {
        assert_eq!(Some(1_768_816_800_000), parse_instant("1768816800000"));
        assert_eq!(Some(1_500), parse_instant("1500.9"));
    }

    #[test]
    fn parses_iso_forms() {
        let expected = Some(1_768_816_800_000);
        assert_eq!(expected, parse_instant("2026-01-19T10:00:00Z"));
        assert_eq!(expected, parse_instant("2026-01-19T10:00:00.000Z"));
        assert_eq!(expected, parse_instant("2026-01-19T11:00:00+01:00"));
        assert_eq!(expected, parse_instant("2026-01-19T10:00:00"));
        assert_eq!(Some(1_768_780_800_000), parse_instant("2026-01-19"));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(None, parse_instant(""));
        assert_eq!(None, parse_instant("yesterday"));
        assert_eq!(None, parse_instant("NaN"));
        assert_eq!(None, parse_instant("2026-13-45"));
    }

    #[test]
    fn formats_with_millis() {
        assert_eq!("2026-01-19T10:00:00.000Z", format_instant(1_768_816_800_000));
        assert_eq!("1970-01-01T00:00:05.250Z", format_instant(5_250));
    }
}
