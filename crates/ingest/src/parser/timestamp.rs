//! Timestamp helpers shared by the dialect builders.
//!
//! Every function answers `Option<i64>` epoch milliseconds; callers fall back
//! to [`now_ms`] instead of failing an entry. Zone-less timestamps are read
//! as UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Ingestion wall-clock time.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// `Tue Jan 02 2024 10:00:00 GMT+0100`, as printed by JavaScript `Date`.
static JS_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Z][a-z]{2} [A-Z][a-z]{2} \d{1,2} \d{4} \d{2}:\d{2}:\d{2} GMT[+-]\d{4}").unwrap()
});

/// `Tue, 02 Jan 2024 10:00:00 GMT` (RFC 2822 / HTTP date).
static RFC2822_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Z][a-z]{2}, \d{1,2} [A-Z][a-z]{2} \d{4} \d{2}:\d{2}:\d{2} (?:GMT|UTC|[+-]\d{4})").unwrap()
});

/// ISO-8601 with an explicit zone.
static ISO_ZONED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d{1,9})?(?:Z|[+-]\d{2}:?\d{2})").unwrap()
});

/// Find a zone-qualified timestamp inside free text.
/// Returns the instant and the matched text.
pub fn find_embedded(text: &str) -> Option<(i64, String)> {
    if let Some(m) = JS_DATE.find(text) {
        if let Ok(dt) = DateTime::parse_from_str(m.as_str(), "%a %b %d %Y %H:%M:%S GMT%z") {
            return Some((dt.timestamp_millis(), m.as_str().to_string()));
        }
    }
    if let Some(m) = RFC2822_DATE.find(text) {
        if let Ok(dt) = DateTime::parse_from_rfc2822(m.as_str()) {
            return Some((dt.timestamp_millis(), m.as_str().to_string()));
        }
    }
    if let Some(m) = ISO_ZONED.find(text) {
        if let Some(ms) = parse_iso_zoned(m.as_str()) {
            return Some((ms, m.as_str().to_string()));
        }
    }
    None
}

fn parse_iso_zoned(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    // `+0100` without the colon
    DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z")
        .ok()
        .map(|dt| dt.timestamp_millis())
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse a standalone timestamp in any of the shapes the dialects use:
/// RFC 3339, RFC 2822, zone-less ISO variants (`,` or `.` before the
/// fraction), and epoch seconds or milliseconds.
pub fn parse_flexible(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(ms) = parse_epoch(s) {
        return Some(ms);
    }
    if let Some(ms) = parse_iso_zoned(s) {
        return Some(ms);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.timestamp_millis());
    }

    let normalized = normalize_fraction(s);
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp_millis())
}

fn parse_epoch(s: &str) -> Option<i64> {
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (s, None),
    };
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if let Some(f) = frac_part {
        if f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }

    let value: i64 = int_part.parse().ok()?;
    match int_part.len() {
        // seconds (optionally with fraction)
        9 | 10 => {
            let millis = frac_part.map(fraction_to_millis).unwrap_or(0);
            Some(value * 1000 + millis)
        }
        // already milliseconds
        12 | 13 if frac_part.is_none() => Some(value),
        _ => None,
    }
}

/// `10:00:00,123` → `10:00:00.123`
fn normalize_fraction(s: &str) -> String {
    match s.rfind(',') {
        Some(idx) if s[idx + 1..].bytes().all(|b| b.is_ascii_digit()) && idx + 1 < s.len() => {
            let mut out = s.to_string();
            out.replace_range(idx..idx + 1, ".");
            out
        }
        _ => s.to_string(),
    }
}

/// Up to three leading digits of a fraction, right-padded: `5` → 500.
fn fraction_to_millis(frac: &str) -> i64 {
    let mut millis = 0i64;
    let mut digits = 0;
    for b in frac.bytes().take(3) {
        millis = millis * 10 + i64::from(b - b'0');
        digits += 1;
    }
    while digits < 3 {
        millis *= 10;
        digits += 1;
    }
    millis
}

/// Split `HH:MM:SS[,.]fff[ AM|PM]` into a time of day and milliseconds.
fn parse_clock(time: &str) -> Option<(NaiveTime, i64)> {
    let t = time.trim();
    let (t, meridiem) = match t.len().checked_sub(2).filter(|&i| t.is_char_boundary(i)).map(|i| t.split_at(i)) {
        Some((head, tail)) if tail.eq_ignore_ascii_case("AM") => (head.trim_end(), Some(false)),
        Some((head, tail)) if tail.eq_ignore_ascii_case("PM") => (head.trim_end(), Some(true)),
        _ => (t, None),
    };

    let (clock, millis) = match t.find([',', '.']) {
        Some(idx) => {
            let frac = &t[idx + 1..];
            if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            (&t[..idx], fraction_to_millis(frac))
        }
        None => (t, 0),
    };

    let parsed = NaiveTime::parse_from_str(clock, "%H:%M:%S").ok()?;
    let parsed = match meridiem {
        Some(pm) => {
            use chrono::Timelike;
            let hour = parsed.hour();
            if hour == 0 || hour > 12 {
                return None;
            }
            let hour24 = match (pm, hour) {
                (false, 12) => 0,
                (false, h) => h,
                (true, 12) => 12,
                (true, h) => h + 12,
            };
            parsed.with_hour(hour24)?
        }
        None => parsed,
    };
    Some((parsed, millis))
}

/// Header date + time of the locale sub-format: `01/02/2024` + `10:00:00,123`.
/// The date reads month first.
pub fn from_locale_parts(date: &str, time: &str) -> Option<i64> {
    let date = NaiveDate::parse_from_str(date.trim(), "%m/%d/%Y").ok()?;
    combine(date, time)
}

/// Header date + time of the ISO sub-format: `2024-01-02` + `10:00:00.123`.
pub fn from_iso_parts(date: &str, time: &str) -> Option<i64> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    combine(date, time)
}

fn combine(date: NaiveDate, time: &str) -> Option<i64> {
    let (clock, millis) = parse_clock(time)?;
    let naive = date.and_time(clock);
    Some(Utc.from_utc_datetime(&naive).timestamp_millis() + millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(s: &str) -> i64 {
        DateTime::parse_from_rfc3339(s).unwrap().timestamp_millis()
    }

    #[test]
    fn test_locale_parts() {
        assert_eq!(from_locale_parts("01/02/2024", "10:00:00"), Some(ms("2024-01-02T10:00:00Z")));
        assert_eq!(from_locale_parts("1/2/2024", "10:00:00,250"), Some(ms("2024-01-02T10:00:00.250Z")));
        assert_eq!(from_locale_parts("01/02/2024", "1:05:00 PM"), Some(ms("2024-01-02T13:05:00Z")));
        assert_eq!(from_locale_parts("01/02/2024", "12:30:00 AM"), Some(ms("2024-01-02T00:30:00Z")));
        assert_eq!(from_locale_parts("13/45/2024", "10:00:00"), None);
        assert_eq!(from_locale_parts("01/02/2024", "10:00"), None);
    }

    #[test]
    fn test_iso_parts() {
        assert_eq!(from_iso_parts("2024-01-02", "10:00:00.5"), Some(ms("2024-01-02T10:00:00.500Z")));
        assert_eq!(from_iso_parts("2024-01-02", "10:00:00,123456"), Some(ms("2024-01-02T10:00:00.123Z")));
        assert_eq!(from_iso_parts("2024-02-30", "10:00:00"), None);
    }

    #[test]
    fn test_embedded_js_date() {
        let text = "call started at Tue Jan 02 2024 10:00:00 GMT+0100 (Central European Time)";
        let (at, matched) = find_embedded(text).unwrap();
        assert_eq!(at, ms("2024-01-02T09:00:00Z"));
        assert_eq!(matched, "Tue Jan 02 2024 10:00:00 GMT+0100");
    }

    #[test]
    fn test_embedded_rfc2822_and_iso() {
        let (at, _) = find_embedded("Date: Tue, 02 Jan 2024 10:00:00 GMT").unwrap();
        assert_eq!(at, ms("2024-01-02T10:00:00Z"));

        let (at, _) = find_embedded("event ts=2024-01-02T10:00:00.750Z ok").unwrap();
        assert_eq!(at, ms("2024-01-02T10:00:00.750Z"));

        assert!(find_embedded("no zone 2024-01-02 10:00:00").is_none());
    }

    #[test]
    fn test_flexible() {
        assert_eq!(parse_flexible("2024-01-02T10:00:00Z"), Some(ms("2024-01-02T10:00:00Z")));
        assert_eq!(parse_flexible("2024-01-02 10:00:00,125"), Some(ms("2024-01-02T10:00:00.125Z")));
        assert_eq!(parse_flexible("2024/01/02 10:00:00.1"), Some(ms("2024-01-02T10:00:00.100Z")));
        assert_eq!(parse_flexible("2024-01-02T10:00:00.123456"), Some(ms("2024-01-02T10:00:00.123Z")));
        assert_eq!(parse_flexible("1704189600"), Some(ms("2024-01-02T10:00:00Z")));
        assert_eq!(parse_flexible("1704189600.5"), Some(ms("2024-01-02T10:00:00.500Z")));
        assert_eq!(parse_flexible("1704189600123"), Some(ms("2024-01-02T10:00:00.123Z")));
        assert_eq!(parse_flexible("yesterday"), None);
        assert_eq!(parse_flexible(""), None);
    }
}
