//! Lenient number and date parsing.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::debug;

/// Strings that mean "no value" rather than zero.
const NULL_MARKERS: &[&str] = &["", "none", "null", "na", "n/a", "-"];

/// Characters stripped before parsing: thousands separators and currency symbols.
const STRIPPED: &[char] = &[',', '$', '€', '£', '¥'];

/// Parses a reported amount.
///
/// Thousands separators and currency symbols are ignored, a parenthesized
/// amount is negative, and null markers (`"None"`, `"null"`, `"na"`, `"-"`,
/// empty) or any other unreadable text yield `None`.
///
/// ```
/// use finetl_normalize::parse_number;
///
/// assert_eq!(parse_number("(1,234.50)"), Some(-1234.5));
/// assert_eq!(parse_number("$500"), Some(500.0));
/// assert_eq!(parse_number("N/A"), None);
/// ```
#[must_use]
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if NULL_MARKERS.iter().any(|m| trimmed.eq_ignore_ascii_case(m)) {
        return None;
    }

    let cleaned: String = trimmed
        .chars()
        .filter(|c| !STRIPPED.contains(c) && !c.is_whitespace())
        .collect();

    let (negative, digits) = match cleaned.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, cleaned.as_str()),
    };

    match digits.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(if negative { -value } else { value }),
        _ => {
            debug!(raw, "Unparseable number");
            None
        }
    }
}

/// Parses a JSON value holding an amount, either as a number or as text.
#[must_use]
pub fn number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// Parses a fiscal date.
///
/// Accepts `YYYY-MM-DD`, `YYYYMMDD`, a bare `YYYY` (read as January 1st) and
/// ISO-8601 timestamps. The first format that parses wins.
#[must_use]
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }

    let all_digits = s.bytes().all(|b| b.is_ascii_digit());
    if all_digits && s.len() == 8 {
        let year = s[0..4].parse().ok()?;
        let month = s[4..6].parse().ok()?;
        let day = s[6..8].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    if all_digits && s.len() == 4 {
        return NaiveDate::from_ymd_opt(s.parse().ok()?, 1, 1);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    debug!(raw, "Unparseable date");
    None
}
