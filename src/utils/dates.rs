//! Posted-date parsing and the recency filter.
//!
//! Listing dates arrive in several shapes:
//! - epoch milliseconds (JSON numbers or long digit strings)
//! - ISO-8601 and a handful of common absolute formats
//! - relative text such as "just posted", "yesterday" or "3 days ago"
//!
//! A month is treated as 30 days.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static FRESH_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(just|today|new|featured)\b").unwrap());
static YESTERDAY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\byesterday\b").unwrap());
static RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*(minute|hour|day|week|month)s?\s+ago").unwrap()
});

/// Absolute formats tried after RFC 3339 / RFC 2822.
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d %B %Y", "%d %b %Y", "%B %d, %Y"];

/// Digit strings shorter than this are not treated as epoch milliseconds.
const MIN_EPOCH_DIGITS: usize = 10;

/// How recent a listing must be to be kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecencyWindow {
    #[default]
    #[serde(rename = "any")]
    Any,
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl RecencyWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Day => "24h",
            Self::Week => "7d",
            Self::Month => "30d",
        }
    }

    /// Maximum age, or `None` for no limit.
    pub fn max_age(&self) -> Option<Duration> {
        match self {
            Self::Any => None,
            Self::Day => Some(Duration::hours(24)),
            Self::Week => Some(Duration::days(7)),
            Self::Month => Some(Duration::days(30)),
        }
    }
}

impl std::fmt::Display for RecencyWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecencyWindow {
    type Err = String;

    /// Parse the input token (`any`, `24h`, `7d`, `30d`); blank means `any`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "any" | "" => Ok(Self::Any),
            "24h" => Ok(Self::Day),
            "7d" => Ok(Self::Week),
            "30d" => Ok(Self::Month),
            _ => Err(format!(
                "Invalid recency window '{}'. Valid options: any, 24h, 7d, 30d",
                s
            )),
        }
    }
}

fn unit_seconds(unit: &str) -> Option<i64> {
    match unit.to_lowercase().as_str() {
        "minute" => Some(60),
        "hour" => Some(3_600),
        "day" => Some(86_400),
        "week" => Some(7 * 86_400),
        "month" => Some(30 * 86_400),
        _ => None,
    }
}

fn from_epoch_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Parse a posted-date JSON value relative to `now`.
pub fn parse_value(value: &Value, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(from_epoch_millis),
        Value::String(s) => parse(s, now),
        _ => None,
    }
}

/// Parse a posted-date string relative to `now`.
pub fn parse(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if text.len() >= MIN_EPOCH_DIGITS && text.bytes().all(|b| b.is_ascii_digit()) {
        return text.parse::<i64>().ok().and_then(from_epoch_millis);
    }

    if let Some(caps) = RELATIVE.captures(text) {
        let n: i64 = caps[1].parse().ok()?;
        let secs = unit_seconds(&caps[2])?;
        return now.checked_sub_signed(Duration::seconds(n.checked_mul(secs)?));
    }

    if YESTERDAY.is_match(text) {
        return now.checked_sub_signed(Duration::days(1));
    }

    if FRESH_TOKEN.is_match(text) {
        return Some(now);
    }

    parse_absolute(text)
}

fn parse_absolute(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(naive.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
        }
    }
    None
}

/// ISO-8601 rendering with millisecond precision and a `Z` suffix.
pub fn to_iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Normalise a posted-date value: ISO-8601 when parseable, the original text
/// otherwise, `None` when empty.
pub fn normalize(value: &Value, now: DateTime<Utc>) -> Option<String> {
    if let Some(dt) = parse_value(value, now) {
        return Some(to_iso(dt));
    }

    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Decide whether a record with this posted date passes `window`.
///
/// Unreadable dates are kept.
pub fn keep_by_recency(value: Option<&str>, window: RecencyWindow, now: DateTime<Utc>) -> bool {
    let Some(max_age) = window.max_age() else {
        return true;
    };
    let Some(posted) = value.and_then(|v| parse(v, now)) else {
        return true;
    };
    now.signed_duration_since(posted) <= max_age
}
