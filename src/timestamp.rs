//! Timestamp normalization and display formatting
//!
//! Message timestamps arrive as ISO-8601 strings from the server, from the
//! cache, or from optimistic records created locally. Parsing never fails:
//! an unreadable timestamp becomes "now" so the message still sorts (last)
//! and is still displayed.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use std::fmt::Display;

/// Naive formats accepted after RFC 3339, interpreted as UTC
const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// A timestamp as handed to the timeline: raw text or an already-parsed instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawTimestamp<'a> {
    /// ISO-8601 text
    Text(&'a str),
    /// Parsed instant
    Instant(DateTime<Utc>),
}

impl<'a> From<&'a str> for RawTimestamp<'a> {
    fn from(value: &'a str) -> Self {
        Self::Text(value)
    }
}

impl<'a> From<&'a String> for RawTimestamp<'a> {
    fn from(value: &'a String) -> Self {
        Self::Text(value.as_str())
    }
}

impl From<DateTime<Utc>> for RawTimestamp<'_> {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Instant(value)
    }
}

/// Current time as an RFC 3339 string with millisecond precision
pub fn current_timestamp() -> String {
    to_timestamp_string(Utc::now())
}

/// Render an instant the way records store it
pub fn to_timestamp_string(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse timestamp text, returning `None` when no accepted format matches
///
/// Accepts RFC 3339 (any offset), naive date-times (treated as UTC, which is
/// how the server writes them) and bare dates (UTC midnight).
pub fn try_parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Normalize a raw timestamp to an instant, substituting now on failure
pub fn parse_timestamp<'a>(raw: impl Into<RawTimestamp<'a>>) -> DateTime<Utc> {
    parse_timestamp_or(raw, Utc::now)
}

/// Like [`parse_timestamp`] but with an explicit fallback time source
pub fn parse_timestamp_or<'a>(
    raw: impl Into<RawTimestamp<'a>>,
    fallback: impl FnOnce() -> DateTime<Utc>,
) -> DateTime<Utc> {
    match raw.into() {
        RawTimestamp::Instant(instant) => instant,
        RawTimestamp::Text(text) => try_parse_timestamp(text).unwrap_or_else(|| {
            tracing::warn!("Invalid timestamp {:?}, substituting current time", text);
            fallback()
        }),
    }
}

/// Short display string for a message time in the local timezone
///
/// See [`format_message_time_at`] for the rules.
pub fn format_message_time<'a>(raw: impl Into<RawTimestamp<'a>>) -> String {
    format_message_time_at(parse_timestamp(raw), Utc::now(), &Local)
}

/// Short display string for `instant`, as seen at `now` in timezone `tz`
///
/// - same calendar day as `now`: `HH:MM`
/// - the calendar day before: `Yesterday HH:MM`
/// - anything else: `M/D/YYYY HH:MM`
///
/// Both instants are converted to `tz` before their dates are compared.
pub fn format_message_time_at<Tz>(instant: DateTime<Utc>, now: DateTime<Utc>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let local = instant.with_timezone(tz);
    let today = now.with_timezone(tz).date_naive();
    let date = local.date_naive();
    let time = local.format("%H:%M");

    if date == today {
        time.to_string()
    } else if today.pred_opt() == Some(date) {
        format!("Yesterday {}", time)
    } else {
        format!("{} {}", local.format("%-m/%-d/%Y"), time)
    }
}
