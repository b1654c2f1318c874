//! Best-effort date parsing for front matter values

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use serde_json::Value;

use crate::error::DateParseError;

/// Formats carrying their own offset
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S%.f %:z",
];

/// Formats interpreted in the caller's location
const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses an arbitrary front matter value into a timestamp.
///
/// Values without zone information are interpreted in `location`. Failure is
/// soft: callers treat an error as "no date here".
pub trait DateParser: Send + Sync {
    fn parse(&self, value: &Value, location: FixedOffset)
    -> Result<DateTime<FixedOffset>, DateParseError>;
}

/// Accepts RFC 3339, RFC 2822, ISO-8601 dates and date-times with or
/// without an offset, and integer Unix timestamps.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDateParser;

impl DateParser for DefaultDateParser {
    fn parse(
        &self,
        value: &Value,
        location: FixedOffset,
    ) -> Result<DateTime<FixedOffset>, DateParseError> {
        match value {
            Value::String(s) => parse_str(s, location),
            Value::Number(n) => {
                let secs = n
                    .as_i64()
                    .ok_or(DateParseError::UnsupportedType("non-integer number"))?;
                DateTime::from_timestamp(secs, 0)
                    .map(|t| t.with_timezone(&location))
                    .ok_or_else(|| DateParseError::Unparseable(n.to_string()))
            }
            Value::Null => Err(DateParseError::UnsupportedType("null")),
            Value::Bool(_) => Err(DateParseError::UnsupportedType("bool")),
            Value::Array(_) => Err(DateParseError::UnsupportedType("array")),
            Value::Object(_) => Err(DateParseError::UnsupportedType("object")),
        }
    }
}

/// Parse a date string, interpreting zone-less values in `location`
pub fn parse_str(s: &str, location: FixedOffset) -> Result<DateTime<FixedOffset>, DateParseError> {
    let s = s.trim();

    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t);
    }
    if let Ok(t) = DateTime::parse_from_rfc2822(s) {
        return Ok(t);
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(t) = DateTime::parse_from_str(s, fmt) {
            return Ok(t);
        }
    }
    for fmt in LOCAL_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return in_location(naive, location, s);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
        return at_midnight(date, location, s);
    }

    Err(DateParseError::Unparseable(s.to_string()))
}

/// Parse a bare `YYYY-MM-DD` date as midnight in `location`
pub fn parse_date(s: &str, location: FixedOffset) -> Result<DateTime<FixedOffset>, DateParseError> {
    let date = NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|_| DateParseError::Unparseable(s.to_string()))?;
    at_midnight(date, location, s)
}

fn at_midnight(
    date: NaiveDate,
    location: FixedOffset,
    original: &str,
) -> Result<DateTime<FixedOffset>, DateParseError> {
    let naive = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| DateParseError::InvalidLocalTime(original.to_string()))?;
    in_location(naive, location, original)
}

fn in_location(
    naive: NaiveDateTime,
    location: FixedOffset,
    original: &str,
) -> Result<DateTime<FixedOffset>, DateParseError> {
    location
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| DateParseError::InvalidLocalTime(original.to_string()))
}
