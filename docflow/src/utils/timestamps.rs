//! Timestamp utilities.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Format used when showing a unix timestamp to readers.
pub const LOCAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Errors that can occur during timestamp parsing.
#[derive(Debug, Error)]
pub enum TimestampError {
    /// The timestamp string is empty.
    #[error("Empty timestamp string")]
    EmptyString,

    /// The timestamp value is invalid.
    #[error("Invalid timestamp: {0}")]
    InvalidFormat(String),

    /// Nanosecond precision is not supported.
    #[error("Nanosecond precision timestamps are not supported")]
    NanosecondPrecision,
}

/// Detected precision of a Unix timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnixPrecision {
    /// Seconds (<=10 digits)
    Seconds,
    /// Milliseconds (<=13 digits)
    Milliseconds,
    /// Microseconds (<=16 digits)
    Microseconds,
}

/// Returns the current UTC time as an ISO 8601 formatted string.
///
/// Format: `YYYY-MM-DDTHH:MM:SS.ffffff+00:00`
///
/// # Examples
///
/// ```
/// use docflow::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Formats a unix timestamp (seconds) as local time, `YYYY-MM-DD HH:MM`.
///
/// Returns `None` when the value is outside the representable range.
#[must_use]
pub fn format_local_time(ts: i64) -> Option<String> {
    format_time_in(ts, &Local)
}

/// Formats a unix timestamp (seconds) in the given time zone.
#[must_use]
pub fn format_time_in<Tz>(ts: i64, tz: &Tz) -> Option<String>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    tz.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format(LOCAL_TIME_FORMAT).to_string())
}

/// Detects the precision of a Unix timestamp based on digit count.
///
/// # Errors
///
/// Returns `TimestampError::NanosecondPrecision` if the timestamp has more than 16 digits.
pub fn detect_unix_precision(timestamp: i64) -> Result<UnixPrecision, TimestampError> {
    let digit_count = timestamp.unsigned_abs().to_string().len();

    match digit_count {
        0..=10 => Ok(UnixPrecision::Seconds),
        11..=13 => Ok(UnixPrecision::Milliseconds),
        14..=16 => Ok(UnixPrecision::Microseconds),
        _ => Err(TimestampError::NanosecondPrecision),
    }
}

/// Parses a timestamp found in page markup.
///
/// Supports:
/// - Unix timestamps (seconds, milliseconds, microseconds)
/// - ISO 8601 strings, with or without offset
/// - RFC 2822 strings
///
/// # Errors
///
/// Returns `TimestampError` if the input cannot be parsed.
pub fn parse_timestamp(input: &str) -> Result<Timestamp, TimestampError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(TimestampError::EmptyString);
    }

    if let Ok(num) = trimmed.parse::<i64>() {
        return parse_unix_timestamp(num);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&trimmed.replace('Z', "+00:00")) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    Err(TimestampError::InvalidFormat(trimmed.to_string()))
}

/// Parses a Unix timestamp with automatic precision detection.
///
/// # Errors
///
/// Returns `TimestampError` for nanosecond precision or out-of-range values.
pub fn parse_unix_timestamp(value: i64) -> Result<Timestamp, TimestampError> {
    let (secs, nanos) = match detect_unix_precision(value)? {
        UnixPrecision::Seconds => (value, 0),
        UnixPrecision::Milliseconds => (value.div_euclid(1000), value.rem_euclid(1000) * 1_000_000),
        UnixPrecision::Microseconds => (value.div_euclid(1_000_000), value.rem_euclid(1_000_000) * 1000),
    };

    let nanos = u32::try_from(nanos).map_err(|_| TimestampError::InvalidFormat(value.to_string()))?;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .ok_or_else(|| TimestampError::InvalidFormat(value.to_string()))
}
