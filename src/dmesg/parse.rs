//! Kernel log line parsing.
//!
//! Lines come in two timestamp dialects: `[seconds.fraction]` as written by
//! the kernel ring buffer, and `HH:MM:SS.fraction` as produced by some
//! serial consoles. Either may carry a leading `<priority>` marker. Lines
//! with neither are plain text at the default priority.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use thiserror::Error;

/// Default syslog priority when a line carries no `<n>` marker.
const DEFAULT_PRIORITY: u8 = 6;

/// One kernel log message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub level: u8,
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

/// Errors from parsing kernel log data.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unrecognized message line {line:?}")]
    Unrecognized { line: String },

    #[error("bad number {value:?} in message line")]
    BadNumber { value: String },

    #[error("continuation line with no preceding message")]
    DanglingContinuation,

    #[error("message timestamp out of range")]
    TimestampRange,
}

static HMS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:<(\d+)>)?(\d+):(\d+):(\d+)\.(\d+) (.*)\n?$").expect("valid regex")
});

static BRACKET_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:<(\d+)>)?(?:\[(\d+)\.(\d+)\])?(.*)\n?$").expect("valid regex")
});

/// Parse a single log line into a [`Message`] with a boot-relative timestamp.
///
/// Lines without a timestamp get the Unix epoch as a sentinel; the buffer
/// parser replaces it with the previous message's timestamp.
pub fn parse_message(line: &str) -> Result<Message, ParseError> {
    if let Some(parts) = HMS_LINE.captures(line) {
        return parse_hms(&parts);
    }
    if let Some(parts) = BRACKET_LINE.captures(line) {
        return parse_bracketed(&parts);
    }
    Err(ParseError::Unrecognized {
        line: line.to_string(),
    })
}

fn parse_hms(parts: &regex::Captures<'_>) -> Result<Message, ParseError> {
    let level = parse_level(parts.get(1).map(|m| m.as_str()))?;

    let hours = parse_i64(&parts[2])?;
    let minutes = parse_i64(&parts[3])?;
    let secs = parse_i64(&parts[4])?;
    let nanos = nanos_from_fraction(&parts[5])?;

    let timestamp = DateTime::from_timestamp(hours * 3600 + minutes * 60 + secs, nanos)
        .ok_or(ParseError::TimestampRange)?;

    Ok(Message {
        level,
        timestamp,
        text: parts[6].to_string(),
    })
}

fn parse_bracketed(parts: &regex::Captures<'_>) -> Result<Message, ParseError> {
    let level = parse_level(parts.get(1).map(|m| m.as_str()))?;

    let secs = match parts.get(2) {
        Some(m) => parse_i64(m.as_str())?,
        None => 0,
    };
    let nanos = match parts.get(3) {
        Some(m) => parse_u32(m.as_str())?,
        None => 0,
    };

    let timestamp = DateTime::from_timestamp(secs, nanos).ok_or(ParseError::TimestampRange)?;

    Ok(Message {
        level,
        timestamp,
        text: parts[4].to_string(),
    })
}

fn parse_level(raw: Option<&str>) -> Result<u8, ParseError> {
    match raw {
        None => Ok(DEFAULT_PRIORITY),
        Some(value) => value.parse::<u8>().map_err(|_| ParseError::BadNumber {
            value: value.to_string(),
        }),
    }
}

// The fraction is a decimal expansion, not a nanosecond count: pad or trim
// it to nine digits before converting.
fn nanos_from_fraction(fraction: &str) -> Result<u32, ParseError> {
    let digits = if fraction.len() > 9 {
        fraction[..9].to_string()
    } else {
        format!("{fraction:0<9}")
    };
    parse_u32(&digits)
}

fn parse_i64(value: &str) -> Result<i64, ParseError> {
    value.parse::<i64>().map_err(|_| ParseError::BadNumber {
        value: value.to_string(),
    })
}

fn parse_u32(value: &str) -> Result<u32, ParseError> {
    value.parse::<u32>().map_err(|_| ParseError::BadNumber {
        value: value.to_string(),
    })
}
