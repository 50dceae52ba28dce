//! Flexible duration strings for interval configuration.
//!
//! Accepts `"45s"`, `"30m"`, `"2h"`, `"1d"`, or a bare integer meaning
//! minutes. Whitespace and case are ignored.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("empty duration string")]
    Empty,
    #[error("invalid duration '{0}': expected forms like 30m, 2h, 1d")]
    Invalid(String),
}

/// Parse a duration string into a [`Duration`].
pub fn parse_duration(raw: &str) -> Result<Duration, DurationParseError> {
    let s = raw.trim().to_ascii_lowercase();
    if s.is_empty() {
        return Err(DurationParseError::Empty);
    }

    // Bare integers are minutes.
    if let Ok(minutes) = s.parse::<u64>() {
        return Ok(Duration::from_secs(minutes * 60));
    }

    let (value, unit) = s.split_at(s.len() - 1);
    let value: u64 = value
        .trim()
        .parse()
        .map_err(|_| DurationParseError::Invalid(raw.to_string()))?;

    let secs = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        "d" => value * 86_400,
        _ => return Err(DurationParseError::Invalid(raw.to_string())),
    };
    Ok(Duration::from_secs(secs))
}

/// Parse a duration and round it to whole minutes (at least one).
pub fn parse_duration_minutes(raw: &str) -> Result<u64, DurationParseError> {
    let duration = parse_duration(raw)?;
    Ok((duration.as_secs() / 60).max(1))
}
