//! Time rules and duration helpers.
//!
//! The "effectively all-day" rule lives here, together with the
//! configuration duration parser (which accepts `d` and `w` suffixes on top
//! of the usual `h`/`m`/`s`) and the human-facing duration formatters.

use chrono::{DateTime, Duration, Local, Timelike, Utc};
use thiserror::Error;

/// Returns true when an event that is not explicitly all-day should be
/// treated as all-day anyway: both start and end sit exactly on local
/// midnight and the duration is positive.
///
/// This covers iCloud-style midnight-to-midnight multi-day blocks that are
/// exported as timed events.
pub fn is_effectively_all_day(start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    if end <= start {
        return false;
    }
    is_local_midnight(start) && is_local_midnight(end)
}

fn is_local_midnight(t: DateTime<Utc>) -> bool {
    let local = t.with_timezone(&Local);
    local.hour() == 0 && local.minute() == 0 && local.second() == 0 && local.nanosecond() == 0
}

/// Error returned by [`parse_duration`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("invalid duration {0:?}")]
    Invalid(String),
    #[error("negative durations are not allowed: {0:?}")]
    Negative(String),
}

/// Parses a configuration duration.
///
/// Accepts the usual `h`/`m`/`s`/`ms` segments (`"1h30m"`, `"90s"`) plus
/// whole-number `d` (24 h) and `w` (7 d) suffixes. The empty string parses
/// as zero. Negative values are rejected.
pub fn parse_duration(s: &str) -> Result<std::time::Duration, DurationError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(std::time::Duration::ZERO);
    }
    if s.starts_with('-') {
        return Err(DurationError::Negative(s.to_string()));
    }

    if let Some(num) = s.strip_suffix('d') {
        let days: u64 = num
            .parse()
            .map_err(|_| DurationError::Invalid(s.to_string()))?;
        return Ok(std::time::Duration::from_secs(days * 24 * 3600));
    }
    if let Some(num) = s.strip_suffix('w') {
        let weeks: u64 = num
            .parse()
            .map_err(|_| DurationError::Invalid(s.to_string()))?;
        return Ok(std::time::Duration::from_secs(weeks * 7 * 24 * 3600));
    }

    parse_segments(s).ok_or_else(|| DurationError::Invalid(s.to_string()))
}

/// Parses a sequence of `<number><unit>` segments (`1h30m`, `45s`, `250ms`).
fn parse_segments(s: &str) -> Option<std::time::Duration> {
    let mut total = std::time::Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits_end = rest.find(|c: char| !c.is_ascii_digit())?;
        if digits_end == 0 {
            return None;
        }
        let value: u64 = rest[..digits_end].parse().ok()?;
        rest = &rest[digits_end..];

        let (unit_len, unit_secs_ms) = if rest.starts_with("ms") {
            (2, std::time::Duration::from_millis(value))
        } else if rest.starts_with('h') {
            (1, std::time::Duration::from_secs(value * 3600))
        } else if rest.starts_with('m') {
            (1, std::time::Duration::from_secs(value * 60))
        } else if rest.starts_with('s') {
            (1, std::time::Duration::from_secs(value))
        } else {
            return None;
        };
        rest = &rest[unit_len..];
        total += unit_secs_ms;
    }
    Some(total)
}

/// Formats an event duration compactly: `45m`, `1h`, `1.5h`.
pub fn format_duration(d: Duration) -> String {
    if d < Duration::hours(1) {
        return format!("{}m", d.num_minutes());
    }
    let hours = d.num_minutes() as f64 / 60.0;
    if hours.fract() == 0.0 {
        format!("{}h", hours as i64)
    } else {
        format!("{:.1}h", hours)
    }
}

/// Formats a time-until-start for notification bodies: `"now"`, `"< 1 min"`,
/// `"5 minutes"`, `"1 hour"`, `"2h 15m"`.
pub fn format_starts_in(d: Duration) -> String {
    if d < Duration::zero() {
        return "now".to_string();
    }
    if d < Duration::minutes(1) {
        return "< 1 min".to_string();
    }
    if d < Duration::hours(1) {
        let mins = d.num_minutes();
        return if mins == 1 {
            "1 minute".to_string()
        } else {
            format!("{} minutes", mins)
        };
    }
    let hours = d.num_hours();
    let mins = d.num_minutes() % 60;
    if mins == 0 {
        if hours == 1 {
            "1 hour".to_string()
        } else {
            format!("{} hours", hours)
        }
    } else {
        format!("{}h {}m", hours, mins)
    }
}
