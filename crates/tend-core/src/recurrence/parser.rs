//! Pattern text parser.
//!
//! Grammar (colon-delimited, keywords case-insensitive):
//!
//! ```text
//! ONCE:<time>[,<time>...]
//! DAILY:<time>[,<time>...]
//! WEEKLY:<WEEKDAY>:<time>[,<time>...]
//! MONTHLY:<day-of-month>:<time>[,<time>...]
//! ```
//!
//! Times are 24-hour `HH:MM` (or `HH:MM:SS`). Because a time contains a
//! colon itself, the time list is whatever follows the kind-specific prefix,
//! re-joined with `:` and then split on `,`.

use chrono::{NaiveTime, Weekday};
use thiserror::Error;

use super::pattern::RecurrencePattern;

/// The pattern text could not be turned into a [`RecurrencePattern`].
///
/// Every parse failure uses this one error; `reason` says what was wrong and
/// `pattern` carries the raw input for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid recurrence pattern {pattern:?}: {reason}")]
pub struct PatternError {
    pub pattern: String,
    pub reason: String,
}

impl PatternError {
    fn new(pattern: &str, reason: impl Into<String>) -> Self {
        Self {
            pattern: pattern.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Parse pattern text into a [`RecurrencePattern`].
///
/// Returns the complete pattern or an error; never a partial result.
pub fn parse_pattern(text: &str) -> Result<RecurrencePattern, PatternError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PatternError::new(text, "pattern is empty"));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() < 2 {
        return Err(PatternError::new(text, "expected KIND:..."));
    }

    match parts[0].to_ascii_uppercase().as_str() {
        "ONCE" => {
            require_segments(text, &parts, 3, "ONCE needs a time")?;
            let times = parse_times(text, &parts[1..])?;
            Ok(RecurrencePattern::Once { times })
        }
        "DAILY" => {
            require_segments(text, &parts, 3, "DAILY needs a time")?;
            let times = parse_times(text, &parts[1..])?;
            Ok(RecurrencePattern::Daily { times })
        }
        "WEEKLY" => {
            require_segments(text, &parts, 4, "WEEKLY needs a weekday and a time")?;
            let day = parse_weekday(text, parts[1])?;
            let times = parse_times(text, &parts[2..])?;
            Ok(RecurrencePattern::Weekly { day, times })
        }
        "MONTHLY" => {
            require_segments(text, &parts, 4, "MONTHLY needs a day of month and a time")?;
            let day_of_month = parse_day_of_month(text, parts[1])?;
            let times = parse_times(text, &parts[2..])?;
            Ok(RecurrencePattern::Monthly {
                day_of_month,
                times,
            })
        }
        other => Err(PatternError::new(
            text,
            format!("unknown kind {other:?} (expected ONCE, DAILY, WEEKLY or MONTHLY)"),
        )),
    }
}

fn require_segments(
    text: &str,
    parts: &[&str],
    min: usize,
    reason: &str,
) -> Result<(), PatternError> {
    if parts.len() < min {
        return Err(PatternError::new(text, reason));
    }
    Ok(())
}

fn parse_weekday(text: &str, token: &str) -> Result<Weekday, PatternError> {
    token
        .parse::<Weekday>()
        .map_err(|_| PatternError::new(text, format!("unknown weekday {token:?}")))
}

fn parse_day_of_month(text: &str, token: &str) -> Result<u32, PatternError> {
    let day: u32 = token
        .parse()
        .map_err(|_| PatternError::new(text, format!("day of month {token:?} is not a number")))?;
    if !(1..=31).contains(&day) {
        return Err(PatternError::new(
            text,
            format!("day of month {day} is outside 1-31"),
        ));
    }
    Ok(day)
}

fn parse_times(text: &str, segments: &[&str]) -> Result<Vec<NaiveTime>, PatternError> {
    let joined = segments.join(":");
    let times = joined
        .split(',')
        .map(|token| parse_time(text, token.trim()))
        .collect::<Result<Vec<_>, _>>()?;

    if times.is_empty() {
        return Err(PatternError::new(text, "at least one time is required"));
    }
    Ok(times)
}

fn parse_time(text: &str, token: &str) -> Result<NaiveTime, PatternError> {
    if token.is_empty() {
        return Err(PatternError::new(text, "empty time in time list"));
    }
    NaiveTime::parse_from_str(token, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(token, "%H:%M:%S"))
        .map_err(|_| PatternError::new(text, format!("time {token:?} is not HH:MM")))
}
