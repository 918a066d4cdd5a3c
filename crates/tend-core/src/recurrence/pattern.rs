//! The parsed form of a plan's recurrence rule.

use std::fmt;

use chrono::{NaiveTime, Weekday};
use serde::Serialize;

/// Which family of rule a [`RecurrencePattern`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceKind {
    Once,
    Daily,
    Weekly,
    Monthly,
}

impl RecurrenceKind {
    /// The upper-case keyword used in pattern text.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Once => "ONCE",
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
        }
    }
}

impl fmt::Display for RecurrenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A recurrence rule. Each variant carries only the fields its kind needs.
///
/// `times` is never empty for a pattern produced by
/// [`parse_pattern`](super::parse_pattern). `Once` keeps the whole list but
/// only its first entry is ever scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecurrencePattern {
    Once {
        times: Vec<NaiveTime>,
    },
    Daily {
        times: Vec<NaiveTime>,
    },
    Weekly {
        day: Weekday,
        times: Vec<NaiveTime>,
    },
    /// `day_of_month` is 1–31; months shorter than that use their last day.
    Monthly {
        day_of_month: u32,
        times: Vec<NaiveTime>,
    },
}

impl RecurrencePattern {
    pub fn kind(&self) -> RecurrenceKind {
        match self {
            Self::Once { .. } => RecurrenceKind::Once,
            Self::Daily { .. } => RecurrenceKind::Daily,
            Self::Weekly { .. } => RecurrenceKind::Weekly,
            Self::Monthly { .. } => RecurrenceKind::Monthly,
        }
    }

    /// Times of day, in the order they were written.
    pub fn times(&self) -> &[NaiveTime] {
        match self {
            Self::Once { times }
            | Self::Daily { times }
            | Self::Weekly { times, .. }
            | Self::Monthly { times, .. } => times,
        }
    }
}

/// Renders the canonical text form, which parses back to an equal pattern.
impl fmt::Display for RecurrencePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind().keyword())?;
        match self {
            Self::Weekly { day, .. } => write!(f, ":{}", weekday_name(*day))?,
            Self::Monthly { day_of_month, .. } => write!(f, ":{day_of_month}")?,
            Self::Once { .. } | Self::Daily { .. } => {}
        }
        f.write_str(":")?;
        for (i, time) in self.times().iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write_time(f, *time)?;
        }
        Ok(())
    }
}

fn write_time(f: &mut fmt::Formatter<'_>, time: NaiveTime) -> fmt::Result {
    use chrono::Timelike;

    if time.second() == 0 {
        write!(f, "{}", time.format("%H:%M"))
    } else {
        write!(f, "{}", time.format("%H:%M:%S"))
    }
}

pub(crate) fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MONDAY",
        Weekday::Tue => "TUESDAY",
        Weekday::Wed => "WEDNESDAY",
        Weekday::Thu => "THURSDAY",
        Weekday::Fri => "FRIDAY",
        Weekday::Sat => "SATURDAY",
        Weekday::Sun => "SUNDAY",
    }
}
