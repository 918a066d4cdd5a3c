//! Expands a [`RecurrencePattern`] into concrete instants.
//!
//! The generator walks calendar dates starting at the window's `from` date.
//! Every date it visits is compared at start of day against the window's
//! exclusive upper bound, so an occurrence just after midnight at the end of
//! a window crossing a day boundary is still reached.

use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use super::pattern::RecurrencePattern;

/// Upper bound on iteration dates visited by a single expansion.
pub const MAX_ITERATIONS: usize = 1000;

/// Half-open evaluation window `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
}

impl Window {
    pub fn new(from: NaiveDateTime, to: NaiveDateTime) -> Self {
        Self { from, to }
    }

    /// `[now, now + hours)`. The end saturates at the last representable
    /// instant instead of overflowing.
    pub fn look_ahead(now: NaiveDateTime, hours: u32) -> Self {
        let to = now
            .checked_add_signed(chrono::Duration::hours(i64::from(hours)))
            .unwrap_or(NaiveDateTime::MAX);
        Self { from: now, to }
    }

    pub fn contains(&self, instant: NaiveDateTime) -> bool {
        self.from <= instant && instant < self.to
    }
}

/// Result of expanding a pattern over a window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    /// Admissible instants in iteration order.
    pub occurrences: Vec<NaiveDateTime>,
    /// Set when [`MAX_ITERATIONS`] stopped the walk before it left the window.
    pub truncated: bool,
}

/// Compute the instants at which `pattern` is due inside `window`.
///
/// An instant `t` is admissible when `window.contains(t)` and, if the plan
/// has an end, `t <= plan_end`. The plan end bound is inclusive while the
/// window bound is exclusive.
///
/// `plan_start` only matters for `ONCE`, whose single candidate is the plan's
/// start date at the pattern's first time.
pub fn expand(
    pattern: &RecurrencePattern,
    window: Window,
    plan_start: NaiveDateTime,
    plan_end: Option<NaiveDateTime>,
) -> Expansion {
    let admissible =
        |t: NaiveDateTime| window.contains(t) && plan_end.is_none_or(|end| t <= end);

    let mut expansion = Expansion::default();

    if let RecurrencePattern::Once { times } = pattern {
        if let Some(first) = times.first() {
            let candidate = plan_start.date().and_time(*first);
            if admissible(candidate) {
                expansion.occurrences.push(candidate);
            }
        }
        return expansion;
    }

    let Some(mut date) = first_date(pattern, window.from.date()) else {
        return expansion;
    };

    let mut iterations = 0;
    while date.and_time(NaiveTime::MIN) < window.to {
        if iterations == MAX_ITERATIONS {
            expansion.truncated = true;
            break;
        }
        iterations += 1;

        if occurs_on(pattern, date) {
            expansion.occurrences.extend(
                pattern
                    .times()
                    .iter()
                    .map(|time| date.and_time(*time))
                    .filter(|t| admissible(*t)),
            );
        }

        match next_date(pattern, date) {
            Some(next) => date = next,
            None => break,
        }
    }

    expansion
}

fn first_date(pattern: &RecurrencePattern, from: NaiveDate) -> Option<NaiveDate> {
    match pattern {
        RecurrencePattern::Monthly { day_of_month, .. } => {
            clamped_day(from.year(), from.month(), *day_of_month)
        }
        _ => Some(from),
    }
}

fn occurs_on(pattern: &RecurrencePattern, date: NaiveDate) -> bool {
    match pattern {
        RecurrencePattern::Weekly { day, .. } => date.weekday() == *day,
        _ => true,
    }
}

fn next_date(pattern: &RecurrencePattern, date: NaiveDate) -> Option<NaiveDate> {
    match pattern {
        RecurrencePattern::Once { .. } => None,
        RecurrencePattern::Daily { .. } => date.succ_opt(),
        RecurrencePattern::Weekly { day, .. } => {
            date.checked_add_days(Days::new(days_until_next(date.weekday(), *day)))
        }
        RecurrencePattern::Monthly { day_of_month, .. } => {
            let next_month = date.with_day(1)?.checked_add_months(Months::new(1))?;
            clamped_day(next_month.year(), next_month.month(), *day_of_month)
        }
    }
}

/// Days to the next `target` strictly after a date falling on `current`.
fn days_until_next(current: Weekday, target: Weekday) -> u64 {
    let ahead = (7 + target.num_days_from_monday() - current.num_days_from_monday()) % 7;
    if ahead == 0 { 7 } else { u64::from(ahead) }
}

/// `day` in the given month, pulled back to the month's last day if needed.
fn clamped_day(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let day = day.clamp(1, days_in_month(year, month)?);
    NaiveDate::from_ymd_opt(year, month, day)
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    u32::try_from(next.signed_duration_since(first).num_days()).ok()
}
