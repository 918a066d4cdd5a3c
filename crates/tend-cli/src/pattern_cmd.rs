//! `tend pattern` command: validate a pattern and preview its occurrences
//! without touching the database.

use anyhow::{Result, bail};
use chrono::{Duration, NaiveDateTime};

use tend_core::recurrence::{MAX_ITERATIONS, Window, expand, parse_pattern};
use tend_core::scheduler::local_now;

use crate::resolve::parse_opt_timestamp;

/// Preview window used when `--to` is omitted.
const DEFAULT_PREVIEW_DAYS: i64 = 7;

pub struct PatternArgs<'a> {
    pub pattern: &'a str,
    pub from: Option<&'a str>,
    pub to: Option<&'a str>,
    pub plan_start: Option<&'a str>,
    pub plan_end: Option<&'a str>,
}

pub fn run_pattern(args: &PatternArgs<'_>) -> Result<()> {
    let from = parse_opt_timestamp(args.from)?.unwrap_or_else(local_now);
    let to = parse_opt_timestamp(args.to)?
        .unwrap_or_else(|| from + Duration::days(DEFAULT_PREVIEW_DAYS));
    if to < from {
        bail!("window end {to} is before its start {from}");
    }
    let plan_start = parse_opt_timestamp(args.plan_start)?.unwrap_or(from);
    let plan_end = parse_opt_timestamp(args.plan_end)?;

    for line in render_preview(args.pattern, Window::new(from, to), plan_start, plan_end)? {
        println!("{line}");
    }
    Ok(())
}

fn render_preview(
    text: &str,
    window: Window,
    plan_start: NaiveDateTime,
    plan_end: Option<NaiveDateTime>,
) -> Result<Vec<String>> {
    let pattern = parse_pattern(text)?;
    let expansion = expand(&pattern, window, plan_start, plan_end);

    let mut lines = vec![
        format!("Pattern: {pattern} ({})", pattern.kind()),
        format!(
            "Window:  {} .. {}",
            window.from.format("%Y-%m-%d %H:%M"),
            window.to.format("%Y-%m-%d %H:%M")
        ),
        format!("Occurrences: {}", expansion.occurrences.len()),
    ];
    lines.extend(
        expansion
            .occurrences
            .iter()
            .map(|t| format!("  {}", t.format("%Y-%m-%d %H:%M:%S %a"))),
    );
    if expansion.truncated {
        lines.push(format!(
            "(stopped after {MAX_ITERATIONS} iterations; narrow the window to see the rest)"
        ));
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn preview_lists_occurrences() {
        let lines =
            render_preview("weekly:monday:10:00", Window::new(day(1), day(15)), day(1), None).unwrap();
        assert_eq!(lines[0], "Pattern: WEEKLY:MONDAY:10:00 (WEEKLY)");
        assert_eq!(lines[2], "Occurrences: 2");
        assert_eq!(lines[3], "  2024-01-01 10:00:00 Mon");
        assert_eq!(lines[4], "  2024-01-08 10:00:00 Mon");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn preview_rejects_bad_pattern() {
        let err = render_preview("MONTHLY:32:10:00", Window::new(day(1), day(2)), day(1), None)
            .unwrap_err();
        assert!(err.to_string().contains("invalid recurrence pattern"));
    }

    #[test]
    fn preview_notes_truncation() {
        let to = NaiveDate::from_ymd_opt(2030, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let lines = render_preview("DAILY:08:00", Window::new(day(1), to), day(1), None).unwrap();
        assert!(lines.last().unwrap().contains("stopped after 1000 iterations"));
    }
}
