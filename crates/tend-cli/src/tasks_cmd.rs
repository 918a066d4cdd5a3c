//! `tend tasks`, `tend due` and `tend complete` commands.

use anyhow::{Context, Result, bail};
use chrono::{Duration, NaiveDateTime};
use sqlx::PgPool;

use tend_core::scheduler::local_now;
use tend_db::models::TaskStatus;
use tend_db::queries::{plans as plan_db, tasks as task_db};

use crate::resolve::{parse_id, parse_opt_timestamp};

/// Range listed by `tend due` when `--to` is omitted.
const DEFAULT_DUE_HOURS: i64 = 24;

/// List the tasks materialized for a plan, in schedule order.
pub async fn run_tasks(pool: &PgPool, plan_id: &str) -> Result<()> {
    let id = parse_id("plan", plan_id)?;
    let plan = plan_db::get_plan(pool, id)
        .await?
        .with_context(|| format!("plan {id} not found"))?;

    let tasks = task_db::list_tasks_for_plan(pool, id).await?;

    println!(
        "Plan: {} for {} ({})",
        plan.action, plan.subject, plan.recurrence_pattern
    );
    if tasks.is_empty() {
        println!("No tasks yet. Run `tend run` to materialize upcoming occurrences.");
        return Ok(());
    }

    println!();
    println!("{:<36}  {:<16}  {:<9}  COMPLETED", "TASK ID", "SCHEDULED", "STATUS");
    for task in &tasks {
        println!(
            "{:<36}  {:<16}  {:<9}  {}",
            task.id,
            task.scheduled_at.format("%Y-%m-%d %H:%M"),
            task.status,
            task.completed_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }

    Ok(())
}

/// List tasks of every plan scheduled in `[from, to)`.
pub async fn run_due(pool: &PgPool, from: Option<&str>, to: Option<&str>) -> Result<()> {
    let from = parse_opt_timestamp(from)?.unwrap_or_else(local_now);
    let to = parse_opt_timestamp(to)?.unwrap_or_else(|| from + Duration::hours(DEFAULT_DUE_HOURS));
    if to < from {
        bail!("range end {to} is before its start {from}");
    }

    for line in due_lines(pool, from, to).await? {
        println!("{line}");
    }
    Ok(())
}

async fn due_lines(pool: &PgPool, from: NaiveDateTime, to: NaiveDateTime) -> Result<Vec<String>> {
    let tasks = task_db::list_tasks_between(pool, from, to).await?;

    let mut lines = vec![format!(
        "Tasks due {} .. {}: {}",
        from.format("%Y-%m-%d %H:%M"),
        to.format("%Y-%m-%d %H:%M"),
        tasks.len()
    )];
    lines.extend(tasks.iter().map(|task| {
        format!(
            "  {}  {:<9}  {} for {}  ({})",
            task.scheduled_at.format("%Y-%m-%d %H:%M"),
            task.status,
            task.action,
            task.subject,
            task.id
        )
    }));
    Ok(lines)
}

/// Mark an active task as completed now.
pub async fn run_complete(pool: &PgPool, task_id: &str) -> Result<()> {
    let id = parse_id("task", task_id)?;
    let task = task_db::finish_task(pool, id, TaskStatus::Completed, local_now()).await?;
    println!(
        "Task {} ({} for {} at {}) completed.",
        task.id,
        task.action,
        task.subject,
        task.scheduled_at.format("%Y-%m-%d %H:%M")
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use tend_db::models::{NewPlan, NewTask};
    use tend_db::queries::plans::insert_plan;
    use tend_db::queries::tasks::insert_task_if_absent;
    use tend_test_utils::TestDb;

    use super::*;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn due_lists_tasks_of_all_plans_in_range() {
        let db = TestDb::new().await;

        for (action, subject) in [("ACTION_A", "PATIENT_001"), ("ACTION_B", "PATIENT_002")] {
            let plan = insert_plan(
                &db.pool,
                &NewPlan {
                    action,
                    subject,
                    start_time: at(1, 0),
                    end_time: None,
                    recurrence_pattern: "DAILY:08:00,20:00",
                },
            )
            .await
            .unwrap();
            for scheduled_at in [at(1, 8), at(1, 20), at(2, 8)] {
                insert_task_if_absent(&db.pool, &NewTask::for_occurrence(&plan, scheduled_at))
                    .await
                    .unwrap();
            }
        }

        let lines = due_lines(&db.pool, at(1, 8), at(2, 8)).await.unwrap();
        assert_eq!(lines[0], "Tasks due 2024-01-01 08:00 .. 2024-01-02 08:00: 4");
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("  2024-01-01 08:00  active"));
        assert!(lines[4].starts_with("  2024-01-01 20:00  active"));
        assert!(lines.iter().all(|l| !l.contains("2024-01-02 08:00  ")));

        db.teardown().await;
    }
}
