//! Database query functions for the `treatment_tasks` table.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{NewTask, TaskStatus, TreatmentTask};

/// Fetch the task materialized for `plan_id` at exactly `scheduled_at`.
pub async fn find_task(
    pool: &PgPool,
    plan_id: Uuid,
    scheduled_at: NaiveDateTime,
) -> Result<Option<TreatmentTask>> {
    let task = sqlx::query_as::<_, TreatmentTask>(
        "SELECT * FROM treatment_tasks WHERE plan_id = $1 AND scheduled_at = $2",
    )
    .bind(plan_id)
    .bind(scheduled_at)
    .fetch_optional(pool)
    .await
    .context("failed to look up treatment task")?;

    Ok(task)
}

/// Insert an `active` task unless one already exists for the same
/// `(plan_id, scheduled_at)`.
///
/// Uses `ON CONFLICT DO NOTHING` against the `uk_plan_scheduled_at`
/// constraint, so a concurrent insert of the same occurrence is not an error:
/// the function returns `Ok(None)` when the row was already there.
pub async fn insert_task_if_absent(pool: &PgPool, task: &NewTask) -> Result<Option<TreatmentTask>> {
    let inserted = sqlx::query_as::<_, TreatmentTask>(
        "INSERT INTO treatment_tasks (plan_id, action, subject, scheduled_at, status) \
         VALUES ($1, $2, $3, $4, 'active') \
         ON CONFLICT ON CONSTRAINT uk_plan_scheduled_at DO NOTHING \
         RETURNING *",
    )
    .bind(task.plan_id)
    .bind(&task.action)
    .bind(&task.subject)
    .bind(task.scheduled_at)
    .fetch_optional(pool)
    .await
    .with_context(|| {
        format!(
            "failed to insert treatment task for plan {} at {}",
            task.plan_id, task.scheduled_at
        )
    })?;

    Ok(inserted)
}

/// Fetch a single task by ID.
pub async fn get_task(pool: &PgPool, id: Uuid) -> Result<Option<TreatmentTask>> {
    let task = sqlx::query_as::<_, TreatmentTask>("SELECT * FROM treatment_tasks WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch treatment task")?;

    Ok(task)
}

/// List all tasks for a plan in schedule order.
pub async fn list_tasks_for_plan(pool: &PgPool, plan_id: Uuid) -> Result<Vec<TreatmentTask>> {
    let tasks = sqlx::query_as::<_, TreatmentTask>(
        "SELECT * FROM treatment_tasks WHERE plan_id = $1 ORDER BY scheduled_at ASC",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await
    .context("failed to list treatment tasks for plan")?;

    Ok(tasks)
}

/// List tasks of every plan scheduled in `[from, to)`.
pub async fn list_tasks_between(
    pool: &PgPool,
    from: NaiveDateTime,
    to: NaiveDateTime,
) -> Result<Vec<TreatmentTask>> {
    let tasks = sqlx::query_as::<_, TreatmentTask>(
        "SELECT * FROM treatment_tasks \
         WHERE scheduled_at >= $1 AND scheduled_at < $2 \
         ORDER BY scheduled_at ASC, plan_id",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
    .context("failed to list treatment tasks in range")?;

    Ok(tasks)
}

/// Task counts per status across all plans. Statuses without tasks are
/// omitted.
pub async fn count_tasks_by_status(pool: &PgPool) -> Result<Vec<(TaskStatus, i64)>> {
    let counts = sqlx::query_as::<_, (TaskStatus, i64)>(
        "SELECT status, COUNT(*) FROM treatment_tasks GROUP BY status ORDER BY status",
    )
    .fetch_all(pool)
    .await
    .context("failed to count treatment tasks by status")?;

    Ok(counts)
}

/// Count the tasks materialized for a plan.
pub async fn count_tasks_for_plan(pool: &PgPool, plan_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM treatment_tasks WHERE plan_id = $1")
        .bind(plan_id)
        .fetch_one(pool)
        .await
        .context("failed to count treatment tasks")?;

    Ok(count)
}

/// Move an `active` task into a terminal status.
///
/// Uses optimistic locking on the current status: the UPDATE only matches
/// while the task is still `active`. The given timestamp is recorded as
/// `completed_at` for every terminal status, including `skipped` and
/// `cancelled`.
pub async fn finish_task(
    pool: &PgPool,
    id: Uuid,
    status: TaskStatus,
    completed_at: NaiveDateTime,
) -> Result<TreatmentTask> {
    if !status.is_terminal() {
        anyhow::bail!("cannot finish task {id} with non-terminal status {status}");
    }

    let task = sqlx::query_as::<_, TreatmentTask>(
        "UPDATE treatment_tasks \
         SET status = $1, completed_at = $2 \
         WHERE id = $3 AND status = 'active' \
         RETURNING *",
    )
    .bind(status)
    .bind(completed_at)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to update treatment task status")?;

    match task {
        Some(t) => Ok(t),
        None => match get_task(pool, id).await? {
            None => anyhow::bail!("treatment task {id} not found"),
            Some(t) => anyhow::bail!(
                "treatment task {id} cannot be finished: current status is {} (must be active)",
                t.status
            ),
        },
    }
}
