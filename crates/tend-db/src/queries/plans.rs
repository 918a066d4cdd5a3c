//! Database query functions for the `treatment_plans` table.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{NewPlan, TreatmentPlan};

/// Insert a new plan row. Returns the inserted plan with server-generated
/// defaults (id, active, created_at, updated_at).
///
/// The pattern text is stored verbatim; callers validate it first.
pub async fn insert_plan(pool: &PgPool, plan: &NewPlan<'_>) -> Result<TreatmentPlan> {
    let plan = sqlx::query_as::<_, TreatmentPlan>(
        "INSERT INTO treatment_plans (action, subject, start_time, end_time, recurrence_pattern) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(plan.action)
    .bind(plan.subject)
    .bind(plan.start_time)
    .bind(plan.end_time)
    .bind(plan.recurrence_pattern)
    .fetch_one(pool)
    .await
    .context("failed to insert treatment plan")?;

    Ok(plan)
}

/// Fetch a plan by its ID.
pub async fn get_plan(pool: &PgPool, id: Uuid) -> Result<Option<TreatmentPlan>> {
    let plan = sqlx::query_as::<_, TreatmentPlan>("SELECT * FROM treatment_plans WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch treatment plan")?;

    Ok(plan)
}

/// List all plans, ordered by creation time (newest first).
pub async fn list_plans(pool: &PgPool) -> Result<Vec<TreatmentPlan>> {
    let plans = sqlx::query_as::<_, TreatmentPlan>(
        "SELECT * FROM treatment_plans ORDER BY created_at DESC, id",
    )
    .fetch_all(pool)
    .await
    .context("failed to list treatment plans")?;

    Ok(plans)
}

/// Count all plans regardless of state.
pub async fn count_plans(pool: &PgPool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM treatment_plans")
        .fetch_one(pool)
        .await
        .context("failed to count treatment plans")?;

    Ok(count)
}

/// Count plans with the `active` flag set, regardless of their validity
/// window.
pub async fn count_active_plans(pool: &PgPool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM treatment_plans WHERE active")
        .fetch_one(pool)
        .await
        .context("failed to count active treatment plans")?;

    Ok(count)
}

/// Plans that are active, have started, and have not ended at `now`.
///
/// The end bound is strict: a plan whose `end_time` equals `now` is no longer
/// valid. Ordered by start time so runs process plans deterministically.
pub async fn find_active_plans(pool: &PgPool, now: NaiveDateTime) -> Result<Vec<TreatmentPlan>> {
    let plans = sqlx::query_as::<_, TreatmentPlan>(
        "SELECT * FROM treatment_plans \
         WHERE active \
           AND start_time <= $1 \
           AND (end_time IS NULL OR end_time > $1) \
         ORDER BY start_time, id",
    )
    .bind(now)
    .fetch_all(pool)
    .await
    .context("failed to find active treatment plans")?;

    Ok(plans)
}

/// Set the `active` flag on a plan and touch `updated_at`.
pub async fn set_plan_active(pool: &PgPool, id: Uuid, active: bool) -> Result<TreatmentPlan> {
    let plan = sqlx::query_as::<_, TreatmentPlan>(
        "UPDATE treatment_plans \
         SET active = $1, updated_at = LOCALTIMESTAMP \
         WHERE id = $2 \
         RETURNING *",
    )
    .bind(active)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to update treatment plan")?;

    match plan {
        Some(p) => Ok(p),
        None => anyhow::bail!("treatment plan {id} not found"),
    }
}
