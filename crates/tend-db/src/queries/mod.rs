//! Query functions, one module per table.

pub mod plans;
pub mod tasks;

use anyhow::Result;
use sqlx::PgPool;

use crate::models::TaskStatus;

/// Row counts reported after `tend db-init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSummary {
    pub plans: i64,
    pub active_plans: i64,
    /// Only statuses that have at least one task.
    pub tasks_by_status: Vec<(TaskStatus, i64)>,
}

impl DatabaseSummary {
    pub fn total_tasks(&self) -> i64 {
        self.tasks_by_status.iter().map(|(_, n)| n).sum()
    }
}

pub async fn summarize(pool: &PgPool) -> Result<DatabaseSummary> {
    Ok(DatabaseSummary {
        plans: plans::count_plans(pool).await?,
        active_plans: plans::count_active_plans(pool).await?,
        tasks_by_status: tasks::count_tasks_by_status(pool).await?,
    })
}
