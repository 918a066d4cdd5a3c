use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::PgPool;
use uuid::Uuid;

use tend_db::models::{NewTask, TreatmentPlan, TreatmentTask};
use tend_db::queries::{plans as plan_db, tasks as task_db};

use super::{CreateOutcome, TaskStore};

/// [`TaskStore`] backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn find_active_plans(&self, now: NaiveDateTime) -> Result<Vec<TreatmentPlan>> {
        plan_db::find_active_plans(&self.pool, now).await
    }

    async fn find_task(
        &self,
        plan_id: Uuid,
        scheduled_at: NaiveDateTime,
    ) -> Result<Option<TreatmentTask>> {
        task_db::find_task(&self.pool, plan_id, scheduled_at).await
    }

    async fn create_task(&self, task: NewTask) -> Result<CreateOutcome> {
        let outcome = match task_db::insert_task_if_absent(&self.pool, &task).await? {
            Some(row) => CreateOutcome::Created(row),
            None => CreateOutcome::AlreadyExists,
        };
        Ok(outcome)
    }
}
