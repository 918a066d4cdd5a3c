//! The storage seam the materializer runs against.
//!
//! [`PgTaskStore`] is the production implementation. Tests substitute an
//! in-memory store with the same uniqueness rule on `(plan_id, scheduled_at)`.

mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use uuid::Uuid;

use tend_db::models::{NewTask, TreatmentPlan, TreatmentTask};

pub use postgres::PgTaskStore;

/// What happened to a create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(TreatmentTask),
    /// A task for the same plan and instant was already stored, possibly by
    /// a concurrent run. Not an error.
    AlreadyExists,
}

/// Persistence operations needed to materialize tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Plans that are active, have started, and whose end (if any) is
    /// strictly after `now`.
    async fn find_active_plans(&self, now: NaiveDateTime) -> Result<Vec<TreatmentPlan>>;

    /// The task stored for `plan_id` at exactly `scheduled_at`, if any.
    async fn find_task(
        &self,
        plan_id: Uuid,
        scheduled_at: NaiveDateTime,
    ) -> Result<Option<TreatmentTask>>;

    /// Insert an `active` task. The store's uniqueness rule decides between
    /// [`CreateOutcome::Created`] and [`CreateOutcome::AlreadyExists`].
    async fn create_task(&self, task: NewTask) -> Result<CreateOutcome>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn TaskStore) {}
};
