//! Materialization: turn the upcoming occurrences of every valid plan into
//! stored tasks, exactly once per `(plan, instant)`.
//!
//! A run never fails as a whole. Each plan produces its own [`PlanOutcome`];
//! a plan whose pattern does not parse, or whose storage calls fail, is
//! reported as [`PlanResult::Failed`] and the run moves on to the next plan.
//! Tasks created before a plan failed stay stored, but the failed plan
//! contributes nothing to [`RunReport::tasks_created`].
//!
//! Concurrent runs are safe because the store's uniqueness rule is the only
//! arbiter: a create that loses a race reports
//! [`CreateOutcome::AlreadyExists`], which counts as materialized.

use anyhow::Result;
use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use tend_db::models::{NewTask, TreatmentPlan};

use crate::recurrence::{Window, expand, parse_pattern};
use crate::store::{CreateOutcome, TaskStore};

/// Default look-ahead, in hours.
pub const DEFAULT_LOOK_AHEAD_HOURS: u32 = 1;

/// Largest look-ahead accepted from configuration: one leap year.
pub const MAX_LOOK_AHEAD_HOURS: u32 = 366 * 24;

/// Knobs for a [`Materializer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterializerConfig {
    /// Occurrences in `[now, now + look_ahead_hours)` are materialized.
    pub look_ahead_hours: u32,
}

impl Default for MaterializerConfig {
    fn default() -> Self {
        Self {
            look_ahead_hours: DEFAULT_LOOK_AHEAD_HOURS,
        }
    }
}

/// What one plan contributed to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanOutcome {
    pub plan_id: Uuid,
    #[serde(flatten)]
    pub result: PlanResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlanResult {
    Materialized {
        /// New tasks, including creates that lost a uniqueness race.
        created: usize,
        /// Occurrences whose task was found before creating.
        skipped_existing: usize,
        /// The expansion hit its iteration bound.
        truncated: bool,
    },
    Failed {
        reason: String,
    },
}

/// Summary of one materialization run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub window_from: NaiveDateTime,
    pub window_to: NaiveDateTime,
    pub plans_considered: usize,
    pub outcomes: Vec<PlanOutcome>,
    /// Set when the active plans could not be fetched at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<String>,
}

impl RunReport {
    /// Tasks newly materialized across all plans.
    pub fn tasks_created(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o.result {
                PlanResult::Materialized { created, .. } => created,
                PlanResult::Failed { .. } => 0,
            })
            .sum()
    }

    pub fn plans_failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, PlanResult::Failed { .. }))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (Uuid, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            PlanResult::Failed { reason } => Some((o.plan_id, reason.as_str())),
            PlanResult::Materialized { .. } => None,
        })
    }
}

/// Runs materialization against a [`TaskStore`].
#[derive(Debug)]
pub struct Materializer<S> {
    store: S,
    config: MaterializerConfig,
}

impl<S: TaskStore> Materializer<S> {
    pub fn new(store: S, config: MaterializerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> MaterializerConfig {
        self.config
    }

    /// Materialize every occurrence due in `[now, now + look_ahead)`.
    pub async fn run(&self, now: NaiveDateTime) -> RunReport {
        let window = Window::look_ahead(now, self.config.look_ahead_hours);
        let mut report = RunReport {
            window_from: window.from,
            window_to: window.to,
            plans_considered: 0,
            outcomes: Vec::new(),
            fetch_error: None,
        };

        let plans = match self.store.find_active_plans(now).await {
            Ok(plans) => plans,
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "failed to fetch active treatment plans");
                report.fetch_error = Some(format!("{e:#}"));
                return report;
            }
        };
        report.plans_considered = plans.len();
        tracing::info!(plans = plans.len(), %now, "found active treatment plans");

        for plan in &plans {
            let result = match self.materialize_plan(plan, window).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(
                        plan_id = %plan.id,
                        pattern = %plan.recurrence_pattern,
                        error = %format!("{e:#}"),
                        "failed to generate tasks for plan"
                    );
                    PlanResult::Failed {
                        reason: format!("{e:#}"),
                    }
                }
            };
            report.outcomes.push(PlanOutcome {
                plan_id: plan.id,
                result,
            });
        }

        tracing::info!(
            created = report.tasks_created(),
            failed = report.plans_failed(),
            "materialization run finished"
        );
        report
    }

    async fn materialize_plan(&self, plan: &TreatmentPlan, window: Window) -> Result<PlanResult> {
        let pattern = parse_pattern(&plan.recurrence_pattern)?;
        let expansion = expand(&pattern, window, plan.start_time, plan.end_time);
        if expansion.truncated {
            tracing::warn!(
                plan_id = %plan.id,
                pattern = %pattern,
                found = expansion.occurrences.len(),
                "occurrence expansion hit its iteration bound"
            );
        }

        let mut created = 0;
        let mut skipped_existing = 0;
        for at in expansion.occurrences {
            if self.store.find_task(plan.id, at).await?.is_some() {
                skipped_existing += 1;
                continue;
            }

            match self.store.create_task(NewTask::for_occurrence(plan, at)).await? {
                CreateOutcome::Created(task) => {
                    tracing::debug!(
                        task_id = %task.id,
                        plan_id = %plan.id,
                        subject = %plan.subject,
                        scheduled_at = %at,
                        "created treatment task"
                    );
                }
                CreateOutcome::AlreadyExists => {
                    tracing::debug!(
                        plan_id = %plan.id,
                        scheduled_at = %at,
                        "task already exists (unique constraint)"
                    );
                }
            }
            created += 1;
        }

        if created > 0 {
            tracing::info!(
                plan_id = %plan.id,
                subject = %plan.subject,
                created,
                "generated tasks for plan"
            );
        }

        Ok(PlanResult::Materialized {
            created,
            skipped_existing,
            truncated: expansion.truncated,
        })
    }
}
