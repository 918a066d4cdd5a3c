use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Status of a treatment task.
///
/// The materializer only ever creates `active` tasks; the terminal states are
/// set by whoever carries the treatment out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Completed,
    Skipped,
    Cancelled,
}

impl TaskStatus {
    /// Whether the task has reached a state it never leaves.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "skipped" => Ok(Self::Skipped),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(TaskStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TaskStatus`] string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid task status: {0:?}")]
pub struct TaskStatusParseError(pub String);

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A recurring treatment plan.
///
/// All instants live on one implicit local timeline (`TIMESTAMP` columns).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TreatmentPlan {
    pub id: Uuid,
    pub action: String,
    pub subject: String,
    pub start_time: NaiveDateTime,
    /// `None` means the plan is open-ended.
    pub end_time: Option<NaiveDateTime>,
    /// Raw pattern text, e.g. `DAILY:08:00,20:00`.
    pub recurrence_pattern: String,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TreatmentPlan {
    /// Whether the plan is valid at `now`: active, started, and not yet
    /// ended. The end bound is exclusive here.
    pub fn is_valid_at(&self, now: NaiveDateTime) -> bool {
        self.active && self.start_time <= now && self.end_time.is_none_or(|end| end > now)
    }
}

/// One materialized occurrence of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TreatmentTask {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub action: String,
    pub subject: String,
    pub scheduled_at: NaiveDateTime,
    pub status: TaskStatus,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

/// Fields supplied when authoring a plan.
#[derive(Debug, Clone)]
pub struct NewPlan<'a> {
    pub action: &'a str,
    pub subject: &'a str,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub recurrence_pattern: &'a str,
}

/// Fields supplied when materializing a task. Status is always `active`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub plan_id: Uuid,
    pub action: String,
    pub subject: String,
    pub scheduled_at: NaiveDateTime,
}

impl NewTask {
    /// Build the task for `plan` due at `scheduled_at`.
    pub fn for_occurrence(plan: &TreatmentPlan, scheduled_at: NaiveDateTime) -> Self {
        Self {
            plan_id: plan.id,
            action: plan.action.clone(),
            subject: plan.subject.clone(),
            scheduled_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn plan(start: NaiveDateTime, end: Option<NaiveDateTime>, active: bool) -> TreatmentPlan {
        TreatmentPlan {
            id: Uuid::new_v4(),
            action: "ACTION_A".into(),
            subject: "PATIENT_001".into(),
            start_time: start,
            end_time: end,
            recurrence_pattern: "DAILY:08:00".into(),
            active,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn task_status_display_roundtrip() {
        let variants = [
            TaskStatus::Active,
            TaskStatus::Completed,
            TaskStatus::Skipped,
            TaskStatus::Cancelled,
        ];
        for v in &variants {
            let parsed: TaskStatus = v.to_string().parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn task_status_invalid() {
        let err = "ACTIVE".parse::<TaskStatus>().unwrap_err();
        assert_eq!(err.to_string(), "invalid task status: \"ACTIVE\"");
    }

    #[test]
    fn only_active_is_non_terminal() {
        assert!(!TaskStatus::Active.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn plan_validity_uses_exclusive_end() {
        let p = plan(at(1, 0), Some(at(3, 0)), true);
        assert!(p.is_valid_at(at(1, 0)));
        assert!(p.is_valid_at(at(2, 23)));
        assert!(!p.is_valid_at(at(3, 0)));
        assert!(!p.is_valid_at(at(1, 0) - chrono::Duration::minutes(1)));
    }

    #[test]
    fn inactive_or_open_ended_plans() {
        assert!(!plan(at(1, 0), None, false).is_valid_at(at(2, 0)));
        assert!(plan(at(1, 0), None, true).is_valid_at(at(31, 0)));
    }

    #[test]
    fn new_task_copies_plan_identity() {
        let p = plan(at(1, 0), None, true);
        let task = NewTask::for_occurrence(&p, at(1, 8));
        assert_eq!(task.plan_id, p.id);
        assert_eq!(task.action, "ACTION_A");
        assert_eq!(task.subject, "PATIENT_001");
        assert_eq!(task.scheduled_at, at(1, 8));
    }
}
