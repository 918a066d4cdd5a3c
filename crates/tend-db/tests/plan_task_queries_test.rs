//! Integration tests for treatment plan and task queries.
//!
//! Each test runs in its own temporary database on the shared PostgreSQL
//! instance provided by `tend-test-utils`.

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use tend_db::models::{NewPlan, NewTask, TaskStatus};
use tend_db::queries::{plans, tasks};
use tend_test_utils::TestDb;

fn at(month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, month, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

fn daily_plan(start: NaiveDateTime, end: Option<NaiveDateTime>) -> NewPlan<'static> {
    NewPlan {
        action: "ACTION_A",
        subject: "PATIENT_001",
        start_time: start,
        end_time: end,
        recurrence_pattern: "DAILY:08:00,20:00",
    }
}

// -----------------------------------------------------------------------
// Plans
// -----------------------------------------------------------------------

#[tokio::test]
async fn insert_and_get_plan() {
    let db = TestDb::new().await;
    let pool = db.pool.clone();

    let plan = plans::insert_plan(&pool, &daily_plan(at(1, 1, 0, 0), None))
        .await
        .expect("insert_plan should succeed");

    assert_eq!(plan.action, "ACTION_A");
    assert_eq!(plan.subject, "PATIENT_001");
    assert_eq!(plan.recurrence_pattern, "DAILY:08:00,20:00");
    assert!(plan.active, "plans are active by default");
    assert!(plan.end_time.is_none());

    let fetched = plans::get_plan(&pool, plan.id)
        .await
        .expect("get_plan should succeed")
        .expect("plan should exist");
    assert_eq!(fetched, plan);

    let missing = plans::get_plan(&pool, Uuid::new_v4()).await.unwrap();
    assert!(missing.is_none());

    db.teardown().await;
}

#[tokio::test]
async fn find_active_plans_applies_validity_bounds() {
    let db = TestDb::new().await;
    let pool = db.pool.clone();
    let now = at(1, 10, 12, 0);

    let open_ended = plans::insert_plan(&pool, &daily_plan(at(1, 1, 0, 0), None))
        .await
        .unwrap();
    let ends_later = plans::insert_plan(&pool, &daily_plan(at(1, 1, 0, 0), Some(at(1, 11, 0, 0))))
        .await
        .unwrap();
    let starts_exactly_now = plans::insert_plan(&pool, &daily_plan(now, None))
        .await
        .unwrap();
    // Ends exactly at `now`: strict upper bound excludes it.
    let _ends_now = plans::insert_plan(&pool, &daily_plan(at(1, 1, 0, 0), Some(now)))
        .await
        .unwrap();
    let _not_started = plans::insert_plan(&pool, &daily_plan(at(1, 10, 12, 1), None))
        .await
        .unwrap();
    let deactivated = plans::insert_plan(&pool, &daily_plan(at(1, 1, 0, 0), None))
        .await
        .unwrap();
    plans::set_plan_active(&pool, deactivated.id, false)
        .await
        .unwrap();

    let active = plans::find_active_plans(&pool, now).await.unwrap();
    let mut ids: Vec<Uuid> = active.iter().map(|p| p.id).collect();
    ids.sort();
    let mut expected = vec![open_ended.id, ends_later.id, starts_exactly_now.id];
    expected.sort();
    assert_eq!(ids, expected);

    db.teardown().await;
}

#[tokio::test]
async fn set_plan_active_touches_updated_at_and_reports_missing() {
    let db = TestDb::new().await;
    let pool = db.pool.clone();

    let plan = plans::insert_plan(&pool, &daily_plan(at(1, 1, 0, 0), None))
        .await
        .unwrap();
    let updated = plans::set_plan_active(&pool, plan.id, false).await.unwrap();
    assert!(!updated.active);
    assert!(updated.updated_at >= plan.updated_at);

    let err = plans::set_plan_active(&pool, Uuid::new_v4(), true)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"), "unexpected: {err}");

    assert_eq!(plans::count_plans(&pool).await.unwrap(), 1);

    db.teardown().await;
}

// -----------------------------------------------------------------------
// Tasks
// -----------------------------------------------------------------------

#[tokio::test]
async fn insert_task_if_absent_is_idempotent() {
    let db = TestDb::new().await;
    let pool = db.pool.clone();

    let plan = plans::insert_plan(&pool, &daily_plan(at(1, 1, 0, 0), None))
        .await
        .unwrap();
    let new_task = NewTask::for_occurrence(&plan, at(1, 1, 8, 0));

    let first = tasks::insert_task_if_absent(&pool, &new_task)
        .await
        .unwrap()
        .expect("first insert creates the row");
    assert_eq!(first.status, TaskStatus::Active);
    assert_eq!(first.plan_id, plan.id);
    assert_eq!(first.scheduled_at, at(1, 1, 8, 0));
    assert!(first.completed_at.is_none());

    let second = tasks::insert_task_if_absent(&pool, &new_task).await.unwrap();
    assert!(second.is_none(), "duplicate occurrence must not insert");

    assert_eq!(tasks::count_tasks_for_plan(&pool, plan.id).await.unwrap(), 1);

    let found = tasks::find_task(&pool, plan.id, at(1, 1, 8, 0))
        .await
        .unwrap()
        .expect("task should be found by exact instant");
    assert_eq!(found.id, first.id);

    let off_by_a_minute = tasks::find_task(&pool, plan.id, at(1, 1, 8, 1))
        .await
        .unwrap();
    assert!(off_by_a_minute.is_none());

    db.teardown().await;
}

#[tokio::test]
async fn same_instant_for_different_plans_is_allowed() {
    let db = TestDb::new().await;
    let pool = db.pool.clone();

    let a = plans::insert_plan(&pool, &daily_plan(at(1, 1, 0, 0), None))
        .await
        .unwrap();
    let b = plans::insert_plan(&pool, &daily_plan(at(1, 1, 0, 0), None))
        .await
        .unwrap();

    for plan in [&a, &b] {
        let inserted = tasks::insert_task_if_absent(&pool, &NewTask::for_occurrence(plan, at(1, 1, 8, 0)))
            .await
            .unwrap();
        assert!(inserted.is_some());
    }

    let listed = tasks::list_tasks_between(&pool, at(1, 1, 0, 0), at(1, 2, 0, 0))
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);

    db.teardown().await;
}

#[tokio::test]
async fn concurrent_inserts_of_one_occurrence_yield_one_row() {
    let db = TestDb::new().await;
    let pool = db.pool.clone();

    let plan = plans::insert_plan(&pool, &daily_plan(at(1, 1, 0, 0), None))
        .await
        .unwrap();
    let new_task = NewTask::for_occurrence(&plan, at(1, 1, 20, 0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        let new_task = new_task.clone();
        handles.push(tokio::spawn(async move {
            tasks::insert_task_if_absent(&pool, &new_task).await
        }));
    }

    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_some() {
            created += 1;
        }
    }

    assert_eq!(created, 1, "exactly one insert should win");
    assert_eq!(tasks::count_tasks_for_plan(&pool, plan.id).await.unwrap(), 1);

    db.teardown().await;
}

#[tokio::test]
async fn list_tasks_for_plan_and_range_are_ordered_and_half_open() {
    let db = TestDb::new().await;
    let pool = db.pool.clone();

    let plan = plans::insert_plan(&pool, &daily_plan(at(1, 1, 0, 0), None))
        .await
        .unwrap();
    for instant in [at(1, 2, 8, 0), at(1, 1, 20, 0), at(1, 1, 8, 0)] {
        tasks::insert_task_if_absent(&pool, &NewTask::for_occurrence(&plan, instant))
            .await
            .unwrap();
    }

    let all = tasks::list_tasks_for_plan(&pool, plan.id).await.unwrap();
    let instants: Vec<NaiveDateTime> = all.iter().map(|t| t.scheduled_at).collect();
    assert_eq!(instants, vec![at(1, 1, 8, 0), at(1, 1, 20, 0), at(1, 2, 8, 0)]);

    let day_one = tasks::list_tasks_between(&pool, at(1, 1, 8, 0), at(1, 1, 20, 0))
        .await
        .unwrap();
    assert_eq!(day_one.len(), 1, "upper bound is exclusive");
    assert_eq!(day_one[0].scheduled_at, at(1, 1, 8, 0));

    db.teardown().await;
}

#[tokio::test]
async fn finish_task_only_from_active() {
    let db = TestDb::new().await;
    let pool = db.pool.clone();

    let plan = plans::insert_plan(&pool, &daily_plan(at(1, 1, 0, 0), None))
        .await
        .unwrap();
    let task = tasks::insert_task_if_absent(&pool, &NewTask::for_occurrence(&plan, at(1, 1, 8, 0)))
        .await
        .unwrap()
        .unwrap();

    let done = tasks::finish_task(&pool, task.id, TaskStatus::Completed, at(1, 1, 8, 5))
        .await
        .expect("active -> completed should succeed");
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.completed_at, Some(at(1, 1, 8, 5)));

    let again = tasks::finish_task(&pool, task.id, TaskStatus::Cancelled, at(1, 1, 9, 0))
        .await
        .unwrap_err();
    assert!(
        again.to_string().contains("must be active"),
        "unexpected: {again}"
    );

    let non_terminal = tasks::finish_task(&pool, task.id, TaskStatus::Active, at(1, 1, 9, 0))
        .await
        .unwrap_err();
    assert!(non_terminal.to_string().contains("non-terminal"));

    let missing = tasks::finish_task(&pool, Uuid::new_v4(), TaskStatus::Completed, at(1, 1, 9, 0))
        .await
        .unwrap_err();
    assert!(missing.to_string().contains("not found"));

    db.teardown().await;
}
