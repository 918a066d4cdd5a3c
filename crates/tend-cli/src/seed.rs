//! Demo plans inserted by `tend db-init --seed`.

use anyhow::Result;
use chrono::{Duration, NaiveDateTime};
use sqlx::PgPool;

use tend_db::models::{NewPlan, TreatmentPlan};
use tend_db::queries::plans as plan_db;

/// Insert two demo plans if the plan table is empty.
///
/// Returns the inserted plans; empty when plans already existed.
pub async fn seed_demo_plans(pool: &PgPool, now: NaiveDateTime) -> Result<Vec<TreatmentPlan>> {
    if plan_db::count_plans(pool).await? > 0 {
        tracing::info!("plans already present, skipping demo data");
        return Ok(Vec::new());
    }

    let start = now - Duration::hours(1);
    let demo = [
        NewPlan {
            action: "ACTION_A",
            subject: "PATIENT_001",
            start_time: start,
            end_time: Some(now + Duration::days(7)),
            recurrence_pattern: "DAILY:08:00,20:00",
        },
        NewPlan {
            action: "ACTION_B",
            subject: "PATIENT_002",
            start_time: start,
            end_time: None,
            recurrence_pattern: "WEEKLY:MONDAY:10:00",
        },
    ];

    let mut inserted = Vec::with_capacity(demo.len());
    for plan in &demo {
        inserted.push(plan_db::insert_plan(pool, plan).await?);
    }
    tracing::info!(count = inserted.len(), "created demo treatment plans");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use tend_test_utils::TestDb;

    use super::*;

    #[tokio::test]
    async fn seeds_only_an_empty_table() {
        let db = TestDb::new().await;
        let pool = db.pool.clone();
        let now = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();

        let first = seed_demo_plans(&pool, now).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|p| p.active && p.start_time < now));
        assert_eq!(first[0].end_time, Some(now + Duration::days(7)));
        assert!(first[1].end_time.is_none());

        let second = seed_demo_plans(&pool, now).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(plan_db::count_plans(&pool).await.unwrap(), 2);

        db.teardown().await;
    }
}
