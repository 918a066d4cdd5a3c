//! `tend run` command: one materialization run, right now.

use anyhow::Result;
use sqlx::PgPool;

use tend_core::materialize::{Materializer, MaterializerConfig, RunReport};
use tend_core::scheduler::local_now;
use tend_core::store::PgTaskStore;

/// The summary line reported for a run.
pub fn run_message(report: &RunReport) -> String {
    format!(
        "Scheduler executed. Generated {} tasks.",
        report.tasks_created()
    )
}

pub async fn run_once(pool: &PgPool, config: MaterializerConfig) -> Result<()> {
    let materializer = Materializer::new(PgTaskStore::new(pool.clone()), config);
    let report = materializer.run(local_now()).await;

    println!("{}", run_message(&report));
    println!(
        "  Window: {} .. {} ({} plans considered)",
        report.window_from.format("%Y-%m-%d %H:%M"),
        report.window_to.format("%Y-%m-%d %H:%M"),
        report.plans_considered,
    );

    if let Some(err) = &report.fetch_error {
        println!();
        println!("Could not load treatment plans: {err}");
    }

    if report.plans_failed() > 0 {
        println!();
        println!("Failed plans:");
        for (plan_id, reason) in report.failures() {
            println!("  - {plan_id}: {reason}");
        }
    }

    Ok(())
}
