//! CLI handlers for `tend plan` subcommands.
//!
//! Implements:
//! - `tend plan add`                -- author a plan after validating its pattern
//! - `tend plan list`               -- list all plans
//! - `tend plan show <plan-id>`     -- plan details plus task counts
//! - `tend plan activate|deactivate <plan-id>`

use anyhow::{Context, Result, bail};
use sqlx::PgPool;

use tend_core::recurrence::parse_pattern;
use tend_core::scheduler::local_now;
use tend_db::models::{NewPlan, TaskStatus, TreatmentPlan};
use tend_db::queries::{plans as plan_db, tasks as task_db};

use crate::PlanCommands;
use crate::resolve::{parse_id, parse_opt_timestamp};

const TIME_FMT: &str = "%Y-%m-%d %H:%M";

// -----------------------------------------------------------------------
// Public entry point
// -----------------------------------------------------------------------

pub async fn run_plan_command(command: PlanCommands, pool: &PgPool) -> Result<()> {
    match command {
        PlanCommands::Add {
            action,
            subject,
            pattern,
            start,
            end,
        } => cmd_add(pool, &action, &subject, &pattern, start.as_deref(), end.as_deref()).await,
        PlanCommands::List => cmd_list(pool).await,
        PlanCommands::Show { plan_id } => cmd_show(pool, &plan_id).await,
        PlanCommands::Activate { plan_id } => cmd_set_active(pool, &plan_id, true).await,
        PlanCommands::Deactivate { plan_id } => cmd_set_active(pool, &plan_id, false).await,
    }
}

// -----------------------------------------------------------------------
// tend plan add
// -----------------------------------------------------------------------

async fn cmd_add(
    pool: &PgPool,
    action: &str,
    subject: &str,
    pattern: &str,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<()> {
    let parsed = parse_pattern(pattern)?;

    let start_time = parse_opt_timestamp(start)?.unwrap_or_else(local_now);
    let end_time = parse_opt_timestamp(end)?;
    if let Some(end_time) = end_time.filter(|end| *end <= start_time) {
        bail!("plan end {end_time} must be after its start {start_time}");
    }

    // Store the canonical form so every reader sees the same text.
    let canonical = parsed.to_string();
    let plan = plan_db::insert_plan(
        pool,
        &NewPlan {
            action,
            subject,
            start_time,
            end_time,
            recurrence_pattern: &canonical,
        },
    )
    .await?;

    println!("Plan created.");
    println!();
    print_plan(&plan);
    Ok(())
}

// -----------------------------------------------------------------------
// tend plan list
// -----------------------------------------------------------------------

async fn cmd_list(pool: &PgPool) -> Result<()> {
    let plans = plan_db::list_plans(pool).await?;

    if plans.is_empty() {
        println!("No plans found. Use `tend plan add` to create one.");
        return Ok(());
    }

    let id_w = 36;
    let action_w = plans.iter().map(|p| p.action.len()).max().unwrap_or(6).max(6);
    let subject_w = plans.iter().map(|p| p.subject.len()).max().unwrap_or(7).max(7);
    let pattern_w = plans
        .iter()
        .map(|p| p.recurrence_pattern.len())
        .max()
        .unwrap_or(7)
        .max(7);

    println!(
        "{:<id_w$}  {:<action_w$}  {:<subject_w$}  {:<pattern_w$}  {:<6}  START             END",
        "ID", "ACTION", "SUBJECT", "PATTERN", "ACTIVE",
    );
    for plan in &plans {
        println!(
            "{:<id_w$}  {:<action_w$}  {:<subject_w$}  {:<pattern_w$}  {:<6}  {}  {}",
            plan.id,
            plan.action,
            plan.subject,
            plan.recurrence_pattern,
            if plan.active { "yes" } else { "no" },
            plan.start_time.format(TIME_FMT),
            plan.end_time
                .map(|t| t.format(TIME_FMT).to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }

    Ok(())
}

// -----------------------------------------------------------------------
// tend plan show <plan-id>
// -----------------------------------------------------------------------

async fn cmd_show(pool: &PgPool, plan_id: &str) -> Result<()> {
    let id = parse_id("plan", plan_id)?;
    let plan = plan_db::get_plan(pool, id)
        .await?
        .with_context(|| format!("plan {id} not found"))?;

    print_plan(&plan);

    if let Err(e) = parse_pattern(&plan.recurrence_pattern) {
        println!();
        println!("Warning: {e}");
        println!("This plan is skipped on every run until its pattern is fixed.");
    }

    let tasks = task_db::list_tasks_for_plan(pool, id).await?;
    let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();
    println!();
    println!(
        "Tasks: {} (active={} completed={} skipped={} cancelled={})",
        tasks.len(),
        count(TaskStatus::Active),
        count(TaskStatus::Completed),
        count(TaskStatus::Skipped),
        count(TaskStatus::Cancelled),
    );
    if let Some(next) = tasks
        .iter()
        .find(|t| t.status == TaskStatus::Active && t.scheduled_at >= local_now())
    {
        println!("Next due: {}", next.scheduled_at.format(TIME_FMT));
    }

    Ok(())
}

// -----------------------------------------------------------------------
// tend plan activate|deactivate <plan-id>
// -----------------------------------------------------------------------

async fn cmd_set_active(pool: &PgPool, plan_id: &str, active: bool) -> Result<()> {
    let id = parse_id("plan", plan_id)?;
    let plan = plan_db::set_plan_active(pool, id, active).await?;
    let state = if plan.active { "activated" } else { "deactivated" };
    println!("Plan {} {state}.", plan.id);
    Ok(())
}

fn print_plan(plan: &TreatmentPlan) {
    println!("  Plan ID:  {}", plan.id);
    println!("  Action:   {}", plan.action);
    println!("  Subject:  {}", plan.subject);
    println!("  Pattern:  {}", plan.recurrence_pattern);
    println!("  Start:    {}", plan.start_time.format(TIME_FMT));
    match plan.end_time {
        Some(end) => println!("  End:      {}", end.format(TIME_FMT)),
        None => println!("  End:      (open-ended)"),
    }
    println!("  Active:   {}", if plan.active { "yes" } else { "no" });
}
