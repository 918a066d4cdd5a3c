mod config;
mod pattern_cmd;
mod plan_cmds;
mod resolve;
mod run_cmd;
mod seed;
mod serve_cmd;
mod tasks_cmd;

use clap::{Parser, Subcommand};

use tend_core::scheduler::local_now;
use tend_db::config::DbConfig;
use tend_db::{pool, queries};

use config::{CliOverrides, TendConfig};

#[derive(Parser)]
#[command(name = "tend", about = "Materializes treatment tasks from recurring treatment plans")]
struct Cli {
    /// Database URL (overrides TEND_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a tend config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = DbConfig::DEFAULT_URL)]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create and migrate the tend database
    DbInit {
        /// Insert two demo plans when no plans exist yet
        #[arg(long)]
        seed: bool,
    },
    /// Treatment plan management
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Validate a recurrence pattern and preview its occurrences
    Pattern {
        /// Pattern text, e.g. DAILY:08:00,20:00
        pattern: String,
        /// Window start (default: now)
        #[arg(long)]
        from: Option<String>,
        /// Window end, exclusive (default: 7 days after the start)
        #[arg(long)]
        to: Option<String>,
        /// Plan start; decides the date of a ONCE pattern (default: window start)
        #[arg(long)]
        plan_start: Option<String>,
        /// Plan end, inclusive
        #[arg(long)]
        plan_end: Option<String>,
    },
    /// Materialize upcoming tasks for every active plan now
    Run {
        /// Hours ahead of now to materialize (overrides config)
        #[arg(long)]
        look_ahead_hours: Option<u32>,
    },
    /// List the tasks of a plan
    Tasks {
        /// Plan ID
        plan_id: String,
    },
    /// List tasks of every plan scheduled in a time range
    Due {
        /// Range start (default: now)
        #[arg(long)]
        from: Option<String>,
        /// Range end, exclusive (default: 24 hours after the start)
        #[arg(long)]
        to: Option<String>,
    },
    /// Mark an active task as completed
    Complete {
        /// Task ID
        task_id: String,
    },
    /// Serve the HTTP API and materialize on an interval
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Create a plan
    Add {
        /// Treatment action, e.g. ACTION_A
        #[arg(long)]
        action: String,
        /// Subject (patient) identifier
        #[arg(long)]
        subject: String,
        /// Recurrence pattern, e.g. WEEKLY:MONDAY:10:00
        #[arg(long)]
        pattern: String,
        /// Start of validity, YYYY-MM-DDTHH:MM (default: now)
        #[arg(long)]
        start: Option<String>,
        /// End of validity, YYYY-MM-DDTHH:MM (default: open-ended)
        #[arg(long)]
        end: Option<String>,
    },
    /// List all plans
    List,
    /// Show one plan with its task counts
    Show {
        /// Plan ID
        plan_id: String,
    },
    /// Resume materializing a plan
    Activate {
        /// Plan ID
        plan_id: String,
    },
    /// Stop materializing a plan; existing tasks are kept
    Deactivate {
        /// Plan ID
        plan_id: String,
    },
}

/// Execute the `tend init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        scheduler: config::SchedulerSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!(
        "  scheduler.look_ahead_hours = {}",
        cfg.scheduler.look_ahead_hours
    );
    println!("  scheduler.interval_ms = {}", cfg.scheduler.interval_ms);
    println!();
    println!("Next: run `tend db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `tend db-init` command: create database and run migrations.
async fn cmd_db_init(resolved: &TendConfig, seed: bool) -> anyhow::Result<()> {
    println!("Initializing tend database...");

    match pool::ensure_database_exists(&resolved.db_config).await? {
        pool::DatabaseSetup::Created => println!("Created the tend database."),
        pool::DatabaseSetup::AlreadyPresent => println!("The tend database already exists."),
    }
    let db_pool = pool::create_pool(&resolved.db_config).await?;

    let result = async {
        pool::run_migrations(&db_pool).await?;

        if seed {
            let seeded = seed::seed_demo_plans(&db_pool, local_now()).await?;
            if seeded.is_empty() {
                println!("Plans already exist; demo data not inserted.");
            } else {
                println!("Inserted {} demo plans.", seeded.len());
            }
        }

        let summary = queries::summarize(&db_pool).await?;
        println!("Database ready.");
        println!("  plans: {} ({} active)", summary.plans, summary.active_plans);
        println!("  tasks: {}", summary.total_tasks());
        for (status, count) in &summary.tasks_by_status {
            println!("    {status}: {count}");
        }
        anyhow::Ok(())
    }
    .await;

    db_pool.close().await;
    result?;

    println!("tend db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let overrides = CliOverrides {
        db_url: cli.database_url.as_deref(),
        look_ahead_hours: None,
    };

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit { seed } => {
            let resolved = TendConfig::resolve(overrides)?;
            cmd_db_init(&resolved, seed).await?;
        }
        Commands::Plan { command } => {
            let resolved = TendConfig::resolve(overrides)?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = plan_cmds::run_plan_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Pattern {
            pattern,
            from,
            to,
            plan_start,
            plan_end,
        } => {
            pattern_cmd::run_pattern(&pattern_cmd::PatternArgs {
                pattern: &pattern,
                from: from.as_deref(),
                to: to.as_deref(),
                plan_start: plan_start.as_deref(),
                plan_end: plan_end.as_deref(),
            })?;
        }
        Commands::Run { look_ahead_hours } => {
            let resolved = TendConfig::resolve(CliOverrides {
                look_ahead_hours,
                ..overrides
            })?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = run_cmd::run_once(&db_pool, resolved.materializer).await;
            db_pool.close().await;
            result?;
        }
        Commands::Tasks { plan_id } => {
            let resolved = TendConfig::resolve(overrides)?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = tasks_cmd::run_tasks(&db_pool, &plan_id).await;
            db_pool.close().await;
            result?;
        }
        Commands::Due { from, to } => {
            let resolved = TendConfig::resolve(overrides)?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = tasks_cmd::run_due(&db_pool, from.as_deref(), to.as_deref()).await;
            db_pool.close().await;
            result?;
        }
        Commands::Complete { task_id } => {
            let resolved = TendConfig::resolve(overrides)?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = tasks_cmd::run_complete(&db_pool, &task_id).await;
            db_pool.close().await;
            result?;
        }
        Commands::Serve { bind, port } => {
            let resolved = TendConfig::resolve(overrides)?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = serve_cmd::run_serve(
                db_pool.clone(),
                resolved.materializer,
                resolved.run_interval,
                &bind,
                port,
            )
            .await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
