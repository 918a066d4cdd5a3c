use std::time::Duration;

use anyhow::{Context, Result, bail};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};

use crate::config::DbConfig;

/// The treatment schema, embedded from `crates/tend-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// A materialization run holds at most one connection at a time, so a small
/// pool covers the server's periodic run plus concurrent HTTP reads.
const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// What [`ensure_database_exists`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseSetup {
    Created,
    AlreadyPresent,
}

pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("failed to connect to tend database at {}", config.database_url))
}

/// Bring the treatment schema up to date. Applied migrations are skipped.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to migrate the treatment schema")?;

    tracing::info!(
        migrations = MIGRATOR.iter().count(),
        "treatment schema is up to date"
    );
    Ok(())
}

/// Create the database named in `config` through the server's `postgres`
/// maintenance database unless it already exists.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<DatabaseSetup> {
    let Some(db_name) = config.database_name() else {
        bail!("database URL {} names no database", config.database_url);
    };
    // Interpolated into CREATE DATABASE, which takes no bind parameters.
    if !db_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("database name {db_name:?} may only contain ASCII letters, digits and '_'");
    }

    let maintenance_url = config.maintenance_url();
    let maintenance = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&maintenance_url)
        .await
        .with_context(|| format!("failed to connect to {maintenance_url}"))?;

    let setup = create_if_absent(&maintenance, db_name).await;
    maintenance.close().await;

    let setup = setup?;
    tracing::info!(db = db_name, ?setup, "tend database checked");
    Ok(setup)
}

async fn create_if_absent(maintenance: &PgPool, db_name: &str) -> Result<DatabaseSetup> {
    let present: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(db_name)
            .fetch_one(maintenance)
            .await
            .context("failed to look up the tend database")?;
    if present {
        return Ok(DatabaseSetup::AlreadyPresent);
    }

    maintenance
        .execute(format!("CREATE DATABASE {db_name}").as_str())
        .await
        .with_context(|| format!("failed to create database {db_name}"))?;
    Ok(DatabaseSetup::Created)
}
