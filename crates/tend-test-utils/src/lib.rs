//! Throwaway tend databases for integration tests.
//!
//! Every [`TestDb`] is a freshly migrated database on one PostgreSQL server
//! shared by the whole test binary. The server is `TEND_TEST_PG_URL` when
//! set, otherwise a `postgres:16` container started on first use.

use std::time::Duration;

use chrono::NaiveDateTime;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use tend_db::models::{NewPlan, TreatmentPlan};
use tend_db::pool;
use tend_db::queries::plans::insert_plan;

pub const PG_URL_ENV: &str = "TEND_TEST_PG_URL";

/// Generous enough for a cold container under parallel tests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// The materializer tests race several runs against one database.
const TEST_POOL_SIZE: u32 = 8;

enum Server {
    External(String),
    Container {
        url: String,
        _container: ContainerAsync<Postgres>,
    },
}

impl Server {
    fn url(&self) -> &str {
        match self {
            Self::External(url) | Self::Container { url, .. } => url,
        }
    }
}

static SERVER: OnceCell<Server> = OnceCell::const_new();

async fn start_server() -> Server {
    if let Ok(url) = std::env::var(PG_URL_ENV) {
        return Server::External(url.trim_end_matches('/').to_owned());
    }

    let container = Postgres::default()
        .with_tag("16")
        .start()
        .await
        .expect("PostgreSQL container should start");
    let host = container.get_host().await.expect("container host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("container port 5432 should be mapped");

    Server::Container {
        url: format!("postgresql://postgres:postgres@{host}:{port}"),
        _container: container,
    }
}

/// Server URL without a database name, e.g. `postgresql://u:p@host:5432`.
pub async fn server_url() -> &'static str {
    SERVER.get_or_init(start_server).await.url()
}

async fn maintenance() -> PgPool {
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(CONNECT_TIMEOUT)
        .connect(&format!("{}/postgres", server_url().await))
        .await
        .expect("maintenance database should accept connections")
}

/// Unique name for a database created by a test.
pub fn fresh_db_name() -> String {
    format!("tend_test_{}", Uuid::new_v4().simple())
}

/// Drop `db_name`, disconnecting anyone still attached. Missing databases
/// are ignored.
pub async fn drop_database(db_name: &str) {
    let maintenance = maintenance().await;
    let _ = sqlx::query(
        "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
         WHERE datname = $1 AND pid <> pg_backend_pid()",
    )
    .bind(db_name)
    .execute(&maintenance)
    .await;
    let _ = maintenance
        .execute(format!("DROP DATABASE IF EXISTS {db_name}").as_str())
        .await;
    maintenance.close().await;
}

/// A migrated, empty tend database that lives until [`TestDb::teardown`].
pub struct TestDb {
    pub pool: PgPool,
    pub name: String,
}

impl TestDb {
    pub async fn new() -> Self {
        let name = fresh_db_name();
        let maintenance = maintenance().await;
        maintenance
            .execute(format!("CREATE DATABASE {name}").as_str())
            .await
            .unwrap_or_else(|e| panic!("failed to create {name}: {e}"));
        maintenance.close().await;

        let pool = PgPoolOptions::new()
            .max_connections(TEST_POOL_SIZE)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect(&format!("{}/{name}", server_url().await))
            .await
            .unwrap_or_else(|e| panic!("failed to connect to {name}: {e}"));
        pool::run_migrations(&pool)
            .await
            .expect("treatment schema should migrate");

        Self { pool, name }
    }

    /// Insert an open-ended plan for `ACTION_A` on `PATIENT_001`.
    pub async fn plan(&self, pattern: &str, start_time: NaiveDateTime) -> TreatmentPlan {
        self.plan_until(pattern, start_time, None).await
    }

    pub async fn plan_until(
        &self,
        pattern: &str,
        start_time: NaiveDateTime,
        end_time: Option<NaiveDateTime>,
    ) -> TreatmentPlan {
        insert_plan(
            &self.pool,
            &NewPlan {
                action: "ACTION_A",
                subject: "PATIENT_001",
                start_time,
                end_time,
                recurrence_pattern: pattern,
            },
        )
        .await
        .expect("plan fixture should insert")
    }

    pub async fn teardown(self) {
        self.pool.close().await;
        drop_database(&self.name).await;
    }
}
