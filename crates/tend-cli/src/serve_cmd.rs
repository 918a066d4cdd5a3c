use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use tend_core::materialize::{Materializer, MaterializerConfig, RunReport};
use tend_core::scheduler::{local_now, run_periodic};
use tend_core::store::PgTaskStore;
use tend_db::models::TreatmentPlan;
use tend_db::queries::{plans as plan_db, tasks as task_db};

use crate::run_cmd::run_message;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// State and response types
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pool: PgPool,
    materializer: Arc<Materializer<PgTaskStore>>,
}

impl AppState {
    pub fn new(pool: PgPool, config: MaterializerConfig) -> Self {
        let materializer = Arc::new(Materializer::new(PgTaskStore::new(pool.clone()), config));
        Self { pool, materializer }
    }
}

#[derive(Debug, Serialize)]
pub struct PlanSummaryResponse {
    #[serde(flatten)]
    pub plan: TreatmentPlan,
    pub task_count: i64,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub message: String,
    pub tasks_created: usize,
    pub plans_failed: usize,
    #[serde(flatten)]
    pub report: RunReport,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/scheduler/run", post(run_scheduler))
        .route("/api/plans", get(list_plans))
        .route("/api/plans/{id}/tasks", get(list_plan_tasks))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Serve the HTTP API and run materialization every `interval` until Ctrl+C.
pub async fn run_serve(
    pool: PgPool,
    config: MaterializerConfig,
    interval: Duration,
    bind: &str,
    port: u16,
) -> Result<()> {
    let state = AppState::new(pool, config);
    let cancel = CancellationToken::new();
    let periodic = tokio::spawn(run_periodic(
        Arc::clone(&state.materializer),
        interval,
        cancel.clone(),
    ));

    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("tend serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    cancel.cancel();
    if let Err(e) = periodic.await {
        tracing::error!(error = %e, "periodic materialization task failed");
    }
    served?;
    tracing::info!("tend serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> &'static str {
    "ok"
}

async fn run_scheduler(State(state): State<AppState>) -> Json<RunResponse> {
    let report = state.materializer.run(local_now()).await;
    Json(RunResponse {
        message: run_message(&report),
        tasks_created: report.tasks_created(),
        plans_failed: report.plans_failed(),
        report,
    })
}

async fn list_plans(State(state): State<AppState>) -> Result<axum::response::Response, AppError> {
    let plans = plan_db::list_plans(&state.pool)
        .await
        .map_err(AppError::internal)?;

    let mut results = Vec::with_capacity(plans.len());
    for plan in plans {
        let task_count = task_db::count_tasks_for_plan(&state.pool, plan.id)
            .await
            .map_err(AppError::internal)?;
        results.push(PlanSummaryResponse { plan, task_count });
    }

    Ok(Json(results).into_response())
}

async fn list_plan_tasks(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    plan_db::get_plan(&state.pool, id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("plan {id} not found")))?;

    let tasks = task_db::list_tasks_for_plan(&state.pool, id)
        .await
        .map_err(AppError::internal)?;

    Ok(Json(tasks).into_response())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use chrono::Duration;
    use sqlx::PgPool;
    use tower::ServiceExt;

    use tend_core::materialize::MaterializerConfig;
    use tend_core::scheduler::local_now;
    use tend_db::models::NewPlan;
    use tend_db::queries::plans::insert_plan;
    use tend_test_utils::TestDb;

    use super::AppState;

    // -----------------------------------------------------------------------
    // HTTP helpers
    // -----------------------------------------------------------------------

    /// A 24 hour look-ahead always holds exactly one occurrence of a
    /// once-a-day time, whatever the wall clock says.
    fn app(pool: PgPool) -> axum::Router {
        super::build_router(AppState::new(
            pool,
            MaterializerConfig {
                look_ahead_hours: 24,
            },
        ))
    }

    async fn send(pool: PgPool, method: Method, uri: &str) -> axum::response::Response {
        app(pool)
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn insert_daily_plan(pool: &PgPool, pattern: &str) -> tend_db::models::TreatmentPlan {
        insert_plan(
            pool,
            &NewPlan {
                action: "ACTION_A",
                subject: "PATIENT_001",
                start_time: local_now() - Duration::hours(1),
                end_time: None,
                recurrence_pattern: pattern,
            },
        )
        .await
        .expect("insert_plan should succeed")
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_health() {
        let db = TestDb::new().await;
        let pool = db.pool.clone();

        let resp = send(pool.clone(), Method::GET, "/health").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], b"ok");

        db.teardown().await;
    }

    #[tokio::test]
    async fn test_list_plans_empty() {
        let db = TestDb::new().await;
        let pool = db.pool.clone();

        let resp = send(pool.clone(), Method::GET, "/api/plans").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, serde_json::json!([]));

        db.teardown().await;
    }

    #[tokio::test]
    async fn test_run_materializes_then_is_idempotent() {
        let db = TestDb::new().await;
        let pool = db.pool.clone();
        let plan = insert_daily_plan(&pool, "DAILY:08:00").await;
        let broken = insert_daily_plan(&pool, "DAILY:noon").await;

        let resp = send(pool.clone(), Method::POST, "/api/scheduler/run").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["tasks_created"], 1);
        assert_eq!(json["plans_failed"], 1);
        assert_eq!(json["message"], "Scheduler executed. Generated 1 tasks.");
        let outcomes = json["outcomes"].as_array().expect("outcomes array");
        let failed = outcomes
            .iter()
            .find(|o| o["status"] == "failed")
            .expect("broken plan should be reported");
        assert_eq!(failed["plan_id"], broken.id.to_string());

        let again = body_json(send(pool.clone(), Method::POST, "/api/scheduler/run").await).await;
        assert_eq!(again["tasks_created"], 0);
        assert_eq!(again["message"], "Scheduler executed. Generated 0 tasks.");

        let tasks_resp = send(
            pool.clone(),
            Method::GET,
            &format!("/api/plans/{}/tasks", plan.id),
        )
        .await;
        assert_eq!(tasks_resp.status(), StatusCode::OK);
        let tasks = body_json(tasks_resp).await;
        let arr = tasks.as_array().expect("tasks array");
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0]["status"], "active");
        assert_eq!(arr[0]["plan_id"], plan.id.to_string());

        let plans = body_json(send(pool.clone(), Method::GET, "/api/plans").await).await;
        let plan_json = plans
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["id"] == plan.id.to_string())
            .expect("plan should be listed");
        assert_eq!(plan_json["task_count"], 1);
        assert_eq!(plan_json["recurrence_pattern"], "DAILY:08:00");

        db.teardown().await;
    }

    #[tokio::test]
    async fn test_tasks_for_unknown_plan_is_not_found() {
        let db = TestDb::new().await;
        let pool = db.pool.clone();

        let random_id = uuid::Uuid::new_v4();
        let resp = send(
            pool.clone(),
            Method::GET,
            &format!("/api/plans/{random_id}/tasks"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_json(resp).await;
        assert_eq!(json["error"], format!("plan {random_id} not found"));

        db.teardown().await;
    }

    #[tokio::test]
    async fn test_malformed_plan_id_is_bad_request() {
        let db = TestDb::new().await;
        let pool = db.pool.clone();

        let resp = send(pool.clone(), Method::GET, "/api/plans/not-a-uuid/tasks").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        db.teardown().await;
    }

    #[tokio::test]
    async fn test_run_requires_post() {
        let db = TestDb::new().await;
        let pool = db.pool.clone();

        let resp = send(pool.clone(), Method::GET, "/api/scheduler/run").await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

        db.teardown().await;
    }
}
