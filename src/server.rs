//! HTTP trigger surface for the job queue
//!
//! The server does not process anything on its own schedule; every
//! endpoint is a single enqueue or single worker invocation, so an
//! external scheduler (cron, a platform timer, a human with curl) drives
//! the pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ingest-queue` | Enqueue ingest jobs for a project |
//! | `POST` | `/ingest-worker` | Claim and process one ingest job |
//! | `POST` | `/analysis-queue` | Enqueue the project's analysis job |
//! | `POST` | `/analysis-worker` | Claim and process one analysis job |
//! | `GET`  | `/projects/{id}/status` | The ingest aggregate the UI polls |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "success": false, "code": "not_found", "error": "Project not found: ..." }
//! ```
//!
//! Validation failures map to 4xx, everything else to 500 `internal`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::Error;
use crate::queue;
use crate::worker::{self, Pipeline};

/// Shared state passed to all route handlers
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Start the trigger server on the configured bind address
pub async fn run_server(pipeline: Arc<Pipeline>) -> anyhow::Result<()> {
    let bind_addr = pipeline.config.server.bind.clone();
    let state = AppState { pipeline };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state).layer(cors);

    info!("Trigger server listening on http://{}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/ingest-queue", post(handle_ingest_queue))
        .route("/ingest-worker", post(handle_ingest_worker))
        .route("/analysis-queue", post(handle_analysis_queue))
        .route("/analysis-worker", post(handle_analysis_worker))
        .route("/projects/{id}/status", get(handle_project_status))
        .route("/health", get(handle_health))
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    code: String,
    error: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            code: self.code.to_string(),
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match &err {
            Error::ProjectNotFound(_) | Error::DocumentNotFound(_) | Error::JobNotFound(_) => {
                AppError {
                    status: StatusCode::NOT_FOUND,
                    code: "not_found",
                    message: err.to_string(),
                }
            }
            Error::Config(_) => AppError {
                status: StatusCode::BAD_REQUEST,
                code: "bad_request",
                message: err.to_string(),
            },
            _ => AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "internal",
                message: err.to_string(),
            },
        }
    }
}

// ============ Handlers ============

#[derive(Deserialize)]
struct QueueRequest {
    project_id: String,
}

#[derive(Serialize)]
struct QueueResponse {
    success: bool,
    jobs_created: u64,
    estimated_completion: Option<String>,
}

async fn handle_ingest_queue(
    State(state): State<AppState>,
    Json(req): Json<QueueRequest>,
) -> Result<Json<QueueResponse>, AppError> {
    let outcome = queue::enqueue_ingest(
        &state.pipeline.store,
        &state.pipeline.config,
        &req.project_id,
        false,
    )
    .await?;
    Ok(Json(QueueResponse {
        success: true,
        jobs_created: outcome.jobs_created,
        estimated_completion: outcome.estimated_completion,
    }))
}

async fn handle_analysis_queue(
    State(state): State<AppState>,
    Json(req): Json<QueueRequest>,
) -> Result<Json<QueueResponse>, AppError> {
    let outcome = queue::enqueue_analysis(
        &state.pipeline.store,
        &state.pipeline.config,
        &req.project_id,
    )
    .await?;
    Ok(Json(QueueResponse {
        success: true,
        jobs_created: outcome.jobs_created,
        estimated_completion: outcome.estimated_completion,
    }))
}

#[derive(Serialize)]
struct IngestWorkerResponse {
    success: bool,
    idle: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunks_created: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    embeddings_created: Option<usize>,
}

async fn handle_ingest_worker(
    State(state): State<AppState>,
) -> Result<Json<IngestWorkerResponse>, AppError> {
    match worker::run_ingest_worker(&state.pipeline).await? {
        Some(outcome) => Ok(Json(IngestWorkerResponse {
            success: true,
            idle: false,
            chunks_created: Some(outcome.chunks_created),
            embeddings_created: Some(outcome.embeddings_created),
        })),
        None => Ok(Json(IngestWorkerResponse {
            success: true,
            idle: true,
            chunks_created: None,
            embeddings_created: None,
        })),
    }
}

#[derive(Serialize)]
struct AnalysisWorkerResponse {
    success: bool,
    idle: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    documents_processed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    results_written: Option<usize>,
}

async fn handle_analysis_worker(
    State(state): State<AppState>,
) -> Result<Json<AnalysisWorkerResponse>, AppError> {
    match worker::run_analysis_worker(&state.pipeline).await? {
        Some(outcome) => Ok(Json(AnalysisWorkerResponse {
            success: true,
            idle: false,
            documents_processed: Some(outcome.documents_processed),
            results_written: Some(outcome.results_written),
        })),
        None => Ok(Json(AnalysisWorkerResponse {
            success: true,
            idle: true,
            documents_processed: None,
            results_written: None,
        })),
    }
}

#[derive(Serialize)]
struct StatusResponse {
    success: bool,
    project_id: String,
    status: String,
    jobs_total: i64,
    jobs_completed: i64,
    jobs_failed: i64,
    estimated_completion: Option<String>,
    error_message: Option<String>,
}

async fn handle_project_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let store = &state.pipeline.store;
    store
        .get_project(&id)
        .await?
        .ok_or_else(|| Error::ProjectNotFound(id.clone()))?;

    // No metadata row yet means nothing has been enqueued
    let meta = store.get_ingest_metadata(&id).await?;
    let response = match meta {
        Some(meta) => {
            // The first failing job's message is what the UI shows next to
            // the counts
            let error_message = if meta.jobs_failed > 0 {
                store.first_ingest_error(&id).await?
            } else {
                None
            };
            StatusResponse {
                success: true,
                project_id: id,
                status: meta.status,
                jobs_total: meta.jobs_total,
                jobs_completed: meta.jobs_completed,
                jobs_failed: meta.jobs_failed,
                estimated_completion: meta.estimated_completion,
                error_message,
            }
        }
        None => StatusResponse {
            success: true,
            project_id: id,
            status: "queued".to_string(),
            jobs_total: 0,
            jobs_completed: 0,
            jobs_failed: 0,
            estimated_completion: None,
            error_message: None,
        },
    };
    Ok(Json(response))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
