//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    CancelResponse, CheckpointListResponse, ErrorResponse, ModelsResponse, RunDetailResponse,
    RunListResponse, RunRequest, RunResultResponse, StreamQuery,
};
use super::AppState;
use crate::runtime::RunError;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Runs
        .route("/api/runs", get(list_runs).post(run_batch))
        .route("/api/runs/stream", get(run_stream))
        .route("/api/runs/:id", get(get_run))
        .route("/api/runs/:id/checkpoints", get(list_checkpoints))
        .route("/api/runs/:id/resume", post(resume_run))
        .route("/api/runs/:id/cancel", post(cancel_run))
        // Model info
        .route("/api/models", get(list_models))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Run Execution
// ============================================================

async fn run_batch(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<Json<RunResultResponse>, AppError> {
    let source_ref = validate_source_ref(&req.document_source_ref)?;
    let report = state.runs.run_batch(source_ref).await?;
    Ok(Json(report.into()))
}

async fn run_stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<impl IntoResponse, AppError> {
    let source_ref = validate_source_ref(&query.document_source_ref)?;
    let (run_id, rx) = state.runs.run_streaming(source_ref).await?;
    Ok(([("x-run-id", run_id.clone())], sse_stream(run_id, rx)))
}

async fn resume_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunResultResponse>, AppError> {
    let report = state.runs.resume(&id).await?;
    Ok(Json(report.into()))
}

async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, AppError> {
    if state.runs.cancel(&id).await {
        return Ok(Json(CancelResponse { ok: true }));
    }
    let run = state.runs.get_run(&id).await?;
    Err(AppError::Conflict(format!(
        "Run {id} is not in progress ({})",
        run.status
    )))
}

fn validate_source_ref(source_ref: &str) -> Result<&str, AppError> {
    let source_ref = source_ref.trim();
    if source_ref.is_empty() {
        return Err(AppError::BadRequest(
            "document_source_ref must not be empty".to_string(),
        ));
    }
    Ok(source_ref)
}

// ============================================================
// Run Inspection
// ============================================================

async fn list_runs(State(state): State<AppState>) -> Result<Json<RunListResponse>, AppError> {
    let runs = state.runs.list_runs().await?;
    Ok(Json(RunListResponse { runs }))
}

async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunDetailResponse>, AppError> {
    let run = state.runs.get_run(&id).await?;
    let latest_checkpoint = state.runs.latest_checkpoint(&id).await?;
    Ok(Json(RunDetailResponse {
        run,
        latest_checkpoint,
    }))
}

async fn list_checkpoints(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CheckpointListResponse>, AppError> {
    let checkpoints = state.runs.checkpoints(&id).await?;
    Ok(Json(CheckpointListResponse { checkpoints }))
}

// ============================================================
// Model Info
// ============================================================

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.llm_registry.available_model_info(),
        default: state.llm_registry.default_model_id().to_string(),
    })
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("dialectic ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<RunError> for AppError {
    fn from(e: RunError) -> Self {
        match e {
            RunError::NotFound(_) => AppError::NotFound(e.to_string()),
            RunError::AlreadyFinished { .. } | RunError::Busy(_) => {
                AppError::Conflict(e.to_string())
            }
            RunError::Corrupt(_) | RunError::Storage(_) | RunError::Task(_) => {
                tracing::error!(error = %e, "Run request failed");
                AppError::Internal(e.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
