//! API routes for intelicadd
//!
//! Paths match what the CAD add-in already calls, trailing slashes included.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use intelicad_common::wire::{
    AnalysisResponse, ClaimRequest, ClaimResponse, CompleteResponse, ErrorBody, ExecutionReport,
    HealthResponse, PollResponse, RetryResponse, SubmitJobResponse, FIELD_FILE, FIELD_SUMMARY,
    FIELD_TEXT_COMMAND,
};
use intelicad_common::{Job, JobError, ModelAnalysis, VERSION};
use tracing::{error, warn};

use crate::jobs::Upload;
use crate::server::AppState;

type AppStateArc = Arc<AppState>;

/// [`JobError`] rendered as `{"error": ...}` with its status code.
pub struct ApiError(pub JobError);

impl From<JobError> for ApiError {
    fn from(e: JobError) -> Self {
        ApiError(e)
    }
}

/// Malformed or mistyped JSON bodies get the same error shape as every
/// other client error.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(JobError::BadRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("  {}", self.0);
        } else {
            warn!("  {}", self.0);
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Health
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: VERSION.to_string(),
        jobs: state.jobs.job_count(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

// ============================================================================
// Job Routes (user side)
// ============================================================================

pub fn job_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/submit-job/", post(submit_job))
        .route("/job-status/:id", get(job_status))
        .route("/download/:id", get(download))
}

/// Multipart form fields, all optional at parse time.
#[derive(Default)]
struct Form {
    file: Option<Upload>,
    text_command: Option<String>,
    summary: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<Form, JobError> {
    let bad = |e: axum::extract::multipart::MultipartError| JobError::BadRequest(e.to_string());
    let mut form = Form::default();
    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(FIELD_FILE) => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad)?;
                form.file = Some(Upload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            Some(FIELD_TEXT_COMMAND) => form.text_command = Some(field.text().await.map_err(bad)?),
            Some(FIELD_SUMMARY) => form.summary = Some(field.text().await.map_err(bad)?),
            _ => {}
        }
    }
    Ok(form)
}

async fn submit_job(
    State(state): State<AppStateArc>,
    multipart: Multipart,
) -> ApiResult<SubmitJobResponse> {
    let form = read_form(multipart).await?;
    let file = form
        .file
        .ok_or_else(|| JobError::BadRequest("missing 'file' field".to_string()))?;
    let command = form
        .text_command
        .ok_or_else(|| JobError::BadRequest("missing 'text_command' field".to_string()))?;

    let job = state.jobs.submit(&command, Some(file)).await?;
    Ok(Json(SubmitJobResponse {
        job_id: job.id,
        phase: job.phase,
        design_intent: job.intent,
        preliminary_operations: job.preliminary_operations,
        error: job.error,
    }))
}

async fn job_status(State(state): State<AppStateArc>, Path(id): Path<String>) -> ApiResult<Job> {
    Ok(Json(state.jobs.status(&id)?))
}

async fn download(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let (artifact, bytes) = state.jobs.output_artifact(&id).await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        artifact.file_name.replace('"', "")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

// ============================================================================
// Executor Routes
// ============================================================================

pub fn executor_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/poll-jobs/", get(poll_jobs))
        .route("/jobs/:id/claim", post(claim_job))
        .route("/jobs/:id/analysis", post(submit_analysis))
        .route("/retry-failed/:id", post(retry_failed))
        .route("/complete-job/:id", post(complete_job))
}

async fn poll_jobs(State(state): State<AppStateArc>) -> Json<PollResponse> {
    Json(state.jobs.poll_ready())
}

async fn claim_job(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
    body: Result<Json<ClaimRequest>, JsonRejection>,
) -> ApiResult<ClaimResponse> {
    let Json(req) = body?;
    state.jobs.claim(&id, req.stage)?;
    Ok(Json(ClaimResponse {
        status: "claimed".to_string(),
        stage: req.stage,
    }))
}

async fn submit_analysis(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
    body: Result<Json<ModelAnalysis>, JsonRejection>,
) -> ApiResult<AnalysisResponse> {
    let Json(analysis) = body?;
    let refined_operations = state.jobs.submit_model_analysis(&id, analysis).await?;
    Ok(Json(AnalysisResponse {
        status: "ready_for_execution".to_string(),
        refined_operations,
    }))
}

async fn retry_failed(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
    body: Result<Json<ExecutionReport>, JsonRejection>,
) -> ApiResult<RetryResponse> {
    let Json(report) = body?;
    let retry_operations = state
        .jobs
        .report_execution(&id, report.execution_results)
        .await?;
    Ok(Json(RetryResponse {
        count: retry_operations.len(),
        retry_operations,
    }))
}

async fn complete_job(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult<CompleteResponse> {
    let form = read_form(multipart).await?;
    let file = form
        .file
        .ok_or_else(|| JobError::BadRequest("missing 'file' field".to_string()))?;
    state.jobs.complete(&id, file, form.summary).await?;
    Ok(Json(CompleteResponse {
        status: "completed".to_string(),
    }))
}
