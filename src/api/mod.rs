//! HTTP routes of the export service.
//!
//! Handlers share nothing but the job store and the dispatcher; every error
//! leaves as a JSON body carrying its [`ErrorKind`].

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::path::Path as FsPath;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info};

use crate::cv::ExportCvData;
use crate::dispatch::ExportDispatcher;
use crate::error::ErrorKind;
use crate::job::{JobId, JobStatus};
use crate::store::{SharedJobStore, StoreError};

pub mod models;

use models::{CreateExportResponse, ErrorBody, HealthResponse, JobStatusResponse};

#[derive(Clone)]
pub struct ApiState {
    pub store: SharedJobStore,
    pub dispatcher: ExportDispatcher,
}

/// Builds the export routes. Rendered PDFs are served from `files_dir`.
pub fn router(state: ApiState, files_dir: &FsPath) -> Router {
    Router::new()
        .route("/export-pdf", post(create_export))
        .route("/export-pdf/job/:job_id", get(job_status))
        .route("/health", get(health))
        .nest_service("/files", ServeDir::new(files_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error response with a classified JSON body.
#[derive(Debug)]
pub struct HandlerError {
    status: StatusCode,
    body: ErrorBody,
}

impl HandlerError {
    fn new(status: StatusCode, kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.into(),
                kind,
            },
        }
    }
}

impl From<StoreError> for HandlerError {
    fn from(e: StoreError) -> Self {
        error!("Job store error: {}", e);
        HandlerError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Internal,
            format!("internal error: {e}"),
        )
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub async fn create_export(
    State(state): State<ApiState>,
    Json(input): Json<ExportCvData>,
) -> Result<(StatusCode, Json<CreateExportResponse>), HandlerError> {
    input
        .validate()
        .map_err(|e| HandlerError::new(StatusCode::BAD_REQUEST, ErrorKind::Input, e.to_string()))?;

    let job_id = state.store.create().await?;
    state.dispatcher.dispatch(job_id.clone(), input);
    info!(job_id = %job_id, "Accepted CV export");

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateExportResponse {
            job_id,
            status: JobStatus::Pending,
        }),
    ))
}

pub async fn job_status(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, HandlerError> {
    let job_id = JobId::from(job_id);
    match state.store.get(&job_id).await? {
        Some(job) => Ok(Json(job.into())),
        None => Err(HandlerError::new(
            StatusCode::NOT_FOUND,
            ErrorKind::NotFound,
            "job not found",
        )),
    }
}

pub async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        store: state.store.backend(),
        in_flight: state.dispatcher.in_flight(),
    })
}
