//! Client side of the export pipeline: talks to the export routes and drives
//! one export from submission to a downloadable file.

use async_trait::async_trait;

use crate::api::models::JobStatusResponse;
use crate::cv::ExportCvData;
use crate::job::JobId;

pub mod backoff;
pub mod driver;
pub mod http;

pub use backoff::BackoffConfig;
pub use driver::{DriverConfig, DriverOutcome, DriverState, ExportDriver};
pub use http::HttpExportApi;

/// Failure of a single call to the export service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// No response was obtained (connection refused, reset, timed out).
    #[error("transport error: {0}")]
    Transport(String),

    /// The service refused the request as invalid.
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("not found")]
    NotFound,

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// A response arrived but could not be understood.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Errors worth retrying: the request may well succeed if sent again.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transport(_) | ApiError::Server { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// The two export routes as seen from a client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExportApi: Send + Sync {
    async fn create_job(&self, input: &ExportCvData) -> Result<JobId, ApiError>;

    async fn job_status(&self, job_id: &JobId) -> Result<JobStatusResponse, ApiError>;
}
