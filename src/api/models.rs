//! Request and response bodies of the export routes.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::job::{ExportJob, JobId, JobStatus};
use crate::renderer::RenderErrorKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExportResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<RenderErrorKind>,
}

impl From<ExportJob> for JobStatusResponse {
    fn from(job: ExportJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            file_url: job.file_url,
            error: job.error,
            error_kind: job.error_kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
    pub in_flight: usize,
}
