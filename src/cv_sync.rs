//! CV sync: hands an uploaded CV file to the external parsing service and
//! waits for the structured result.
//!
//! The service works asynchronously: an upload returns a task id, and the
//! task is polled every 2.5s, 20 times at most, before giving up.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::http::read_json;
use crate::client::ApiError;
use crate::poll::{poll_until_terminal, PollConfig, PollOutcome, PollStep};

pub const CV_SYNC_POLL_INTERVAL: Duration = Duration::from_millis(2500);
pub const CV_SYNC_MAX_ATTEMPTS: u32 = 20;

const SUPPORTED_EXTENSIONS: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("txt", "text/plain"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    #[serde(alias = "queued")]
    Pending,
    #[serde(alias = "running")]
    Processing,
    #[serde(alias = "success", alias = "succeeded")]
    Completed,
    #[serde(alias = "error")]
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Processing => write!(f, "processing"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub task_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub status: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The parsing service's upload and task-status endpoints.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ParsingService: Send + Sync {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, ApiError>;

    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CvSyncErrorKind {
    /// Unsupported or empty file, or rejected by the service.
    Input,
    Network,
    /// The service reported that it could not parse the file.
    Failed,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("CV sync {kind:?}: {message}")]
pub struct CvSyncError {
    pub kind: CvSyncErrorKind,
    pub message: String,
}

impl CvSyncError {
    fn new(kind: CvSyncErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// [`ParsingService`] over HTTP.
#[derive(Clone)]
pub struct HttpParsingService {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpParsingService {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl ParsingService for HttpParsingService {
    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, ApiError> {
        let mime = mime_for(file_name).unwrap_or("application/octet-stream");
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let url = format!("{}/upload", self.base_url);
        let resp = self
            .authorize(self.client.post(&url))
            .multipart(form)
            .send()
            .await?;

        let uploaded: UploadResponse = read_json(resp).await?;
        Ok(uploaded.task_id)
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, ApiError> {
        let url = format!("{}/tasks/{}", self.base_url, task_id);
        let resp = self.authorize(self.client.get(&url)).send().await?;
        read_json(resp).await
    }
}

pub struct CvSync<P> {
    service: P,
    poll: PollConfig,
}

impl<P: ParsingService> CvSync<P> {
    pub fn new(service: P) -> Self {
        Self::with_poll_config(
            service,
            PollConfig::new(CV_SYNC_POLL_INTERVAL, CV_SYNC_MAX_ATTEMPTS),
        )
    }

    pub fn with_poll_config(service: P, poll: PollConfig) -> Self {
        Self { service, poll }
    }

    /// Uploads `bytes` as `file_name` and returns the parsed CV.
    pub async fn sync(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Value, CvSyncError> {
        if mime_for(file_name).is_none() {
            return Err(CvSyncError::new(
                CvSyncErrorKind::Input,
                format!("unsupported file type: {file_name}"),
            ));
        }
        if bytes.is_empty() {
            return Err(CvSyncError::new(CvSyncErrorKind::Input, "file is empty"));
        }
        if cancel.is_cancelled() {
            return Err(CvSyncError::new(CvSyncErrorKind::Cancelled, "cancelled"));
        }

        let task_id = self
            .service
            .upload(file_name, bytes)
            .await
            .map_err(|e| match e {
                ApiError::Rejected { message, .. } => {
                    CvSyncError::new(CvSyncErrorKind::Input, message)
                }
                e => CvSyncError::new(CvSyncErrorKind::Network, e.to_string()),
            })?;
        info!(task_id = %task_id, file_name, "CV uploaded for parsing");

        let outcome = poll_until_terminal(self.poll, cancel, |_| {
            let task_id = task_id.clone();
            async move { classify_task(self.service.task_status(&task_id).await) }
        })
        .await;

        match outcome {
            PollOutcome::Done(result) => result,
            PollOutcome::TimedOut(last) => {
                warn!(task_id = %task_id, attempts = last.attempt_number, "CV parsing timed out");
                Err(CvSyncError::new(
                    CvSyncErrorKind::TimedOut,
                    format!(
                        "parsing not finished after {} checks ({:.1}s)",
                        last.attempt_number,
                        last.elapsed.as_secs_f32()
                    ),
                ))
            }
            PollOutcome::Cancelled => Err(CvSyncError::new(CvSyncErrorKind::Cancelled, "cancelled")),
        }
    }

    /// Reads `path` from disk and syncs it.
    pub async fn sync_file(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Value, CvSyncError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CvSyncError::new(CvSyncErrorKind::Input, "path has no file name"))?
            .to_string();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            CvSyncError::new(
                CvSyncErrorKind::Input,
                format!("cannot read {}: {e}", path.display()),
            )
        })?;
        self.sync(&file_name, bytes, cancel).await
    }
}

fn classify_task(result: Result<TaskStatus, ApiError>) -> PollStep<Result<Value, CvSyncError>> {
    match result {
        Ok(task) => match task.status {
            TaskState::Pending | TaskState::Processing => PollStep::Continue(task.status.to_string()),
            TaskState::Completed => PollStep::Done(task.result.ok_or_else(|| {
                CvSyncError::new(CvSyncErrorKind::Failed, "task completed without a result")
            })),
            TaskState::Failed => PollStep::Done(Err(CvSyncError::new(
                CvSyncErrorKind::Failed,
                task.error.unwrap_or_else(|| "parsing failed".to_string()),
            ))),
        },
        Err(ApiError::NotFound) => PollStep::Done(Err(CvSyncError::new(
            CvSyncErrorKind::Failed,
            "parsing task no longer exists",
        ))),
        Err(e) if e.is_transient() => PollStep::Continue(format!("network error: {e}")),
        Err(e) => PollStep::Done(Err(CvSyncError::new(CvSyncErrorKind::Failed, e.to_string()))),
    }
}

fn mime_for(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    SUPPORTED_EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}
