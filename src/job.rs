//! Export job model and state transitions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::renderer::RenderErrorKind;

/// Opaque export job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A status change written back by the worker.
///
/// Each variant carries exactly the result field its status allows, so a
/// completed job can never hold an error and a failed job never a file URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobUpdate {
    Processing,
    Completed { file_url: String },
    Failed { error: String, kind: RenderErrorKind },
}

/// CV export job as held by the job store and reported on poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<RenderErrorKind>,
}

impl ExportJob {
    pub fn new() -> Self {
        Self::created_at(Utc::now())
    }

    pub fn created_at(now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::generate(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            file_url: None,
            error: None,
            error_kind: None,
        }
    }

    /// Applies a worker update. Terminal jobs are left untouched and `false`
    /// is returned.
    pub fn apply(&mut self, update: JobUpdate) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        match update {
            JobUpdate::Processing => {
                self.status = JobStatus::Processing;
            }
            JobUpdate::Completed { file_url } => {
                self.status = JobStatus::Completed;
                self.file_url = Some(file_url);
                self.error = None;
                self.error_kind = None;
            }
            JobUpdate::Failed { error, kind } => {
                self.status = JobStatus::Failed;
                self.file_url = None;
                self.error = Some(error);
                self.error_kind = Some(kind);
            }
        }
        self.updated_at = Utc::now();
        true
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.created_at)
    }

    /// Time left before the job must be swept, measured from creation.
    pub fn remaining_ttl(&self, ttl: std::time::Duration, now: DateTime<Utc>) -> std::time::Duration {
        let age = self.age(now).to_std().unwrap_or_default();
        ttl.saturating_sub(age)
    }

    pub fn processing_duration_ms(&self) -> Option<i64> {
        if self.status.is_terminal() {
            Some(self.updated_at.signed_duration_since(self.created_at).num_milliseconds())
        } else {
            None
        }
    }
}

impl Default for ExportJob {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[test]
    fn test_new_job_is_pending_without_results() {
        let job = ExportJob::new();

        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.file_url.is_none());
        assert!(job.error.is_none());
        assert!(job.processing_duration_ms().is_none());
    }

    #[test]
    fn test_completed_clears_error() {
        let mut job = ExportJob::new();
        assert!(job.apply(JobUpdate::Processing));
        assert!(job.apply(JobUpdate::Completed {
            file_url: "http://localhost/files/cv.pdf".into(),
        }));

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.file_url.as_deref(), Some("http://localhost/files/cv.pdf"));
        assert!(job.error.is_none());
        assert!(job.error_kind.is_none());
        assert!(job.processing_duration_ms().is_some());
    }

    #[test]
    fn test_terminal_status_is_sticky() {
        let mut job = ExportJob::new();
        job.apply(JobUpdate::Failed {
            error: "renderer crashed".into(),
            kind: RenderErrorKind::Internal,
        });

        let applied = job.apply(JobUpdate::Completed {
            file_url: "http://localhost/files/late.pdf".into(),
        });

        assert!(!applied);
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.file_url.is_none());
        assert_eq!(job.error_kind, Some(RenderErrorKind::Internal));
    }

    #[test]
    fn test_expiry_measured_from_creation() {
        let created = Utc::now();
        let job = ExportJob::created_at(created);
        let ttl = StdDuration::from_secs(600);

        assert!(!job.remaining_ttl(ttl, created + Duration::seconds(599)).is_zero());
        assert!(job.remaining_ttl(ttl, created + Duration::seconds(600)).is_zero());
        assert!(job.remaining_ttl(ttl, created + Duration::seconds(900)).is_zero());
        assert_eq!(
            job.remaining_ttl(ttl, created + Duration::seconds(100)),
            StdDuration::from_secs(500)
        );
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let mut job = ExportJob::new();
        job.apply(JobUpdate::Completed {
            file_url: "http://x/files/a.pdf".into(),
        });

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["fileUrl"], "http://x/files/a.pdf");
        assert!(value.get("error").is_none());
        assert!(value.get("createdAt").is_some());
    }
}
