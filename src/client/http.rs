//! [`ExportApi`] over reqwest.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{ApiError, ExportApi};
use crate::api::models::{CreateExportResponse, ErrorBody, JobStatusResponse};
use crate::cv::ExportCvData;
use crate::job::JobId;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`ExportApi`] over HTTP.
#[derive(Clone)]
pub struct HttpExportApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpExportApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ExportApi for HttpExportApi {
    async fn create_job(&self, input: &ExportCvData) -> Result<JobId, ApiError> {
        let url = format!("{}/export-pdf", self.base_url);
        let resp = self.client.post(&url).json(input).send().await?;

        let created: CreateExportResponse = read_json(resp).await?;
        tracing::debug!(job_id = %created.job_id, "Export job created");
        Ok(created.job_id)
    }

    async fn job_status(&self, job_id: &JobId) -> Result<JobStatusResponse, ApiError> {
        let url = format!("{}/export-pdf/job/{}", self.base_url, job_id);
        let resp = self.client.get(&url).send().await?;
        read_json(resp).await
    }
}

/// Decodes a success body, or maps the status code onto [`ApiError`].
pub(crate) async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or(body);

    Err(match status {
        StatusCode::NOT_FOUND => ApiError::NotFound,
        s if s.is_server_error() => ApiError::Server {
            status: s.as_u16(),
            message,
        },
        s => ApiError::Rejected {
            status: s.as_u16(),
            message,
        },
    })
}
