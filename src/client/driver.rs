//! Drives one CV export: submit, poll, classify.
//!
//! ```text
//! Idle -> Submitting -> Polling -> Succeeded | Failed | TimedOut
//!                 \__________\______________> Cancelled
//! ```
//!
//! Only submission is retried with backoff. Polling runs on a fixed cadence;
//! a transport error while polling costs one attempt and polling goes on.

use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::backoff::{self, BackoffConfig};
use super::{ApiError, ExportApi};
use crate::api::models::JobStatusResponse;
use crate::cv::ExportCvData;
use crate::error::{ErrorKind, ExportError};
use crate::job::{JobId, JobStatus};
use crate::poll::{poll_until_terminal, PollConfig, PollOutcome, PollStep};
use crate::renderer::RenderErrorKind;

/// Poll cadence of the export driver.
pub const EXPORT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const EXPORT_POLL_MAX_ATTEMPTS: u32 = 60;
/// Kept well under the job TTL so a job cannot be swept while a client still
/// waits on it.
pub const EXPORT_POLL_BUDGET: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverConfig {
    pub submit_max_attempts: u32,
    pub backoff: BackoffConfig,
    pub poll: PollConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            submit_max_attempts: 3,
            backoff: BackoffConfig::default(),
            poll: PollConfig::new(EXPORT_POLL_INTERVAL, EXPORT_POLL_MAX_ATTEMPTS)
                .with_max_elapsed(EXPORT_POLL_BUDGET),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Submitting { attempt: u32 },
    Polling { job_id: JobId, attempt: u32 },
    Succeeded { file_url: String },
    Failed { error: ExportError },
    TimedOut { attempts: u32 },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverOutcome {
    Succeeded(String),
    /// Every failure is classified; a timeout arrives as [`ErrorKind::TimedOut`].
    Failed(ExportError),
    Cancelled,
}

pub struct ExportDriver<A> {
    api: A,
    config: DriverConfig,
    state: watch::Sender<DriverState>,
}

impl<A: ExportApi> ExportDriver<A> {
    pub fn new(api: A, config: DriverConfig) -> Self {
        let (state, _) = watch::channel(DriverState::Idle);
        Self { api, config, state }
    }

    /// Observes state transitions, e.g. to drive a progress indicator.
    pub fn subscribe(&self) -> watch::Receiver<DriverState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> DriverState {
        self.state.borrow().clone()
    }

    /// Runs the export to completion. After `cancel` fires no further request
    /// is issued and the outcome is [`DriverOutcome::Cancelled`].
    pub async fn run(&self, input: &ExportCvData, cancel: &CancellationToken) -> DriverOutcome {
        let job_id = match self.submit(input, cancel).await {
            Ok(Some(job_id)) => job_id,
            Ok(None) => return self.finish_cancelled(),
            Err(error) => return self.finish_failed(error),
        };
        info!(job_id = %job_id, "Export submitted, polling for completion");

        let outcome = poll_until_terminal(self.config.poll, cancel, |attempt| {
            let job_id = job_id.clone();
            async move {
                self.state.send_replace(DriverState::Polling {
                    job_id: job_id.clone(),
                    attempt: attempt.attempt_number,
                });
                classify_poll(self.api.job_status(&job_id).await)
            }
        })
        .await;

        match outcome {
            PollOutcome::Done(Ok(file_url)) => {
                info!(job_id = %job_id, file_url = %file_url, "Export succeeded");
                self.state.send_replace(DriverState::Succeeded {
                    file_url: file_url.clone(),
                });
                DriverOutcome::Succeeded(file_url)
            }
            PollOutcome::Done(Err(error)) => self.finish_failed(error),
            PollOutcome::TimedOut(last) => {
                warn!(
                    job_id = %job_id,
                    attempts = last.attempt_number,
                    last_status = last.last_status.as_deref().unwrap_or("none"),
                    "Export polling timed out"
                );
                self.state.send_replace(DriverState::TimedOut {
                    attempts: last.attempt_number,
                });
                DriverOutcome::Failed(ExportError::new(
                    ErrorKind::TimedOut,
                    format!(
                        "export not finished after {} status checks",
                        last.attempt_number
                    ),
                ))
            }
            PollOutcome::Cancelled => self.finish_cancelled(),
        }
    }

    /// Creates the job, retrying transient failures with backoff.
    /// `Ok(None)` means the caller cancelled.
    async fn submit(
        &self,
        input: &ExportCvData,
        cancel: &CancellationToken,
    ) -> Result<Option<JobId>, ExportError> {
        let max_attempts = self.config.submit_max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Ok(None);
            }
            self.state.send_replace(DriverState::Submitting { attempt });

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                result = self.api.create_job(input) => result,
            };

            let error = match result {
                Ok(job_id) => return Ok(Some(job_id)),
                Err(e) if e.is_transient() => e,
                Err(ApiError::Rejected { message, .. }) => {
                    return Err(ExportError::new(ErrorKind::Input, message));
                }
                Err(e) => return Err(ExportError::new(ErrorKind::Internal, e.to_string())),
            };

            if attempt >= max_attempts {
                return Err(ExportError::new(
                    ErrorKind::Network,
                    format!("export request failed after {attempt} attempts: {error}"),
                ));
            }

            let delay = backoff::next_delay(attempt, &self.config.backoff, &mut rand::thread_rng());
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Export request failed, retrying: {}",
                error
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn finish_failed(&self, error: ExportError) -> DriverOutcome {
        warn!(kind = %error.kind, "Export failed: {}", error.message);
        self.state.send_replace(DriverState::Failed {
            error: error.clone(),
        });
        DriverOutcome::Failed(error)
    }

    fn finish_cancelled(&self) -> DriverOutcome {
        info!("Export cancelled");
        self.state.send_replace(DriverState::Cancelled);
        DriverOutcome::Cancelled
    }
}

fn classify_poll(
    result: Result<JobStatusResponse, ApiError>,
) -> PollStep<Result<String, ExportError>> {
    match result {
        Ok(resp) => match resp.status {
            JobStatus::Pending | JobStatus::Processing => PollStep::Continue(resp.status.to_string()),
            JobStatus::Completed => match resp.file_url.filter(|url| !url.is_empty()) {
                Some(url) => PollStep::Done(Ok(url)),
                None => PollStep::Done(Err(ExportError::new(
                    ErrorKind::Internal,
                    "job completed without a file URL",
                ))),
            },
            JobStatus::Failed => {
                let kind = match resp.error_kind {
                    Some(RenderErrorKind::Input) => ErrorKind::Input,
                    _ => ErrorKind::Internal,
                };
                let message = resp.error.unwrap_or_else(|| "export failed".to_string());
                PollStep::Done(Err(ExportError::new(kind, message)))
            }
        },
        Err(ApiError::NotFound) => PollStep::Done(Err(ExportError::new(
            ErrorKind::NotFound,
            "export job expired or does not exist",
        ))),
        Err(e) if e.is_transient() => PollStep::Continue(format!("network error: {e}")),
        Err(e) => PollStep::Done(Err(ExportError::new(ErrorKind::Internal, e.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockExportApi;
    use crate::cv::sample_cv;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn status(status: JobStatus) -> JobStatusResponse {
        JobStatusResponse {
            job_id: JobId::from("job-1"),
            status,
            file_url: None,
            error: None,
            error_kind: None,
        }
    }

    fn config(max_attempts: u32) -> DriverConfig {
        DriverConfig {
            submit_max_attempts: 3,
            backoff: BackoffConfig {
                base: Duration::from_millis(500),
                max: Duration::from_secs(8),
                jitter_pct: 0.0,
            },
            poll: PollConfig::new(Duration::from_secs(2), max_attempts),
        }
    }

    fn accepting_api() -> MockExportApi {
        let mut api = MockExportApi::new();
        api.expect_create_job()
            .times(1)
            .returning(|_| Ok(JobId::from("job-1")));
        api
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_within_n_ms_needs_at_most_ceil_plus_one_polls() {
        let render_ms: u64 = 4500;
        let interval = Duration::from_secs(2);
        let started = Instant::now();
        let polls = Arc::new(AtomicU32::new(0));
        let counter = polls.clone();

        let mut api = accepting_api();
        api.expect_job_status().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if started.elapsed() >= Duration::from_millis(render_ms) {
                Ok(JobStatusResponse {
                    file_url: Some("http://x/files/cv.pdf".into()),
                    ..status(JobStatus::Completed)
                })
            } else {
                Ok(status(JobStatus::Processing))
            }
        });

        let driver = ExportDriver::new(api, config(60));
        let outcome = driver.run(&sample_cv(), &CancellationToken::new()).await;

        assert_eq!(outcome, DriverOutcome::Succeeded("http://x/files/cv.pdf".into()));
        let bound = render_ms.div_ceil(interval.as_millis() as u64) as u32 + 1;
        assert!(polls.load(Ordering::SeqCst) <= bound);
        assert_eq!(
            driver.state(),
            DriverState::Succeeded {
                file_url: "http://x/files/cv.pdf".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_completing_job_times_out_at_cap() {
        let mut api = accepting_api();
        api.expect_job_status()
            .times(7)
            .returning(|_| Ok(status(JobStatus::Pending)));

        let driver = ExportDriver::new(api, config(7));
        let outcome = driver.run(&sample_cv(), &CancellationToken::new()).await;

        match outcome {
            DriverOutcome::Failed(e) => {
                assert_eq!(e.kind, ErrorKind::TimedOut);
                assert!(e.is_retryable());
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(driver.state(), DriverState::TimedOut { attempts: 7 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_submit_failures_are_retried_with_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut api = MockExportApi::new();
        api.expect_create_job().times(3).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ApiError::Transport("connection refused".into()))
            } else {
                Ok(JobId::from("job-1"))
            }
        });
        api.expect_job_status().returning(|_| {
            Ok(JobStatusResponse {
                file_url: Some("http://x/files/cv.pdf".into()),
                ..status(JobStatus::Completed)
            })
        });

        let started = Instant::now();
        let driver = ExportDriver::new(api, config(5));
        let outcome = driver.run(&sample_cv(), &CancellationToken::new()).await;

        assert!(matches!(outcome, DriverOutcome::Succeeded(_)));
        // 500ms + 1000ms of backoff, then one 2s poll interval
        assert_eq!(started.elapsed(), Duration::from_millis(3500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_submit_is_network_error() {
        let mut api = MockExportApi::new();
        api.expect_create_job().times(3).returning(|_| {
            Err(ApiError::Server {
                status: 503,
                message: "unavailable".into(),
            })
        });
        api.expect_job_status().never();

        let driver = ExportDriver::new(api, config(5));
        let outcome = driver.run(&sample_cv(), &CancellationToken::new()).await;

        match outcome {
            DriverOutcome::Failed(e) => assert_eq!(e.kind, ErrorKind::Network),
            other => panic!("expected network failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_submit_is_input_error_without_retry() {
        let mut api = MockExportApi::new();
        api.expect_create_job().times(1).returning(|_| {
            Err(ApiError::Rejected {
                status: 400,
                message: "personal.email is required".into(),
            })
        });

        let driver = ExportDriver::new(api, config(5));
        let outcome = driver.run(&sample_cv(), &CancellationToken::new()).await;

        match outcome {
            DriverOutcome::Failed(e) => {
                assert_eq!(e.kind, ErrorKind::Input);
                assert!(!e.is_retryable());
            }
            other => panic!("expected input failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_swept_job_is_not_found() {
        let mut api = accepting_api();
        api.expect_job_status()
            .times(1)
            .returning(|_| Err(ApiError::NotFound));

        let driver = ExportDriver::new(api, config(5));
        let outcome = driver.run(&sample_cv(), &CancellationToken::new()).await;

        match outcome {
            DriverOutcome::Failed(e) => assert_eq!(e.kind, ErrorKind::NotFound),
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_is_classified_by_error_kind() {
        let mut api = accepting_api();
        api.expect_job_status().returning(|_| {
            Ok(JobStatusResponse {
                error: Some("renderer did not finish within 60s".into()),
                error_kind: Some(RenderErrorKind::Timeout),
                ..status(JobStatus::Failed)
            })
        });

        let driver = ExportDriver::new(api, config(5));
        let outcome = driver.run(&sample_cv(), &CancellationToken::new()).await;

        assert_eq!(
            outcome,
            DriverOutcome::Failed(ExportError::new(
                ErrorKind::Internal,
                "renderer did not finish within 60s"
            ))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_transport_errors_keep_polling() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut api = accepting_api();
        api.expect_job_status().times(3).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ApiError::Transport("reset by peer".into()))
            } else {
                Ok(JobStatusResponse {
                    file_url: Some("http://x/files/cv.pdf".into()),
                    ..status(JobStatus::Completed)
                })
            }
        });

        let driver = ExportDriver::new(api, config(5));
        let outcome = driver.run(&sample_cv(), &CancellationToken::new()).await;

        assert!(matches!(outcome, DriverOutcome::Succeeded(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_requests_after_cancellation() {
        let polls = Arc::new(AtomicU32::new(0));
        let counter = polls.clone();
        let mut api = accepting_api();
        api.expect_job_status().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(status(JobStatus::Processing))
        });

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let driver = ExportDriver::new(api, config(60));
        let mut states = driver.subscribe();
        let outcome = driver.run(&sample_cv(), &cancel).await;

        assert_eq!(outcome, DriverOutcome::Cancelled);
        assert_eq!(*states.borrow_and_update(), DriverState::Cancelled);
        assert_eq!(polls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }
}
