//! Fire-and-forget execution of export jobs.
//!
//! The create handler hands a job to [`ExportDispatcher::dispatch`] and
//! returns at once. The detached task renders the CV and writes the outcome
//! back into the job store, which is the only thing it shares with the
//! handlers.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

use crate::cv::ExportCvData;
use crate::job::{JobId, JobUpdate};
use crate::renderer::CvRenderer;
use crate::store::SharedJobStore;
use crate::telemetry;

#[derive(Clone)]
pub struct ExportDispatcher {
    store: SharedJobStore,
    renderer: Arc<dyn CvRenderer>,
    permits: Arc<Semaphore>,
    tasks: TaskTracker,
}

impl ExportDispatcher {
    /// `concurrency` bounds how many renders run at once; further jobs stay
    /// `pending` until a slot frees up.
    pub fn new(store: SharedJobStore, renderer: Arc<dyn CvRenderer>, concurrency: usize) -> Self {
        Self {
            store,
            renderer,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            tasks: TaskTracker::new(),
        }
    }

    /// Spawns the render for `job_id` and returns without waiting for it.
    pub fn dispatch(&self, job_id: JobId, input: ExportCvData) {
        let store = self.store.clone();
        let renderer = self.renderer.clone();
        let permits = self.permits.clone();

        self.tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                error!(job_id = %job_id, "Dispatcher closed before job could start");
                return;
            };
            process_job(&job_id, &input, &store, renderer.as_ref()).await;
        });
    }

    /// Number of dispatched jobs that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Stops accepting work and waits for in-flight renders to finish.
    pub async fn shutdown(&self) {
        self.tasks.close();
        info!(in_flight = self.tasks.len(), "Waiting for export jobs to finish");
        self.tasks.wait().await;
    }
}

/// Processes a single CV export job.
///
/// 1. Mark job as processing
/// 2. Render the CV
/// 3. Mark job as completed or failed
/// 4. Record telemetry
///
/// Store failures are logged, not propagated.
async fn process_job(
    job_id: &JobId,
    input: &ExportCvData,
    store: &SharedJobStore,
    renderer: &dyn CvRenderer,
) {
    info!(job_id = %job_id, "Processing export job");

    match store.update(job_id, JobUpdate::Processing).await {
        Ok(true) => {}
        Ok(false) => {
            info!(job_id = %job_id, "Export job gone before rendering, skipping");
            return;
        }
        Err(e) => error!(job_id = %job_id, "Failed to update job status: {}", e),
    }

    let update = match renderer.render(input).await {
        Ok(file_url) => JobUpdate::Completed { file_url },
        Err(e) => {
            error!(job_id = %job_id, kind = %e.kind, "Export job failed: {}", e.message);
            JobUpdate::Failed {
                error: e.message,
                kind: e.kind,
            }
        }
    };

    if let Err(e) = store.update(job_id, update).await {
        error!(job_id = %job_id, "Failed to update job status: {}", e);
        return;
    }

    match store.get(job_id).await {
        Ok(Some(job)) => telemetry::record_job_telemetry(&job),
        Ok(None) => {}
        Err(e) => error!(job_id = %job_id, "Failed to read finished job: {}", e),
    }
}
