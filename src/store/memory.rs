//! In-process job store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{JobStore, StoreError};
use crate::job::{ExportJob, JobId, JobUpdate};

struct Entry {
    job: ExportJob,
    expires_at: Instant,
}

struct Inner {
    jobs: RwLock<HashMap<JobId, Entry>>,
    ttl: Duration,
}

impl Inner {
    async fn remove_if_expired(&self, id: &JobId) -> bool {
        let mut jobs = self.jobs.write().await;
        match jobs.get(id) {
            Some(entry) if entry.expires_at <= Instant::now() => {
                jobs.remove(id);
                true
            }
            _ => false,
        }
    }
}

/// Job store backed by a map in this process.
///
/// Each job gets its own expiry timer at creation; `get` also hides jobs whose
/// deadline has passed, and `sweep` catches anything a timer missed.
#[derive(Clone)]
pub struct MemoryJobStore {
    inner: Arc<Inner>,
}

impl MemoryJobStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                jobs: RwLock::new(HashMap::new()),
                ttl,
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    pub async fn len(&self) -> usize {
        self.inner.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self) -> Result<JobId, StoreError> {
        let job = ExportJob::new();
        let id = job.id.clone();
        let expires_at = Instant::now() + self.inner.ttl;

        self.inner
            .jobs
            .write()
            .await
            .insert(id.clone(), Entry { job, expires_at });

        let inner = Arc::downgrade(&self.inner);
        let timer_id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            if let Some(inner) = inner.upgrade() {
                if inner.remove_if_expired(&timer_id).await {
                    debug!(job_id = %timer_id, "Export job expired");
                }
            }
        });

        debug!(job_id = %id, "Created export job");
        Ok(id)
    }

    async fn get(&self, id: &JobId) -> Result<Option<ExportJob>, StoreError> {
        let jobs = self.inner.jobs.read().await;
        Ok(jobs
            .get(id)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.job.clone()))
    }

    async fn update(&self, id: &JobId, update: JobUpdate) -> Result<bool, StoreError> {
        let mut jobs = self.inner.jobs.write().await;
        let Some(entry) = jobs
            .get_mut(id)
            .filter(|entry| entry.expires_at > Instant::now())
        else {
            warn!(job_id = %id, "Dropping update for expired or unknown export job");
            return Ok(false);
        };

        if !entry.job.apply(update) {
            warn!(job_id = %id, status = %entry.job.status, "Ignoring update for finished export job");
            return Ok(false);
        }

        debug!(job_id = %id, status = %entry.job.status, "Updated export job");
        Ok(true)
    }

    async fn sweep(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let mut jobs = self.inner.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, entry| entry.expires_at > now);
        Ok(before - jobs.len())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
