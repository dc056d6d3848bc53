//! Process-wide export job registry.
//!
//! Route handlers are stateless; the store is what connects the handler that
//! created a job, the worker that finishes it and every later poll. One
//! instance is built at startup and shared as [`SharedJobStore`].
//!
//! Jobs live for a fixed TTL counted from creation, whatever their status.
//! Nothing is durable: a restart loses every job, which callers observe as
//! "not found".

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::job::{ExportJob, JobId, JobUpdate};
use crate::telemetry;

pub mod memory;
pub mod redis;

pub use self::memory::MemoryJobStore;
pub use self::redis::RedisJobStore;

/// Default lifetime of a job, counted from creation.
pub const DEFAULT_JOB_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job store backend error: {0}")]
    Backend(String),

    #[error("corrupt job record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl From<::redis::RedisError> for StoreError {
    fn from(e: ::redis::RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Allocates a `pending` job and starts its expiry clock.
    async fn create(&self) -> Result<JobId, StoreError>;

    /// Read-only lookup. Expired jobs are reported as absent.
    async fn get(&self, id: &JobId) -> Result<Option<ExportJob>, StoreError>;

    /// Applies a worker update. Returns `false`, after logging, when the job
    /// has already been swept or is terminal.
    async fn update(&self, id: &JobId, update: JobUpdate) -> Result<bool, StoreError>;

    /// Drops every job older than the TTL. Returns how many were removed.
    async fn sweep(&self) -> Result<usize, StoreError>;

    fn backend(&self) -> &'static str;
}

pub type SharedJobStore = Arc<dyn JobStore>;

/// Runs [`JobStore::sweep`] every `every` until `shutdown` fires.
pub fn spawn_sweeper(
    store: SharedJobStore,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            backend = store.backend(),
            interval_secs = every.as_secs(),
            "Job sweeper started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match store.sweep().await {
                Ok(0) => debug!("Sweep found no expired jobs"),
                Ok(removed) => {
                    info!(removed, "Swept expired export jobs");
                    telemetry::record_sweep(removed);
                }
                Err(e) => error!("Job sweep failed: {}", e),
            }
        }

        info!("Job sweeper stopped");
    })
}
