//! Redis-backed job store.

use ::redis::{aio::ConnectionManager, AsyncCommands};
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{JobStore, StoreError};
use crate::job::{ExportJob, JobId, JobUpdate};

/// Status key prefix for job records.
const JOB_KEY_PREFIX: &str = "cv-export:job";

/// Job store that keeps each job as a JSON status key with an expiry.
///
/// Redis enforces the TTL itself. Every write sets the expiry to the time
/// left since creation, so updates never extend a job's life.
#[derive(Clone)]
pub struct RedisJobStore {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisJobStore {
    pub fn new(conn: ConnectionManager, ttl: Duration) -> Self {
        Self { conn, ttl }
    }

    /// Connects to `redis_url` and wraps the connection manager.
    pub async fn connect(redis_url: &str, ttl: Duration) -> Result<Self, StoreError> {
        let client = ::redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn, ttl))
    }

    fn key(id: &JobId) -> String {
        format!("{}:{}", JOB_KEY_PREFIX, id)
    }

    async fn write(&self, job: &ExportJob, expire_secs: u64) -> Result<(), StoreError> {
        let job_json = serde_json::to_string(job)?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(Self::key(&job.id), &job_json, expire_secs)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn create(&self) -> Result<JobId, StoreError> {
        let job = ExportJob::new();
        self.write(&job, self.ttl.as_secs().max(1)).await?;
        debug!(job_id = %job.id, "Created export job");
        Ok(job.id)
    }

    async fn get(&self, id: &JobId) -> Result<Option<ExportJob>, StoreError> {
        let mut conn = self.conn.clone();
        let job_json: Option<String> = conn.get(Self::key(id)).await?;

        match job_json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, id: &JobId, update: JobUpdate) -> Result<bool, StoreError> {
        let Some(mut job) = self.get(id).await? else {
            warn!(job_id = %id, "Dropping update for expired or unknown export job");
            return Ok(false);
        };

        if !job.apply(update) {
            warn!(job_id = %id, status = %job.status, "Ignoring update for finished export job");
            return Ok(false);
        }

        let remaining = job.remaining_ttl(self.ttl, Utc::now()).as_secs();
        if remaining == 0 {
            warn!(job_id = %id, "Export job expired before update could be written");
            return Ok(false);
        }

        // GET then SETEX is not atomic. Only the job's own worker writes to
        // it, so there is no competing writer to lose an update to.
        self.write(&job, remaining).await?;
        debug!(job_id = %id, status = %job.status, "Updated export job");
        Ok(true)
    }

    async fn sweep(&self) -> Result<usize, StoreError> {
        Ok(0)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
