//! Producer-side client for enqueueing jobs.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{SharedClock, SystemClock};
use crate::error::{Result, TaskqError};
use crate::job::{Job, JobId, JobStats, NewJob};
use crate::store::{JobStore, SharedStore};

/// Client for enqueueing jobs and querying their status.
#[derive(Clone)]
pub struct Client {
    store: SharedStore,
    clock: SharedClock,
}

impl Client {
    /// Create a new client over a shared store.
    pub fn new(store: SharedStore) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Create a client that timestamps jobs with `clock`.
    pub fn with_clock(store: SharedStore, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// Enqueue a job for immediate processing.
    pub async fn enqueue(
        &self,
        job_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<JobId> {
        self.enqueue_with(NewJob::new(job_type, payload)).await
    }

    /// Enqueue a pre-built job.
    ///
    /// The job is validated before anything is written; validation errors
    /// are never retried.
    pub async fn enqueue_with(&self, job: NewJob) -> Result<JobId> {
        job.validate()?;

        let job = self.store.create(job.into_job(self.clock.now())).await?;

        tracing::debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            scheduled_at = job.scheduled_at,
            "Job enqueued"
        );
        Ok(job.id)
    }

    /// Enqueue a job that becomes claimable after `delay`.
    ///
    /// Delays past the end of the timestamp range are rejected; large ones
    /// saturate at the latest representable time.
    pub async fn schedule(
        &self,
        job_type: impl Into<String>,
        payload: serde_json::Value,
        delay: Duration,
    ) -> Result<JobId> {
        let delay = i64::try_from(delay.as_secs())
            .map_err(|_| TaskqError::Validation(format!("delay {:?} is too large", delay)))?;
        let run_at = self.clock.now().saturating_add(delay);
        self.enqueue_with(NewJob::new(job_type, payload).run_at(run_at))
            .await
    }

    /// Look up a job. Unknown identifiers yield `TaskqError::JobNotFound`.
    pub async fn status(&self, id: &JobId) -> Result<Job> {
        self.store.get(id).await
    }

    /// Count jobs per status.
    pub async fn stats(&self) -> Result<JobStats> {
        self.store.stats().await
    }
}
