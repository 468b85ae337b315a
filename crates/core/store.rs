//! Storage abstraction for jobs.
//!
//! The queue only relies on the operations below. The load-bearing one is
//! [`JobStore::claim_next`]: implementations must pick and transition a job in
//! a single atomic step so that concurrent workers, in this process or in
//! others, never receive the same job.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{Result, TaskqError};
use crate::job::{Job, JobId, JobStats};

/// Check that a namespace is safe to splice into table names.
///
/// SQL stores prefix their tables with the namespace (`{ns}_jobs`), so only
/// ASCII letters, digits and underscores are accepted, starting with a letter.
pub fn validate_namespace(namespace: &str) -> Result<()> {
    let mut chars = namespace.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(TaskqError::Config(format!(
            "invalid namespace {:?}: use letters, digits and underscores",
            namespace
        )))
    }
}

/// Storage operations needed by producers, workers and status queries.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new `pending` job. The identifier is already populated.
    async fn create(&self, job: Job) -> Result<Job>;

    /// Atomically claim the next eligible job.
    ///
    /// Selects one `pending` job with `scheduled_at <= now`, oldest first,
    /// marks it `processing`, increments `attempts`, and returns it.
    /// Returns `None` when nothing is eligible; that is not an error.
    async fn claim_next(&self) -> Result<Option<Job>>;

    /// Point lookup. Unknown identifiers yield `TaskqError::JobNotFound`.
    async fn get(&self, id: &JobId) -> Result<Job>;

    // The three finalizers below only apply to `processing` jobs. Any other
    // status yields `TaskqError::InvalidTransition` and leaves the row as is.

    /// Record a terminal failure.
    async fn mark_failed(
        &self,
        id: &JobId,
        attempts: u32,
        error_message: &str,
        scheduled_at: i64,
    ) -> Result<()>;

    /// Record a success.
    async fn mark_completed(&self, id: &JobId) -> Result<()>;

    /// Send a failed attempt back to `pending`, claimable from `scheduled_at`.
    async fn requeue(
        &self,
        id: &JobId,
        attempts: u32,
        error_message: &str,
        scheduled_at: i64,
    ) -> Result<()>;

    /// Count jobs per status.
    async fn stats(&self) -> Result<JobStats>;
}

/// A type-erased store that can be shared across threads.
pub type DynStore = Arc<dyn JobStore>;

/// Wrapper around Arc<dyn JobStore> for convenience.
#[derive(Clone)]
pub struct SharedStore {
    inner: DynStore,
}

impl SharedStore {
    /// Create a new SharedStore from any JobStore implementation.
    pub fn new<S: JobStore + 'static>(store: S) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wrap a store that is already behind an `Arc`.
    pub fn from_arc(inner: DynStore) -> Self {
        Self { inner }
    }

    /// Get a reference to the inner store.
    pub fn inner(&self) -> &DynStore {
        &self.inner
    }
}

#[async_trait]
impl JobStore for SharedStore {
    async fn create(&self, job: Job) -> Result<Job> {
        self.inner.create(job).await
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        self.inner.claim_next().await
    }

    async fn get(&self, id: &JobId) -> Result<Job> {
        self.inner.get(id).await
    }

    async fn mark_failed(
        &self,
        id: &JobId,
        attempts: u32,
        error_message: &str,
        scheduled_at: i64,
    ) -> Result<()> {
        self.inner
            .mark_failed(id, attempts, error_message, scheduled_at)
            .await
    }

    async fn mark_completed(&self, id: &JobId) -> Result<()> {
        self.inner.mark_completed(id).await
    }

    async fn requeue(
        &self,
        id: &JobId,
        attempts: u32,
        error_message: &str,
        scheduled_at: i64,
    ) -> Result<()> {
        self.inner
            .requeue(id, attempts, error_message, scheduled_at)
            .await
    }

    async fn stats(&self) -> Result<JobStats> {
        self.inner.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_namespace() {
        assert!(validate_namespace("taskq").is_ok());
        assert!(validate_namespace("app_v2").is_ok());
        assert!(validate_namespace("").is_err());
        assert!(validate_namespace("1app").is_err());
        assert!(validate_namespace("app; DROP TABLE x").is_err());
        assert!(validate_namespace("app-prod").is_err());
    }
}
