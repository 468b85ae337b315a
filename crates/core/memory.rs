//! In-process store for tests and single-process development runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::{SharedClock, SystemClock};
use crate::credential::{Credential, CredentialStore};
use crate::error::{Result, TaskqError};
use crate::job::{Job, JobId, JobStats, JobStatus};
use crate::store::JobStore;

#[derive(Debug)]
struct Entry {
    seq: u64,
    job: Job,
}

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<JobId, Entry>,
    next_seq: u64,
    credentials: HashMap<String, Credential>,
}

/// Mutex-guarded job and credential store.
///
/// Claiming happens entirely under one lock, which is what makes it atomic.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    clock: SharedClock,
}

impl MemoryStore {
    /// Create an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store whose claim eligibility follows `clock`.
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
        }
    }

    /// Number of jobs held, in any status.
    pub fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    /// Whether the store holds no jobs.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().jobs.is_empty()
    }

    /// Move a job to `to`, applying `f` only if the lifecycle allows it.
    fn update<F>(&self, id: &JobId, to: JobStatus, f: F) -> Result<()>
    where
        F: FnOnce(&mut Job),
    {
        let mut inner = self.inner.lock();
        let entry = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| TaskqError::JobNotFound(id.to_string()))?;
        if !entry.job.status.can_transition_to(to) {
            return Err(TaskqError::InvalidTransition {
                id: id.to_string(),
                from: entry.job.status,
                to,
            });
        }
        entry.job.status = to;
        f(&mut entry.job);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create(&self, job: Job) -> Result<Job> {
        let mut inner = self.inner.lock();
        if inner.jobs.contains_key(&job.id) {
            return Err(TaskqError::Validation(format!(
                "job already exists: {}",
                job.id
            )));
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.jobs.insert(
            job.id.clone(),
            Entry {
                seq,
                job: job.clone(),
            },
        );
        Ok(job)
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let next = inner
            .jobs
            .values_mut()
            .filter(|entry| entry.job.is_claimable(now))
            .min_by_key(|entry| (entry.job.scheduled_at, entry.seq));

        Ok(next.map(|entry| {
            entry.job.status = JobStatus::Processing;
            entry.job.attempts += 1;
            entry.job.clone()
        }))
    }

    async fn get(&self, id: &JobId) -> Result<Job> {
        self.inner
            .lock()
            .jobs
            .get(id)
            .map(|entry| entry.job.clone())
            .ok_or_else(|| TaskqError::JobNotFound(id.to_string()))
    }

    async fn mark_failed(
        &self,
        id: &JobId,
        attempts: u32,
        error_message: &str,
        scheduled_at: i64,
    ) -> Result<()> {
        self.update(id, JobStatus::Failed, |job| {
            job.attempts = attempts;
            job.error_message = Some(error_message.to_string());
            job.scheduled_at = scheduled_at;
        })
    }

    async fn mark_completed(&self, id: &JobId) -> Result<()> {
        self.update(id, JobStatus::Completed, |_| {})
    }

    async fn requeue(
        &self,
        id: &JobId,
        attempts: u32,
        error_message: &str,
        scheduled_at: i64,
    ) -> Result<()> {
        self.update(id, JobStatus::Pending, |job| {
            job.attempts = attempts;
            job.error_message = Some(error_message.to_string());
            job.scheduled_at = scheduled_at;
        })
    }

    async fn stats(&self) -> Result<JobStats> {
        let inner = self.inner.lock();
        let mut stats = JobStats::default();
        for entry in inner.jobs.values() {
            match entry.job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn lookup_by_fingerprint(&self, fingerprint: &str) -> Result<Credential> {
        self.inner
            .lock()
            .credentials
            .values()
            .find(|cred| cred.key_hash == fingerprint)
            .cloned()
            .ok_or(TaskqError::CredentialNotFound)
    }

    async fn create_credential(&self, credential: Credential) -> Result<Credential> {
        let mut inner = self.inner.lock();
        if inner
            .credentials
            .values()
            .any(|cred| cred.key_hash == credential.key_hash)
        {
            return Err(TaskqError::Validation(
                "credential fingerprint already registered".to_string(),
            ));
        }
        inner
            .credentials
            .insert(credential.id.clone(), credential.clone());
        Ok(credential)
    }

    async fn list_credentials(&self) -> Result<Vec<Credential>> {
        let mut creds: Vec<Credential> =
            self.inner.lock().credentials.values().cloned().collect();
        creds.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(creds)
    }

    async fn touch_last_used(&self, id: &str, at: i64) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(cred) = inner.credentials.get_mut(id) {
            cred.last_used_at = Some(at);
        }
        Ok(())
    }
}
