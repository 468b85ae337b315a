//! The worker loop: claim, dispatch, finalize.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{current_timestamp, SharedClock, SystemClock};
use crate::config::WorkerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{Result, TaskqError};
use crate::job::{Job, JobId};
use crate::retry::Finalization;
use crate::store::{JobStore, SharedStore};

/// How a claimed job was finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Handler succeeded.
    Completed,
    /// Handler failed retryably; the job is `pending` again.
    Requeued { scheduled_at: i64 },
    /// Handler failed terminally or ran out of attempts.
    Failed,
}

/// Result of one loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A job was claimed and run.
    Processed { job_id: JobId, outcome: Outcome },
    /// The store had no eligible job.
    Idle,
    /// The claim failed or timed out.
    StoreError(String),
}

impl Step {
    /// Sleep this step calls for before the next claim.
    pub fn backoff(&self, config: &WorkerConfig) -> Option<Duration> {
        match self {
            Step::Processed { .. } => None,
            Step::Idle => Some(config.idle_backoff),
            Step::StoreError(_) => Some(config.error_backoff),
        }
    }
}

/// Generate a worker id of the form `host-pid-timestamp`.
pub fn generate_worker_id() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let pid = std::process::id();
    format!("{}-{}-{}", host, pid, current_timestamp())
}

/// Single logical control loop processing one job at a time.
///
/// Exclusivity across processes comes entirely from the store's atomic
/// claim; nothing here coordinates with other workers.
pub struct Worker {
    id: String,
    store: SharedStore,
    dispatcher: Arc<Dispatcher>,
    clock: SharedClock,
    config: WorkerConfig,
}

impl Worker {
    /// Create a worker with the default configuration.
    pub fn new(store: SharedStore, dispatcher: Dispatcher) -> Self {
        Self::with_config(store, dispatcher, WorkerConfig::default())
    }

    /// Create a worker with a custom configuration.
    pub fn with_config(store: SharedStore, dispatcher: Dispatcher, config: WorkerConfig) -> Self {
        let id = if config.worker_id.is_empty() {
            generate_worker_id()
        } else {
            config.worker_id.clone()
        };
        Self {
            id,
            store,
            dispatcher: Arc::new(dispatcher),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replace the clock used for timestamps and backoff sleeps.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Get the worker ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run until Ctrl+C.
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
    }

    /// Run until `shutdown` resolves.
    ///
    /// Shutdown is observed between iterations and during backoff sleeps, never
    /// while a job is being processed, so a claimed job is always finalized.
    pub async fn run_until<S>(&self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        tracing::info!(
            worker_id = %self.id,
            job_types = ?self.dispatcher.job_types(),
            "Worker started"
        );

        loop {
            let step = self.step().await;

            match step.backoff(&self.config) {
                Some(delay) => {
                    tracing::debug!(worker_id = %self.id, delay_ms = delay.as_millis() as u64, "Backing off");
                    tokio::select! {
                        biased;
                        _ = &mut shutdown => break,
                        _ = self.clock.sleep(delay) => {}
                    }
                }
                None => {
                    tokio::select! {
                        biased;
                        _ = &mut shutdown => break,
                        _ = std::future::ready(()) => {}
                    }
                }
            }
        }

        tracing::info!(worker_id = %self.id, "Worker stopped");
        Ok(())
    }

    /// Perform exactly one iteration without sleeping.
    pub async fn step(&self) -> Step {
        let job = match tokio::time::timeout(self.config.claim_timeout, self.store.claim_next())
            .await
        {
            Ok(Ok(Some(job))) => job,
            Ok(Ok(None)) => {
                tracing::debug!(worker_id = %self.id, "No eligible job");
                return Step::Idle;
            }
            Ok(Err(e)) => {
                tracing::error!(worker_id = %self.id, error = %e, "Failed to claim job");
                return Step::StoreError(e.to_string());
            }
            Err(_) => {
                let e = TaskqError::Timeout(format!(
                    "claim exceeded {}ms",
                    self.config.claim_timeout.as_millis()
                ));
                tracing::error!(worker_id = %self.id, error = %e, "Failed to claim job");
                return Step::StoreError(e.to_string());
            }
        };

        let job_id = job.id.clone();
        let outcome = self.process(job).await;
        Step::Processed { job_id, outcome }
    }

    async fn process(&self, job: Job) -> Outcome {
        tracing::debug!(
            worker_id = %self.id,
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = job.attempts,
            "Processing job"
        );

        let err = match self.dispatcher.dispatch(&job).await {
            Ok(()) => {
                self.write(&job.id, "complete", self.store.mark_completed(&job.id))
                    .await;
                tracing::info!(worker_id = %self.id, job_id = %job.id, "Job completed");
                return Outcome::Completed;
            }
            Err(err) => err,
        };

        let message = err.to_string();
        let now = self.clock.now();

        match self.config.retry.decide(&job, err.is_retryable(), now) {
            Finalization::Requeue { scheduled_at } => {
                self.write(
                    &job.id,
                    "requeue",
                    self.store
                        .requeue(&job.id, job.attempts, &message, scheduled_at),
                )
                .await;
                tracing::info!(
                    worker_id = %self.id,
                    job_id = %job.id,
                    attempt = job.attempts,
                    max_attempts = job.max_attempts,
                    retry_at = scheduled_at,
                    error = %message,
                    "Job scheduled for retry"
                );
                Outcome::Requeued { scheduled_at }
            }
            Finalization::Fail { scheduled_at } => {
                self.write(
                    &job.id,
                    "fail",
                    self.store
                        .mark_failed(&job.id, job.attempts, &message, scheduled_at),
                )
                .await;
                tracing::warn!(
                    worker_id = %self.id,
                    job_id = %job.id,
                    job_type = %job.job_type,
                    attempts = job.attempts,
                    error = %message,
                    "Job failed"
                );
                Outcome::Failed
            }
        }
    }

    /// Bound a status write by the write timeout. Failures are logged only:
    /// the job has already left `pending`, so the next claim is unaffected.
    async fn write<F>(&self, job_id: &JobId, op: &'static str, fut: F)
    where
        F: Future<Output = Result<()>>,
    {
        let result = match tokio::time::timeout(self.config.write_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(TaskqError::Timeout(format!(
                "{} exceeded {}ms",
                op,
                self.config.write_timeout.as_millis()
            ))),
        };

        if let Err(e) = result {
            tracing::warn!(
                worker_id = %self.id,
                job_id = %job_id,
                op,
                error = %e,
                "Failed to record job status"
            );
        }
    }
}
