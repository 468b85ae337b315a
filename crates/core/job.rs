//! Job definition and related types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::TaskqError;

/// Default number of processing attempts a job gets.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Unique identifier for a job.
///
/// Opaque to the queue; the producer path fills it with a random UUID before
/// the job is first persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a new random JobId.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting to be claimed once `scheduled_at` has passed.
    Pending,
    /// Claimed by exactly one worker.
    Processing,
    /// Handler succeeded.
    Completed,
    /// Handler failed and the job will not run again.
    Failed,
}

impl JobStatus {
    /// The lowercase name stored by the SQL backends.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// `Processing -> Pending` is the requeue edge taken for retryable
    /// failures with attempts left.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Pending)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = TaskqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(TaskqError::Backend(format!("Unknown job status: {}", other))),
        }
    }
}

/// A persisted unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,
    /// Tag selecting the handler.
    #[serde(rename = "type")]
    pub job_type: String,
    /// Handler-specific payload.
    pub payload: serde_json::Value,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Processing attempts started so far.
    pub attempts: u32,
    /// Attempt budget fixed at creation.
    pub max_attempts: u32,
    /// Error text from the last failure.
    pub error_message: Option<String>,
    /// Earliest claim time (Unix timestamp in seconds).
    pub scheduled_at: i64,
    /// Creation time (Unix timestamp in seconds).
    pub created_at: i64,
}

impl Job {
    /// Whether a retryable failure may send this job back to `pending`.
    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Whether a claim at `now` may pick this job.
    pub fn is_claimable(&self, now: i64) -> bool {
        self.status == JobStatus::Pending && self.scheduled_at <= now
    }
}

/// A job as submitted by a producer, before it is persisted.
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Identifier assigned up front.
    pub id: JobId,
    /// Tag selecting the handler.
    pub job_type: String,
    /// Handler-specific payload.
    pub payload: serde_json::Value,
    /// Attempt budget.
    pub max_attempts: u32,
    /// Optional earliest claim time; defaults to creation time.
    pub run_at: Option<i64>,
}

impl NewJob {
    /// Create a new job for immediate processing.
    pub fn new(job_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            payload,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            run_at: None,
        }
    }

    /// Set the attempt budget.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay the first claim until `timestamp`.
    pub fn run_at(mut self, timestamp: i64) -> Self {
        self.run_at = Some(timestamp);
        self
    }

    /// Check the invariants a store relies on.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.job_type.trim().is_empty() {
            return Err(TaskqError::Validation("job type cannot be empty".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(TaskqError::Validation(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        let empty = match &self.payload {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            serde_json::Value::String(s) => s.is_empty(),
            _ => false,
        };
        if empty {
            return Err(TaskqError::Validation("payload cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Materialize the pending job a store persists.
    pub fn into_job(self, now: i64) -> Job {
        Job {
            id: self.id,
            job_type: self.job_type,
            payload: self.payload,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: self.max_attempts,
            error_message: None,
            scheduled_at: self.run_at.unwrap_or(now),
            created_at: now,
        }
    }
}

/// Count of jobs per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}
