//! Error types for the taskq job queue.

use thiserror::Error;

use crate::job::JobStatus;

/// The main error type for taskq.
#[derive(Error, Debug)]
pub enum TaskqError {
    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Caller supplied input that can never succeed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Job not found.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// The job exists but its status does not allow the requested change.
    #[error("Invalid transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },

    /// No credential matches the presented fingerprint.
    #[error("Credential not found")]
    CredentialNotFound,

    /// A store round-trip exceeded its deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Backend-specific error.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl TaskqError {
    /// Infrastructure failures the worker loop retries through its backoff
    /// instead of charging them to a job.
    pub fn is_transient(&self) -> bool {
        matches!(self, TaskqError::Backend(_) | TaskqError::Timeout(_))
    }

    /// Whether this is one of the "unknown identifier" outcomes.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TaskqError::JobNotFound(_) | TaskqError::CredentialNotFound
        )
    }
}

/// Result type alias using TaskqError.
pub type Result<T> = std::result::Result<T, TaskqError>;
