//! Maps job types to handlers.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use crate::job::Job;

/// Result type for job handlers.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Error returned from job handlers.
///
/// Handlers classify their own failures; the classification reaches the
/// worker loop unchanged and drives the requeue decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    /// Error message.
    pub message: String,
    /// Whether another attempt could succeed.
    pub retryable: bool,
}

impl HandlerError {
    /// Create a new retryable error (network or upstream server failure).
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// Create a new terminal error. The job is not attempted again.
    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    /// Terminal error for a payload the handler cannot interpret.
    pub fn invalid_payload(detail: impl fmt::Display) -> Self {
        Self::terminal(format!("invalid payload: {}", detail))
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl<E: std::error::Error> From<E> for HandlerError {
    fn from(err: E) -> Self {
        Self::retryable(err.to_string())
    }
}

/// Deserialize a job payload, mapping failures to a terminal error.
pub fn parse_payload<T: DeserializeOwned>(
    payload: &serde_json::Value,
) -> std::result::Result<T, HandlerError> {
    T::deserialize(payload).map_err(HandlerError::invalid_payload)
}

/// Why a dispatch did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No handler is registered for the job's type.
    #[error("invalid job type: {0}")]
    UnknownType(String),

    /// The handler ran and failed.
    #[error("{0}")]
    Handler(HandlerError),
}

impl DispatchError {
    /// Unknown types are data errors and never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::UnknownType(_) => false,
            DispatchError::Handler(err) => err.retryable,
        }
    }
}

impl From<HandlerError> for DispatchError {
    fn from(err: HandlerError) -> Self {
        DispatchError::Handler(err)
    }
}

/// A handler for one job type.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Process one job payload.
    async fn handle(&self, payload: &serde_json::Value) -> HandlerResult;
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, payload: &serde_json::Value) -> HandlerResult {
        (self.f)(payload.clone()).await
    }
}

/// Capability table from job type to handler.
#[derive(Default, Clone)]
pub struct Dispatcher {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a job type, replacing any previous one.
    pub fn register(
        &mut self,
        job_type: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) -> &mut Self {
        self.handlers.insert(job_type.into(), handler);
        self
    }

    /// Register an async closure as a handler.
    ///
    /// ```ignore
    /// dispatcher.register_fn("noop", |_payload| async { Ok(()) });
    /// ```
    pub fn register_fn<F, Fut>(&mut self, job_type: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(job_type, Arc::new(FnHandler { f }))
    }

    /// Whether a handler exists for `job_type`.
    pub fn handles(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Registered job types, sorted.
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    /// Run the handler registered for the job's type.
    pub async fn dispatch(&self, job: &Job) -> std::result::Result<(), DispatchError> {
        let handler = self
            .handlers
            .get(&job.job_type)
            .ok_or_else(|| DispatchError::UnknownType(job.job_type.clone()))?;

        tracing::debug!(job_id = %job.id, job_type = %job.job_type, "Dispatching job");
        handler.handle(&job.payload).await?;
        Ok(())
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("job_types", &self.job_types())
            .finish()
    }
}
