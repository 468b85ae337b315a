//! # taskq-core - Core types and traits for the taskq job queue
//!
//! This crate provides the core abstractions for the taskq system:
//! - `JobStore` and `CredentialStore` traits for storage implementations
//! - `Job`, `JobId`, `NewJob`, `JobStatus` types
//! - `Client` for enqueueing jobs
//! - `Worker` loop, `Dispatcher` and `RetryPolicy` for processing them
//! - `RateLimiter` and `Admission` for the API boundary
//! - Error types

mod admission;
mod client;
mod clock;
mod config;
mod credential;
mod dispatcher;
mod error;
mod job;
pub mod keys;
mod memory;
mod ratelimit;
mod retry;
mod store;
mod worker;

// Re-export main types
pub use admission::{Admission, AdmissionError};
pub use client::Client;
pub use clock::{current_timestamp, Clock, SharedClock, SystemClock};
pub use config::{RateLimitConfig, WorkerConfig, WorkerConfigBuilder};
pub use credential::{Credential, CredentialStore, SharedCredentials};
pub use dispatcher::{
    parse_payload, DispatchError, Dispatcher, HandlerError, HandlerResult, JobHandler,
};
pub use error::{Result, TaskqError};
pub use job::{Job, JobId, JobStats, JobStatus, NewJob, DEFAULT_MAX_ATTEMPTS};
pub use memory::MemoryStore;
pub use ratelimit::{RateLimiter, TokenBucket};
pub use retry::{Finalization, RetryPolicy};
pub use store::{validate_namespace, DynStore, JobStore, SharedStore};
pub use worker::{generate_worker_id, Outcome, Step, Worker};
