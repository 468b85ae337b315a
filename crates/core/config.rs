//! Configuration types for the worker loop and the rate limiter.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Configuration for the Worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identifier used in logs. Generated from host and pid when empty.
    pub worker_id: String,
    /// Time budget for one `claim_next` round-trip.
    pub claim_timeout: Duration,
    /// Time budget for one status write.
    pub write_timeout: Duration,
    /// Sleep after finding no eligible job.
    pub idle_backoff: Duration,
    /// Sleep after the store failed or timed out.
    pub error_backoff: Duration,
    /// What to do with jobs whose handler failed.
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: String::new(),
            claim_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            idle_backoff: Duration::from_secs(20),
            error_backoff: Duration::from_secs(2),
            retry: RetryPolicy::default(),
        }
    }
}

/// Builder for WorkerConfig.
#[derive(Debug, Default)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker identifier.
    pub fn worker_id(mut self, id: impl Into<String>) -> Self {
        self.config.worker_id = id.into();
        self
    }

    /// Set the claim timeout.
    pub fn claim_timeout(mut self, timeout: Duration) -> Self {
        self.config.claim_timeout = timeout;
        self
    }

    /// Set the status write timeout.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Set the idle backoff.
    pub fn idle_backoff(mut self, backoff: Duration) -> Self {
        self.config.idle_backoff = backoff;
        self
    }

    /// Set the store error backoff.
    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.config.error_backoff = backoff;
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Build the WorkerConfig.
    pub fn build(self) -> WorkerConfig {
        self.config
    }
}

impl WorkerConfig {
    /// Create a new builder.
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::new()
    }
}

/// Token bucket parameters applied to every identity.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum burst size.
    pub capacity: u32,
    /// Tokens added per second.
    pub refill_rate: f64,
}

impl RateLimitConfig {
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(100, 10.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.claim_timeout, Duration::from_secs(5));
        assert_eq!(config.write_timeout, Duration::from_secs(5));
        assert_eq!(config.idle_backoff, Duration::from_secs(20));
        assert_eq!(config.error_backoff, Duration::from_secs(2));
        assert!(config.retry.requeue);
    }

    #[test]
    fn test_worker_config_builder() {
        let config = WorkerConfig::builder()
            .worker_id("w-1")
            .idle_backoff(Duration::from_secs(1))
            .retry(RetryPolicy::disabled())
            .build();
        assert_eq!(config.worker_id, "w-1");
        assert_eq!(config.idle_backoff, Duration::from_secs(1));
        assert!(!config.retry.requeue);
    }

    #[test]
    fn test_rate_limit_defaults() {
        let config = RateLimitConfig::default();
        assert_eq!(config.capacity, 100);
        assert_eq!(config.refill_rate, 10.0);
    }
}
