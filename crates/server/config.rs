//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use taskq_core::{RateLimitConfig, Result, TaskqError, DEFAULT_MAX_ATTEMPTS};

/// Configuration shared by the API and worker processes.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the API server to.
    pub api_addr: SocketAddr,
    /// Store URL: `postgres://...` or `sqlite:...`.
    pub database_url: String,
    /// Namespace prefix for tables.
    pub namespace: String,
    /// Bearer token for `/admin` routes. Admin routes reject everything when unset.
    pub admin_token: Option<String>,
    /// Per-API-key token bucket.
    pub rate_limit: RateLimitConfig,
    /// Attempt budget for jobs that do not specify one.
    pub max_attempts: u32,
    /// How long a client may take to send request headers.
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            database_url: "sqlite::memory:".to_string(),
            namespace: "taskq".to_string(),
            admin_token: None,
            rate_limit: RateLimitConfig::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Create a new builder.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    /// Load configuration from the process environment.
    ///
    /// Unset variables keep their defaults; malformed ones are an error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("TASKQ_API_ADDR") {
            config.api_addr = parse_var("TASKQ_API_ADDR", &addr)?;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(namespace) = lookup("TASKQ_NAMESPACE") {
            config.namespace = namespace;
        }
        config.admin_token = lookup("ADMIN_TOKEN").filter(|token| !token.trim().is_empty());
        if let Some(capacity) = lookup("TASKQ_RATE_CAPACITY") {
            config.rate_limit.capacity = parse_var("TASKQ_RATE_CAPACITY", &capacity)?;
        }
        if let Some(refill) = lookup("TASKQ_RATE_REFILL") {
            config.rate_limit.refill_rate = parse_var("TASKQ_RATE_REFILL", &refill)?;
        }
        if let Some(max_attempts) = lookup("TASKQ_MAX_ATTEMPTS") {
            config.max_attempts = parse_var("TASKQ_MAX_ATTEMPTS", &max_attempts)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot work.
    pub fn validate(&self) -> Result<()> {
        taskq_core::validate_namespace(&self.namespace)?;
        if self.max_attempts == 0 {
            return Err(TaskqError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.rate_limit.refill_rate.is_finite() || self.rate_limit.refill_rate < 0.0 {
            return Err(TaskqError::Config(
                "rate limit refill must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| TaskqError::Config(format!("{}={:?}: {}", key, value, e)))
}

/// Builder for ServerConfig.
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API bind address.
    pub fn api_addr(mut self, addr: SocketAddr) -> Self {
        self.config.api_addr = addr;
        self
    }

    /// Set the API bind address from a string.
    pub fn api_addr_str(mut self, addr: &str) -> std::result::Result<Self, std::net::AddrParseError> {
        self.config.api_addr = addr.parse()?;
        Ok(self)
    }

    /// Set the store URL.
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = url.into();
        self
    }

    /// Set the namespace.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    /// Set the admin bearer token.
    pub fn admin_token(mut self, token: impl Into<String>) -> Self {
        self.config.admin_token = Some(token.into());
        self
    }

    /// Set the per-key rate limit.
    pub fn rate_limit(mut self, capacity: u32, refill_rate: f64) -> Self {
        self.config.rate_limit = RateLimitConfig::new(capacity, refill_rate);
        self
    }

    /// Set the default attempt budget.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.max_attempts = max_attempts;
        self
    }

    /// Set the client request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Build the ServerConfig.
    pub fn build(self) -> ServerConfig {
        self.config
    }
}
