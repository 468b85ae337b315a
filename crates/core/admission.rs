//! Admission control: credential check, then rate check.

use std::sync::Arc;
use thiserror::Error;

use crate::clock::{SharedClock, SystemClock};
use crate::credential::{Credential, SharedCredentials};
use crate::error::TaskqError;
use crate::keys::fingerprint;
use crate::ratelimit::RateLimiter;

/// Why a request was not admitted. Each variant is distinguishable by callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("missing API key")]
    MissingCredential,

    #[error("invalid API key")]
    InvalidCredential,

    #[error("API key has expired")]
    ExpiredCredential,

    #[error("rate limit exceeded")]
    RateLimited,

    /// The credential store could not be consulted.
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// Composes credential lookup with the per-identity rate limiter.
#[derive(Clone)]
pub struct Admission {
    credentials: SharedCredentials,
    limiter: Arc<RateLimiter>,
    clock: SharedClock,
}

impl Admission {
    pub fn new(credentials: SharedCredentials, limiter: Arc<RateLimiter>) -> Self {
        Self::with_clock(credentials, limiter, Arc::new(SystemClock))
    }

    /// Use `clock` for expiry checks and usage timestamps.
    pub fn with_clock(
        credentials: SharedCredentials,
        limiter: Arc<RateLimiter>,
        clock: SharedClock,
    ) -> Self {
        Self {
            credentials,
            limiter,
            clock,
        }
    }

    /// The rate limiter consulted after a credential is accepted.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Decide whether a request presenting `presented_key` may proceed.
    ///
    /// Requests without a key are rejected before the rate limiter is
    /// consulted, so anonymous traffic never creates buckets. Rate limiting
    /// is keyed by the credential id, not the raw key.
    pub async fn admit(
        &self,
        presented_key: Option<&str>,
    ) -> std::result::Result<Credential, AdmissionError> {
        let key = presented_key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(AdmissionError::MissingCredential)?;

        let credential = self
            .credentials
            .lookup_by_fingerprint(&fingerprint(key))
            .await
            .map_err(|e| match e {
                TaskqError::CredentialNotFound => AdmissionError::InvalidCredential,
                other => {
                    tracing::error!(error = %other, "Credential lookup failed");
                    AdmissionError::Unavailable(other.to_string())
                }
            })?;

        let now = self.clock.now();
        if credential.is_expired(now) {
            tracing::debug!(credential_id = %credential.id, "Rejected expired API key");
            return Err(AdmissionError::ExpiredCredential);
        }

        if !self.limiter.allow(&credential.id) {
            tracing::debug!(credential_id = %credential.id, "Rate limit exceeded");
            return Err(AdmissionError::RateLimited);
        }

        if let Err(e) = self.credentials.touch_last_used(&credential.id, now).await {
            tracing::warn!(credential_id = %credential.id, error = %e, "Failed to record API key usage");
        }

        Ok(credential)
    }
}
