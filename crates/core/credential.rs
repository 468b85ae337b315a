//! API credentials consulted by admission control.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;

/// A stored API key. Only the fingerprint of the secret is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Identity used as the rate-limit key.
    pub id: String,
    /// Human readable label.
    pub name: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// SHA-256 fingerprint of the secret.
    #[serde(skip_serializing)]
    pub key_hash: String,
    /// Creation time (Unix timestamp in seconds).
    pub created_at: i64,
    /// Expiry (Unix timestamp in seconds), if any.
    pub expires_at: Option<i64>,
    /// Last successful admission (Unix timestamp in seconds).
    pub last_used_at: Option<i64>,
}

impl Credential {
    /// A credential is rejected from its expiry instant onwards.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Storage operations for API credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find the credential whose fingerprint matches.
    ///
    /// Unknown fingerprints yield `TaskqError::CredentialNotFound`.
    async fn lookup_by_fingerprint(&self, fingerprint: &str) -> Result<Credential>;

    /// Persist a new credential.
    async fn create_credential(&self, credential: Credential) -> Result<Credential>;

    /// List every credential, newest first.
    async fn list_credentials(&self) -> Result<Vec<Credential>>;

    /// Record that the credential was just used.
    async fn touch_last_used(&self, id: &str, at: i64) -> Result<()>;
}

/// A type-erased credential store.
pub type SharedCredentials = Arc<dyn CredentialStore>;
