//! Store selection by URL scheme.

use std::sync::Arc;

use taskq_core::{
    CredentialStore, JobStore, MemoryStore, Result, SharedCredentials, SharedStore, TaskqError,
};
use taskq_postgres::PostgresStore;
use taskq_sqlite::SqliteStore;

/// Job and credential views over one backing store.
#[derive(Clone)]
pub struct Stores {
    pub jobs: SharedStore,
    pub credentials: SharedCredentials,
}

impl Stores {
    /// Use one store for both jobs and credentials.
    pub fn from_arc<S>(store: Arc<S>) -> Self
    where
        S: JobStore + CredentialStore + 'static,
    {
        Self {
            jobs: SharedStore::from_arc(store.clone()),
            credentials: store,
        }
    }

    /// A fresh in-process store.
    pub fn memory() -> Self {
        Self::from_arc(Arc::new(MemoryStore::new()))
    }
}

/// Connect to the store named by `database_url`.
///
/// `postgres://` and `postgresql://` select PostgreSQL, `sqlite:` selects
/// SQLite (including `sqlite::memory:`).
pub async fn connect(database_url: &str, namespace: &str) -> Result<Stores> {
    if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        let store = PostgresStore::new(database_url, namespace).await?;
        tracing::info!(namespace = %namespace, "Connected to PostgreSQL");
        Ok(Stores::from_arc(Arc::new(store)))
    } else if database_url.starts_with("sqlite:") {
        let store = SqliteStore::new(database_url, namespace).await?;
        tracing::info!(namespace = %namespace, "Connected to SQLite");
        Ok(Stores::from_arc(Arc::new(store)))
    } else {
        Err(TaskqError::Config(format!(
            "unsupported DATABASE_URL scheme: {}",
            database_url.split(':').next().unwrap_or_default()
        )))
    }
}
