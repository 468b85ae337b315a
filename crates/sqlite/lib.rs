//! SQLite store for the taskq job queue.
//!
//! This crate provides a SQLite-based job and credential store. It is meant
//! for local development, single-host deployments and integration tests.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use taskq_sqlite::SqliteStore;
//! use taskq_core::{Client, SharedStore};
//!
//! #[tokio::main]
//! async fn main() -> taskq_core::Result<()> {
//!     let store = SqliteStore::new("sqlite:jobs.db", "myapp").await?;
//!     let client = Client::new(SharedStore::new(store));
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use taskq_core::{
    current_timestamp, validate_namespace, Credential, CredentialStore, Job, JobId, JobStats,
    JobStatus, JobStore, Result, TaskqError,
};

type JobRow = (
    String,
    String,
    String,
    String,
    i64,
    i64,
    Option<String>,
    i64,
    i64,
);

type CredentialRow = (
    String,
    String,
    Option<String>,
    String,
    i64,
    Option<i64>,
    Option<i64>,
);

const JOB_COLUMNS: &str =
    "id, job_type, payload, status, attempts, max_attempts, error_message, scheduled_at, created_at";

const CREDENTIAL_COLUMNS: &str =
    "id, name, description, key_hash, created_at, expires_at, last_used_at";

fn backend_error(context: &str, e: sqlx::Error) -> TaskqError {
    TaskqError::Backend(format!("{}: {}", context, e))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

fn row_to_job(row: JobRow) -> Result<Job> {
    let (id, job_type, payload, status, attempts, max_attempts, error_message, scheduled_at, created_at) =
        row;
    Ok(Job {
        id: JobId::from(id),
        job_type,
        payload: serde_json::from_str(&payload)?,
        status: JobStatus::from_str(&status)?,
        attempts: u32::try_from(attempts).unwrap_or(0),
        max_attempts: u32::try_from(max_attempts).unwrap_or(0),
        error_message,
        scheduled_at,
        created_at,
    })
}

fn row_to_credential(row: CredentialRow) -> Credential {
    let (id, name, description, key_hash, created_at, expires_at, last_used_at) = row;
    Credential {
        id,
        name,
        description,
        key_hash,
        created_at,
        expires_at,
        last_used_at,
    }
}

/// SQLite job and credential store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    namespace: String,
}

impl SqliteStore {
    /// Create a new SQLite store.
    ///
    /// The database_url should be in the format: `sqlite:path/to/db.sqlite` or
    /// `sqlite::memory:`. The file is created if it does not exist.
    pub async fn new(database_url: &str, namespace: &str) -> Result<Self> {
        validate_namespace(namespace)?;

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| TaskqError::Config(format!("Invalid SQLite URL: {}", e)))?
            .create_if_missing(true);

        // In-memory databases live as long as their connection, so keep
        // exactly one and never recycle it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| backend_error("Failed to connect to SQLite", e))?;

        let store = Self {
            pool,
            namespace: namespace.to_string(),
        };

        store.init_tables().await?;

        tracing::debug!(namespace = %store.namespace, "SQLite store ready");
        Ok(store)
    }

    /// Create an in-memory SQLite store (useful for testing).
    pub async fn in_memory(namespace: &str) -> Result<Self> {
        Self::new("sqlite::memory:", namespace).await
    }

    /// Initialize the required tables.
    async fn init_tables(&self) -> Result<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                job_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL,
                error_message TEXT,
                scheduled_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
            self.jobs_table()
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| backend_error("Failed to create jobs table", e))?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_claim ON {} (status, scheduled_at)",
            self.namespace,
            self.jobs_table()
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| backend_error("Failed to create claim index", e))?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                key_hash TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL,
                expires_at INTEGER,
                last_used_at INTEGER
            )
            "#,
            self.api_keys_table()
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| backend_error("Failed to create api keys table", e))?;

        Ok(())
    }

    fn jobs_table(&self) -> String {
        format!("{}_jobs", self.namespace)
    }

    fn api_keys_table(&self) -> String {
        format!("{}_api_keys", self.namespace)
    }

    async fn finalize(
        &self,
        id: &JobId,
        status: JobStatus,
        attempts: u32,
        error_message: &str,
        scheduled_at: i64,
    ) -> Result<()> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET status = ?, attempts = ?, error_message = ?, scheduled_at = ? \
             WHERE id = ? AND status = 'processing'",
            self.jobs_table()
        ))
        .bind(status.as_str())
        .bind(i64::from(attempts))
        .bind(error_message)
        .bind(scheduled_at)
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| backend_error("Failed to update job", e))?;

        if result.rows_affected() == 0 {
            return Err(self.rejected_transition(id, status).await);
        }
        Ok(())
    }

    /// Explain why a guarded UPDATE touched no row: the job is either
    /// missing or not `processing`.
    async fn rejected_transition(&self, id: &JobId, to: JobStatus) -> TaskqError {
        let status: std::result::Result<Option<(String,)>, sqlx::Error> = sqlx::query_as(
            &format!("SELECT status FROM {} WHERE id = ?", self.jobs_table()),
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await;

        match status {
            Ok(None) => TaskqError::JobNotFound(id.to_string()),
            Ok(Some((from,))) => match from.parse::<JobStatus>() {
                Ok(from) => TaskqError::InvalidTransition {
                    id: id.to_string(),
                    from,
                    to,
                },
                Err(e) => e,
            },
            Err(e) => backend_error("Failed to read job status", e),
        }
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn create(&self, job: Job) -> Result<Job> {
        let payload = serde_json::to_string(&job.payload)?;

        sqlx::query(&format!(
            "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.jobs_table(),
            JOB_COLUMNS
        ))
        .bind(job.id.as_str())
        .bind(&job.job_type)
        .bind(payload)
        .bind(job.status.as_str())
        .bind(i64::from(job.attempts))
        .bind(i64::from(job.max_attempts))
        .bind(job.error_message.as_deref())
        .bind(job.scheduled_at)
        .bind(job.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                TaskqError::Validation(format!("job already exists: {}", job.id))
            } else {
                backend_error("Failed to insert job", e)
            }
        })?;

        Ok(job)
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        // A single UPDATE takes SQLite's write lock, so the select and the
        // transition cannot interleave with another claimer.
        let row: Option<JobRow> = sqlx::query_as(&format!(
            r#"
            UPDATE {table} SET status = 'processing', attempts = attempts + 1
            WHERE id = (
                SELECT id FROM {table}
                WHERE status = 'pending' AND scheduled_at <= ?
                ORDER BY scheduled_at, rowid
                LIMIT 1
            )
            RETURNING {columns}
            "#,
            table = self.jobs_table(),
            columns = JOB_COLUMNS
        ))
        .bind(current_timestamp())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| backend_error("Failed to claim job", e))?;

        row.map(row_to_job).transpose()
    }

    async fn get(&self, id: &JobId) -> Result<Job> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM {} WHERE id = ?",
            JOB_COLUMNS,
            self.jobs_table()
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| backend_error("Failed to get job", e))?;

        match row {
            Some(row) => row_to_job(row),
            None => Err(TaskqError::JobNotFound(id.to_string())),
        }
    }

    async fn mark_failed(
        &self,
        id: &JobId,
        attempts: u32,
        error_message: &str,
        scheduled_at: i64,
    ) -> Result<()> {
        self.finalize(id, JobStatus::Failed, attempts, error_message, scheduled_at)
            .await
    }

    async fn mark_completed(&self, id: &JobId) -> Result<()> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET status = 'completed' WHERE id = ? AND status = 'processing'",
            self.jobs_table()
        ))
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| backend_error("Failed to complete job", e))?;

        if result.rows_affected() == 0 {
            return Err(self.rejected_transition(id, JobStatus::Completed).await);
        }
        Ok(())
    }

    async fn requeue(
        &self,
        id: &JobId,
        attempts: u32,
        error_message: &str,
        scheduled_at: i64,
    ) -> Result<()> {
        self.finalize(id, JobStatus::Pending, attempts, error_message, scheduled_at)
            .await
    }

    async fn stats(&self) -> Result<JobStats> {
        let rows: Vec<(String, i64)> = sqlx::query_as(&format!(
            "SELECT status, COUNT(*) FROM {} GROUP BY status",
            self.jobs_table()
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| backend_error("Failed to count jobs", e))?;

        let mut stats = JobStats::default();
        for (status, count) in rows {
            let count = usize::try_from(count).unwrap_or(0);
            match JobStatus::from_str(&status)? {
                JobStatus::Pending => stats.pending = count,
                JobStatus::Processing => stats.processing = count,
                JobStatus::Completed => stats.completed = count,
                JobStatus::Failed => stats.failed = count,
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn lookup_by_fingerprint(&self, fingerprint: &str) -> Result<Credential> {
        let row: Option<CredentialRow> = sqlx::query_as(&format!(
            "SELECT {} FROM {} WHERE key_hash = ?",
            CREDENTIAL_COLUMNS,
            self.api_keys_table()
        ))
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| backend_error("Failed to look up API key", e))?;

        row.map(row_to_credential)
            .ok_or(TaskqError::CredentialNotFound)
    }

    async fn create_credential(&self, credential: Credential) -> Result<Credential> {
        sqlx::query(&format!(
            "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
            self.api_keys_table(),
            CREDENTIAL_COLUMNS
        ))
        .bind(&credential.id)
        .bind(&credential.name)
        .bind(credential.description.as_deref())
        .bind(&credential.key_hash)
        .bind(credential.created_at)
        .bind(credential.expires_at)
        .bind(credential.last_used_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                TaskqError::Validation("credential already registered".to_string())
            } else {
                backend_error("Failed to insert API key", e)
            }
        })?;

        Ok(credential)
    }

    async fn list_credentials(&self) -> Result<Vec<Credential>> {
        let rows: Vec<CredentialRow> = sqlx::query_as(&format!(
            "SELECT {} FROM {} ORDER BY created_at DESC, id",
            CREDENTIAL_COLUMNS,
            self.api_keys_table()
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| backend_error("Failed to list API keys", e))?;

        Ok(rows.into_iter().map(row_to_credential).collect())
    }

    async fn touch_last_used(&self, id: &str, at: i64) -> Result<()> {
        sqlx::query(&format!(
            "UPDATE {} SET last_used_at = ? WHERE id = ?",
            self.api_keys_table()
        ))
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| backend_error("Failed to update API key usage", e))?;
        Ok(())
    }
}
