//! # taskq-server - HTTP API and worker process
//!
//! This crate exposes the job queue over HTTP and provides the handlers the
//! worker binary dispatches to.
//!
//! ## Endpoints
//!
//! - Health check (`GET /health`), public
//! - Enqueue a job (`POST /jobs`), requires `X-API-Key`
//! - Job status (`GET /jobs/{id}`), requires `X-API-Key`
//! - Issue and list API keys (`POST|GET /admin/api-keys`), requires the admin bearer token
//! - Queue statistics (`GET /admin/stats`), requires the admin bearer token
//!
//! Keyed routes pass admission control: the key must exist and be unexpired,
//! then the per-key token bucket must have a token left.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use taskq_server::{connect, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> taskq_core::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     let stores = connect(&config.database_url, &config.namespace).await?;
//!     Server::new(config, stores).run().await
//! }
//! ```

pub mod api;
mod config;
mod connect;
pub mod email;
mod error;
mod logging;
pub mod middleware;
mod server;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use connect::{connect, Stores};
pub use email::{EmailHandler, EmailPayload, LogMailer, Mailer};
pub use error::{ApiError, ErrorBody};
pub use logging::init_tracing;
pub use server::Server;
