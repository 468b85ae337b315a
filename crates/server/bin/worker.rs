//! Worker process: claims jobs from the shared store and dispatches them.
//!
//! Reads `DATABASE_URL` and `TASKQ_NAMESPACE` like the API process. Run as
//! many copies as needed; each claim is exclusive.

use std::sync::Arc;

use taskq_core::{Dispatcher, Worker, WorkerConfig};
use taskq_server::{connect, init_tracing, EmailHandler, LogMailer, ServerConfig};

#[tokio::main]
async fn main() -> taskq_core::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env()?;
    let stores = connect(&config.database_url, &config.namespace).await?;

    let mut dispatcher = Dispatcher::new();
    EmailHandler::register(&mut dispatcher, Arc::new(LogMailer));

    let worker = Worker::with_config(stores.jobs, dispatcher, WorkerConfig::default());
    worker.run().await
}
