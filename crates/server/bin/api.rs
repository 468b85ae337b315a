//! HTTP API process.
//!
//! Configuration comes from the environment (a `.env` file is honoured):
//! `TASKQ_API_ADDR`, `DATABASE_URL`, `TASKQ_NAMESPACE`, `ADMIN_TOKEN`,
//! `TASKQ_RATE_CAPACITY`, `TASKQ_RATE_REFILL`, `TASKQ_MAX_ATTEMPTS`.

use taskq_server::{connect, init_tracing, Server, ServerConfig};

#[tokio::main]
async fn main() -> taskq_core::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env()?;
    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN is not set; admin routes will reject every request");
    }

    let stores = connect(&config.database_url, &config.namespace).await?;
    Server::new(config, stores).run().await
}
