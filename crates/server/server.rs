//! HTTP server lifecycle.

use std::future::Future;

use actix_web::{web, App, HttpServer};
use taskq_core::{Result, TaskqError};

use crate::api::{self, AppState};
use crate::config::ServerConfig;
use crate::connect::Stores;

/// The taskq API server.
pub struct Server {
    config: ServerConfig,
    stores: Stores,
}

impl Server {
    /// Create a new server over already connected stores.
    pub fn new(config: ServerConfig, stores: Stores) -> Self {
        Self { config, stores }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run the server until Ctrl+C.
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
    }

    /// Run the server until `shutdown` resolves, then drain in-flight requests.
    pub async fn run_until<S>(self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        let state = web::Data::new(AppState::new(&self.stores, &self.config));
        let addr = self.config.api_addr;

        let server = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .configure(api::configure)
        })
        .client_request_timeout(self.config.request_timeout)
        .bind(addr)
        .map_err(|e| TaskqError::Config(format!("failed to bind {}: {}", addr, e)))?
        .disable_signals()
        .run();

        let handle = server.handle();
        tracing::info!(addr = %addr, namespace = %self.config.namespace, "API server started");

        tokio::select! {
            result = server => {
                result.map_err(|e| TaskqError::Backend(e.to_string()))?;
            }
            _ = shutdown => {
                tracing::info!("Shutting down API server...");
                handle.stop(true).await;
            }
        }

        tracing::info!("API server stopped");
        Ok(())
    }
}
