//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::router::RouterOptions;
use crate::api::rest::state::AppState;
use crate::config::{DaemonConfig, StorageConfig};
use crate::error::{DaemonError, DaemonResult};
use crate::reconciler::HttpReconciler;
use crate::storage::{Database, InMemoryDatabase, PostgresDatabase};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Strata daemon server
pub struct Server {
    config: DaemonConfig,
    state: AppState,
}

impl Server {
    /// Connect storage and the reconciler client.
    ///
    /// Fails when the reconciler endpoint is not configured.
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let endpoint = config.reconciler.endpoint()?;
        let reconciler = HttpReconciler::new(endpoint)
            .map_err(|e| DaemonError::Config(format!("Invalid reconciler client: {}", e)))?;

        let db = connect_storage(&config.storage).await?;

        tracing::info!(reconciler = %reconciler.base_url(), "Reconciler client ready");

        Ok(Self {
            state: AppState::new(db, Arc::new(reconciler)),
            config,
        })
    }

    /// Run the server until Ctrl+C or SIGTERM
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let app = create_router(
            self.state,
            RouterOptions {
                enable_cors: self.config.server.enable_cors,
            },
        );

        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Strata daemon listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("Strata daemon shut down");
        Ok(())
    }
}

async fn connect_storage(config: &StorageConfig) -> DaemonResult<Arc<dyn Database>> {
    match config {
        StorageConfig::Memory => {
            tracing::warn!("Using in-memory storage; state is lost on restart");
            Ok(Arc::new(InMemoryDatabase::new()))
        }
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            let db = PostgresDatabase::new(url, *max_connections, *connect_timeout_secs).await?;
            tracing::info!(max_connections, "Connected to PostgreSQL");
            Ok(Arc::new(db))
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
