//! HTTP server for the document service

pub mod routes;
pub mod state;

use axum::Router;
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::DocVaultConfig;
use crate::error::{Error, Result};
use state::AppState;

/// Build the router with all routes
pub fn build_router(state: AppState) -> Router {
    let config = state.config();

    let router = Router::new()
        .merge(routes::service_routes())
        .merge(routes::document_routes(config.upload.max_upload_size))
        .with_state(state.clone())
        // Middleware layers (order matters - applied bottom to top)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new());

    if state.config().server.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router.layer(cors)
    } else {
        router
    }
}

/// Document HTTP server
pub struct DocVaultServer {
    config: DocVaultConfig,
    state: AppState,
}

impl DocVaultServer {
    /// Create a new server, opening the metadata and blob stores
    pub fn new(config: DocVaultConfig) -> Result<Self> {
        let state = AppState::new(config.clone())?;
        Ok(Self { config, state })
    }

    /// Start the server, reconciling stored records first
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .bind_address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let changed = self.state.pipeline().reconcile().await?;
        if changed > 0 {
            tracing::warn!("{} document(s) were missing their files", changed);
        }

        let router = build_router(self.state.clone());

        tracing::info!("Starting document server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

        tracing::info!("Server stopped");
        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        self.config.bind_address()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
