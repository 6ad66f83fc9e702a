//! Document server binary
//!
//! Run with: cargo run -p docvault --bin docvault-server

use docvault::{config::DocVaultConfig, server::DocVaultServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let dotenv = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docvault=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Ok(path) = dotenv {
        tracing::info!("Loaded environment from {}", path.display());
    }

    // Load configuration
    let config = DocVaultConfig::load()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Database: {}", config.database.url);
    tracing::info!("  - Repository: {}", config.repository.path.display());
    tracing::info!("  - Max upload size: {} bytes", config.upload.max_upload_size);
    tracing::info!(
        "  - Allowed types: {}",
        if config.upload.allowed_mime_types.is_empty() {
            "any".to_string()
        } else {
            config.upload.allowed_mime_types.len().to_string()
        }
    );

    // Create and start server
    let server = DocVaultServer::new(config)?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/info", server.address());
    println!("\nEndpoints:");
    println!("  POST   /documents              - Upload a document");
    println!("  GET    /documents              - List documents");
    println!("  GET    /documents/:id/download - Download a document");
    println!("  DELETE /documents/:id          - Delete a document");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
