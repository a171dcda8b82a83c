//! Docpipe server binary
//!
//! Run with: cargo run -p docpipe --bin docpipe-server
//! Set DOCPIPE_CONFIG to a TOML file to override the defaults.

use docpipe::{config::AppConfig, server::DocpipeServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docpipe=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Database: {}", config.storage.database_path.display());
    tracing::info!(
        "  - Max upload size: {}MB",
        config.server.max_upload_size / (1024 * 1024)
    );
    tracing::info!(
        "  - Concurrent jobs: {}",
        config.processing.max_concurrent_jobs()
    );
    tracing::info!("  - Progress steps: {:?}", config.processing.progress_steps);

    let server = DocpipeServer::new(config)?;

    println!("\nServer starting...");
    println!("  API: http://{}/api/files", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nEndpoints:");
    println!("  POST   /api/files/upload        - Upload a file");
    println!("  GET    /api/files               - List files");
    println!("  GET    /api/files/:id           - Parsed content");
    println!("  GET    /api/files/:id/progress  - Processing progress");
    println!("  DELETE /api/files/:id/delete    - Delete a file");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
