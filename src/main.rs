//! Facial Emotion Service
//!
//! Locates a face in an uploaded image and classifies its emotion with a
//! little-VGG network. Serves HTML and JSON over HTTP (Axum), or classifies
//! a single file from the command line.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

use emoface::api::{create_rest_router, AppState};
use emoface::cli::{self, Cli, Command};
use emoface::config::Config;
use emoface::engine::ModelPool;
use emoface::service::{self, EmotionService};
use emoface::storage::FsUploadStore;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Load configuration before logging so the level can be applied
    let config_path = Config::default_path();
    let (config, fallback_reason) = Config::load_or_default(&config_path);

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(config.logging.level()?)
        .with_target(false)
        .init();

    match fallback_reason {
        Some(e) => warn!("Using default config ({:#})", e),
        None => info!("Configuration loaded from {:?}", config_path),
    }

    match args.command() {
        Command::Serve => serve(config).await,
        Command::Predict { image } => predict(&config, &image),
        Command::InitWeights { path, topology } => {
            cli::init_weights(&path, topology)?;
            Ok(())
        }
    }
}

/// Classify one image file and print the result
fn predict(config: &Config, image: &Path) -> Result<()> {
    let pool = ModelPool::load(config)?;
    let detection = service::predict_file(&pool, image)
        .with_context(|| format!("prediction failed for {:?}", image))?;
    println!("{}", cli::describe(detection.as_ref()));
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting Facial Emotion Service v{}", env!("CARGO_PKG_VERSION"));
    info!("  Listen: {}:{}", config.server.host, config.server.port);
    info!("  Topology: {}", config.model.topology);
    info!("  Device: {:?}", config.model.device);
    info!("  Face selection: {}", config.detector.selection.as_str());
    info!("  Upload dir: {:?}", config.storage.upload_dir);

    // Load models, fatal when either artifact is missing or invalid
    let pool = Arc::new(ModelPool::load(&config)?);

    // Initialize storage
    let storage = Arc::new(
        FsUploadStore::new(&config.storage.upload_dir)
            .await
            .with_context(|| format!("cannot create upload dir {:?}", config.storage.upload_dir))?,
    );

    // Create emotion service
    let service = Arc::new(EmotionService::new(pool, storage, config.storage.keep_uploads));

    let app_state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
        max_upload_bytes: config.server.max_upload_bytes,
    });
    let router = create_rest_router(app_state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;

    info!("Facial Emotion Service is ready!");
    info!("REST: http://{}/health", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Goodbye!");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, cleaning up...");
}
