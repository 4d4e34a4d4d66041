//! RoadMark Geotagger (roadmark-gt) - Main entry point
//!
//! Long-running service that ingests detector events and vehicle
//! telemetry, maintains the live alert set, and serves observers over
//! HTTP and SSE.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roadmark_gt::api;
use roadmark_gt::catalog::PotholeCatalog;
use roadmark_gt::config::{Config, ConfigOverrides, RuntimeSettings, TomlConfig};
use roadmark_gt::db;
use roadmark_gt::engine::GeotagEngine;

/// Command-line arguments for roadmark-gt
#[derive(Parser, Debug)]
#[command(name = "roadmark-gt")]
#[command(about = "Geotagging service for RoadMark")]
#[command(version)]
struct Args {
    /// Path to TOML bootstrap configuration
    #[arg(short, long, default_value = "roadmark.toml", env = "ROADMARK_CONFIG")]
    config: PathBuf,

    /// Port to listen on (overrides configuration)
    #[arg(short, long, env = "ROADMARK_GT_PORT")]
    port: Option<u16>,

    /// Catalog database path (overrides configuration)
    #[arg(short, long, env = "ROADMARK_DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roadmark_gt=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = Args::parse();

    let toml_config = TomlConfig::load(&args.config)
        .await
        .context("Failed to load bootstrap configuration")?;

    let overrides = ConfigOverrides {
        database_path: args.database,
        port: args.port,
    };
    let database_path = overrides
        .database_path
        .clone()
        .unwrap_or_else(|| toml_config.database_path.clone());

    // Open the catalog database and load runtime settings
    let db_pool = db::init_database(&database_path)
        .await
        .context("Failed to initialize catalog database")?;
    let runtime = RuntimeSettings::load(&db_pool)
        .await
        .context("Failed to load runtime settings")?;
    let config = Config::assemble(toml_config, overrides, runtime);

    info!(
        "Starting RoadMark Geotagger on port {} (catalog: {})",
        config.port,
        config.database_path.display()
    );

    // Build the engine around the durable catalog
    let catalog = PotholeCatalog::open(db_pool, &config.runtime)
        .await
        .context("Failed to open defect catalog")?;
    let engine = Arc::new(GeotagEngine::new(catalog, &config.runtime));
    info!("Geotag engine initialized");

    // Deferred persistence retry: entries that missed their write-through
    // settle here without ever blocking ingestion
    let retry_engine = engine.clone();
    let retry_interval = config.runtime.persist_retry_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(retry_interval);
        loop {
            interval.tick().await;
            let remaining = retry_engine.catalog().retry_dirty().await;
            if remaining > 0 {
                info!("{} catalog entries still awaiting persistence", remaining);
            }
        }
    });

    // Build the application router
    let ctx = api::AppContext {
        engine,
        port: config.port,
    };
    let app = api::create_router(ctx);

    // Create socket address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
