//! Scribe Manager - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use scribe_manager::{
    DeviceReclaimer, ModelRegistry, api, config::ManagerConfig, engines::EngineFactory, metrics,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "scribe-manager")]
#[command(about = "Transcription, diarisation and audit batch service", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override API port
    #[arg(long)]
    port: Option<u16>,

    /// Override compute device (auto, cuda, cpu)
    #[arg(long)]
    device: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "json")]
    log_format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    match cli.log_format.as_str() {
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .json()
                .init();
        }
    }

    tracing::info!("Starting Scribe Manager");

    // Load configuration
    let mut config = ManagerConfig::load(cli.config)?;

    // CLI overrides
    if let Some(port) = cli.port {
        config.api_port = port;
    }
    if let Some(device) = cli.device {
        config.device = device
            .parse()
            .map_err(|e: String| anyhow::anyhow!("Invalid --device value: {e}"))?;
    }

    config.validate()?;

    let device = config.device.resolve();
    tracing::info!(
        api_port = config.api_port,
        device = %device,
        batch_size = config.batch_size,
        "Configuration loaded"
    );

    // Setup metrics
    let prometheus_handle = metrics::setup_metrics()?;

    // Initialize the model registry
    let factory = Arc::new(EngineFactory::new(config.runners.clone(), config.batch_size));
    let reclaimer = Arc::new(DeviceReclaimer::new(device));
    let registry = Arc::new(ModelRegistry::new(factory, reclaimer));

    // Log residency changes
    let mut events = registry.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::info!(event = ?event, "Model residency changed");
        }
    });

    // Setup API
    let app_state = api::AppState {
        registry: registry.clone(),
        probe: Arc::new(scribe_manager::audio::WavProbe),
        device,
        pipeline_lock: Arc::new(tokio::sync::Mutex::new(())),
        prometheus_handle,
    };

    let app = api::create_router(app_state, config.max_upload_mb);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tracing::info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind API server")?;

    // Graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    tracing::info!("Shutting down...");

    // Drop every resident model so runner processes get terminated
    registry.evict_all().await;

    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
