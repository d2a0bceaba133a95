use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docket_core::{
    load_config, register_builtin_jobs, validate_config, DriverFactory, FsObjectStorage,
    JobController, JobRegistry, JobServices, ObjectStorage, ProgressChannel, WebDriverFactory,
    WsProgressChannel,
};

use docket_server::api::create_router;
use docket_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("DOCKET_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Work directory: {:?}", config.runtime.work_dir);
    info!("Storage root: {:?}", config.storage.root);

    let downloads = Arc::new(FsObjectStorage::new(&config.storage));
    let storage: Arc<dyn ObjectStorage> = downloads.clone();

    let channel: Option<Arc<dyn ProgressChannel>> =
        match WsProgressChannel::from_config(&config.telemetry) {
            Some(channel) => {
                info!("Streaming progress to the configured observer");
                Some(Arc::new(channel))
            }
            None => {
                info!("No telemetry url configured, progress is logged only");
                None
            }
        };

    let drivers: Arc<dyn DriverFactory> = Arc::new(WebDriverFactory::new(config.driver.clone()));

    let services = Arc::new(JobServices::from_config(&config, storage, channel, drivers));

    let mut registry = JobRegistry::new();
    register_builtin_jobs(&mut registry);
    info!("Registered jobs: {:?}", registry.names());

    let controller = JobController::new(Arc::new(registry), services);
    let state = Arc::new(AppState::new(config.clone(), controller, downloads));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
