use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streamnab_core::{load_config, validate_config};
use streamnab_server::{create_router, AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // One line to stderr, non-zero exit.
        eprintln!("streamnab-server: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("STREAMNAB_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("settings.json"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {config_path:?}"))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!(
        addon = %config.server.addon_name,
        indexer_manager = config.aggregator.manager.as_str(),
        newznab_slots = config.newznab.len(),
        triage = config.triage.enabled,
        "Configuration loaded"
    );

    let state = Arc::new(AppState::new(config.clone()));
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
