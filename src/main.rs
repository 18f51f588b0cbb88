use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use clipcast::config::Config;
use clipcast::init;
use clipcast::progress::{self, CancelRegistry, ProgressStore};
use clipcast::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env().context("configuration error")?;

    init::ensure_directories().await?;
    if !init::check_ffmpeg().await {
        warn!("FFmpeg not found in PATH. Please install FFmpeg.");
    }

    let client = reqwest::Client::builder()
        .cookie_store(true)
        .build()
        .context("Failed to build HTTP client")?;

    let progress_store = Arc::new(ProgressStore::new());
    progress::spawn_sweeper(Arc::clone(&progress_store));

    let state = AppState {
        config: Arc::new(config.clone()),
        client,
        progress: progress_store,
        cancels: Arc::new(CancelRegistry::new()),
    };

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("bind {}", config.listen_addr))?;
    info!("Listening on {}", config.listen_addr);

    axum::serve(listener, server::create_router(state))
        .await
        .context("server error")?;

    Ok(())
}
