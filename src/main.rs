// =============================================================================
// Crypto Analytics — Main Entry Point
// =============================================================================
//
// Loads the host config, builds the shared state, performs the initial price
// refresh, then serves the dashboard API until Ctrl+C.
// =============================================================================

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crypto_analytics::api;
use crypto_analytics::app_state::AppState;
use crypto_analytics::config::{AppConfig, CONFIG_FILE};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Crypto Analytics starting up");

    let config = AppConfig::load_or_default(CONFIG_FILE);
    info!(
        bind_addr = %config.bind_addr,
        data_dir = %config.price_data_dir.display(),
        asset = %config.default_asset,
        days = config.default_timeframe_days,
        refresh_interval_secs = config.refresh_interval_secs,
        "configuration resolved"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let state = Arc::new(AppState::new(config));

    // ── 3. Settings observer ─────────────────────────────────────────────
    let settings_watcher = state.pipeline.clone().watch_settings();

    // ── 4. Initial + periodic price refresh ──────────────────────────────
    state.refresh_current().await;

    let refresh_secs = state.config.refresh_interval_secs;
    let refresh_task = if refresh_secs > 0 {
        let refresh_state = state.clone();
        Some(tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(refresh_secs));
            // The first tick fires immediately; the initial refresh already ran.
            interval.tick().await;
            loop {
                interval.tick().await;
                refresh_state.refresh_current().await;
            }
        }))
    } else {
        info!("periodic refresh disabled");
        None
    };

    // ── 5. Start the API server ──────────────────────────────────────────
    let bind_addr = state.config.bind_addr.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    let app = api::router(state.clone());
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received; stopping");

    server.abort();
    settings_watcher.abort();
    if let Some(task) = refresh_task {
        task.abort();
    }

    info!("Crypto Analytics shut down complete.");
    Ok(())
}
