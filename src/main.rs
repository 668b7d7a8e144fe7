// =============================================================================
// Meridian Market Scanner — Main Entry Point
// =============================================================================
//
// Multi-timeframe indicator scanner: ingests candle series for a ranked
// entity universe, derives the indicator set, fuses it into a capped
// composite score per entity, and serves the resulting table over HTTP
// and WebSocket.  Advisory only — no orders are ever placed.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod alerts;
mod analysis;
mod api;
mod app_state;
mod indicators;
mod loader;
mod market_data;
mod runtime_config;
mod scheduler;
mod types;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::alerts::AlertDispatcher;
use crate::app_state::AppState;
use crate::loader::BatchLoader;
use crate::runtime_config::RuntimeConfig;
use crate::scheduler::RefreshScheduler;

/// Default path of the persisted runtime config.
const CONFIG_PATH: &str = "meridian_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Meridian Market Scanner — Starting Up            ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // Env overrides for deployment knobs.
    if let Ok(size) = std::env::var("MERIDIAN_UNIVERSE_SIZE") {
        if let Ok(size) = size.parse::<usize>() {
            config.universe_size = size.clamp(1, 250);
        }
    }
    if let Ok(url) = std::env::var("MERIDIAN_WEBHOOK_URL") {
        if !url.is_empty() {
            config.alert_webhook_url = Some(url);
        }
    }

    info!(
        universe_size = config.universe_size,
        batch_size = config.batch_size,
        refresh_interval_secs = config.refresh_interval_secs,
        "Scanner configured"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let state = Arc::new(AppState::new(config));

    // ── 3. Start the API server ──────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr =
        std::env::var("MERIDIAN_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());
    let bind_addr_clone = bind_addr.clone();

    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = tokio::net::TcpListener::bind(&bind_addr_clone)
            .await
            .expect("Failed to bind API server");
        info!(addr = %bind_addr_clone, "API server listening");
        axum::serve(listener, app)
            .await
            .expect("API server failed");
    });

    // ── 4. Scan scheduler (loader + alerts) ──────────────────────────────
    let alert_dispatcher = Arc::new(AlertDispatcher::new(state.runtime_config.clone()));
    let batch_loader = BatchLoader::new(state.clone(), state.source.clone())
        .with_alerts(alert_dispatcher);
    let refresh_scheduler = RefreshScheduler::new(state.clone(), batch_loader);

    tokio::spawn(async move {
        refresh_scheduler.run().await;
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    // Supersede any in-flight load so it stops at the next batch boundary.
    state.cancel_active_load();

    if let Err(e) = state.runtime_config.read().save(CONFIG_PATH) {
        warn!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("Meridian Market Scanner shut down complete.");
    Ok(())
}
