// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// The data boundary of the display surface.  All endpoints live under
// `/api/v1/` and are unauthenticated: the scanner is advisory and holds
// no account state.
//
// CORS is configured permissively for development; tighten
// `allowed_origins` in production.

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::app_state::AppState;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/entities", get(entities))
        .route("/api/v1/entities/:symbol", get(entity_detail))
        .route("/api/v1/status", get(status))
        .route("/api/v1/refresh", post(trigger_refresh))
        .route("/api/v1/config", get(get_config))
        .route("/api/v1/config", post(update_config))
        // ── WebSocket (handled in the ws module, mounted here) ──────
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    uptime_secs: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// Entity table + detail
// =============================================================================

async fn entities(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.table_snapshot())
}

async fn entity_detail(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> impl IntoResponse {
    let symbol = symbol.to_uppercase();
    match state.entity(&symbol) {
        Some(entity) => Json(entity).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("unknown symbol {symbol}") })),
        )
            .into_response(),
    }
}

// =============================================================================
// Status
// =============================================================================

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.table_snapshot();
    let errors = state.recent_errors.read().clone();
    Json(serde_json::json!({
        "status": snapshot.status,
        "generation": state.current_generation(),
        "recent_errors": errors,
    }))
}

// =============================================================================
// Manual refresh
// =============================================================================

async fn trigger_refresh(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("manual refresh requested via API");
    state.refresh_trigger.notify_one();
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "refresh": "scheduled" })),
    )
}

// =============================================================================
// Config
// =============================================================================

async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.runtime_config.read().clone())
}

/// Partial config update: only the provided fields change.
#[derive(Deserialize)]
struct ConfigUpdate {
    #[serde(default)]
    universe_size: Option<usize>,
    #[serde(default)]
    batch_size: Option<usize>,
    #[serde(default)]
    batch_delay_ms: Option<u64>,
    #[serde(default)]
    refresh_interval_secs: Option<u64>,
    #[serde(default)]
    alerts_enabled: Option<bool>,
    #[serde(default)]
    alert_score_threshold: Option<f64>,
    #[serde(default)]
    alert_webhook_url: Option<String>,
}

async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(update): Json<ConfigUpdate>,
) -> impl IntoResponse {
    {
        let mut config = state.runtime_config.write();
        if let Some(v) = update.universe_size {
            config.universe_size = v.clamp(1, 250);
        }
        if let Some(v) = update.batch_size {
            config.batch_size = v.clamp(1, 20);
        }
        if let Some(v) = update.batch_delay_ms {
            config.batch_delay_ms = v;
        }
        if let Some(v) = update.refresh_interval_secs {
            config.refresh_interval_secs = v.max(30);
        }
        if let Some(v) = update.alerts_enabled {
            config.alerts_enabled = v;
        }
        if let Some(v) = update.alert_score_threshold {
            config.alert_score_threshold = v.clamp(0.0, 100.0);
        }
        if let Some(v) = update.alert_webhook_url {
            config.alert_webhook_url = if v.is_empty() { None } else { Some(v) };
        }
    }
    state.increment_version();
    info!("runtime config updated via API");
    Json(state.runtime_config.read().clone())
}
