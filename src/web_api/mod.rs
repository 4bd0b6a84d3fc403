//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - Ingest webhook (broker rule target)
//! - Provisioning endpoints (admin)
//! - Sensor config / command push
//! - Health & status

mod device_routes;
mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_connected = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();

    let response = HealthResponse {
        status: if db_connected { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        db_connected,
    };

    Json(response)
}

/// Status endpoint: ingress counters and loop configuration
pub async fn service_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "ingress": state.ingress.counters(),
        "reaper_tick_seconds": state.config.reaper_tick_seconds,
        "warden_tick_seconds": state.config.warden_tick_seconds,
    }))
}
