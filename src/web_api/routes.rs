//! API Routes

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::ingress_router::{DecodedEvent, RouteOutcome};
use crate::models::ApiResponse;
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/status", get(super::service_status))
        // Ingest (broker rule target)
        .route("/api/ingest", post(ingest_event))
        // Devices (provisioning)
        .route("/api/devices", post(super::device_routes::provision_device))
        .route(
            "/api/devices/:sensor_id",
            delete(super::device_routes::deprovision_device),
        )
        // Sensors
        .route("/api/sensors/:sensor_id", get(get_sensor))
        .route(
            "/api/sensors/:sensor_id/config",
            put(super::device_routes::update_sensor_config),
        )
        .route(
            "/api/sensors/:sensor_id/commands",
            post(super::device_routes::send_command),
        )
        // Sessions & audit (read-only)
        .route("/api/sensors/:sensor_id/sessions", get(list_sessions))
        .route("/api/sensors/:sensor_id/events", get(list_events))
        .with_state(state)
}

// ========================================
// Ingest
// ========================================

async fn ingest_event(
    State(state): State<AppState>,
    Json(event): Json<DecodedEvent>,
) -> impl IntoResponse {
    match state.ingress.route(event).await {
        Ok(RouteOutcome::Dispatched { session_id }) => Json(ApiResponse::success(
            serde_json::json!({ "outcome": "dispatched", "sessionId": session_id }),
        ))
        .into_response(),
        Ok(RouteOutcome::Recorded) => Json(ApiResponse::success(
            serde_json::json!({ "outcome": "recorded" }),
        ))
        .into_response(),
        // Dropped events are an accepted delivery: the broker must not
        // redeliver them
        Ok(RouteOutcome::Dropped(reason)) => Json(ApiResponse::success(
            serde_json::json!({ "outcome": "dropped", "reason": reason }),
        ))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

// ========================================
// Sensors / sessions / audit
// ========================================

async fn get_sensor(
    State(state): State<AppState>,
    Path(sensor_id): Path<String>,
) -> impl IntoResponse {
    match state.registry.service().require_sensor(&sensor_id).await {
        Ok(sensor) => Json(ApiResponse::success(sensor)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<i64>,
}

async fn list_sessions(
    State(state): State<AppState>,
    Path(sensor_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(20).clamp(1, 200);
    match state.sessions.list_sessions_by_sensor(&sensor_id, limit).await {
        Ok(sessions) => Json(ApiResponse::success(sessions)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn list_events(
    State(state): State<AppState>,
    Path(sensor_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    match state.sessions.list_motion_events(&sensor_id, limit).await {
        Ok(events) => Json(ApiResponse::success(events)).into_response(),
        Err(e) => e.into_response(),
    }
}
