//! Device provisioning and control routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::broker_gate::MqttTopics;
use crate::device_provisioner::ProvisionRequest;
use crate::error::Error;
use crate::models::ApiResponse;
use crate::registry::UpdateSensorConfigRequest;
use crate::state::AppState;

/// Commands a device firmware recognizes
const RECOGNIZED_COMMANDS: &[&str] = &[
    "restart",
    "test_motion",
    "ota_update",
    "factory_reset",
    "enable",
    "disable",
];

/// POST /api/devices — provision a sensor.
///
/// The response carries the private key exactly once.
pub async fn provision_device(
    State(state): State<AppState>,
    Json(req): Json<ProvisionRequest>,
) -> impl IntoResponse {
    match state.provisioner.provision(req).await {
        Ok(bundle) => (StatusCode::CREATED, Json(ApiResponse::success(bundle))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /api/devices/:sensor_id — tear down a sensor
pub async fn deprovision_device(
    State(state): State<AppState>,
    Path(sensor_id): Path<String>,
) -> impl IntoResponse {
    match state.provisioner.deprovision(&sensor_id).await {
        Ok(()) => Json(ApiResponse::success(serde_json::json!({
            "sensorId": sensor_id,
            "deprovisioned": true
        })))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// PUT /api/sensors/:sensor_id/config — update configuration and push the
/// device-recognized subset to the sensor's config topic (best effort).
pub async fn update_sensor_config(
    State(state): State<AppState>,
    Path(sensor_id): Path<String>,
    Json(req): Json<UpdateSensorConfigRequest>,
) -> impl IntoResponse {
    let sensor = match state
        .registry
        .service()
        .update_sensor_config(&sensor_id, req)
        .await
    {
        Ok(sensor) => sensor,
        Err(e) => return e.into_response(),
    };

    // Device-side options only; publish failure does not fail the write
    let topics = MqttTopics::for_sensor(&sensor_id);
    let config_payload = serde_json::json!({
        "motionDebounceSeconds": sensor.motion_debounce_seconds,
        "inactivityTimeoutSeconds": sensor.inactivity_timeout_seconds,
        "statusReportIntervalSeconds": sensor.status_report_interval_seconds,
        "ledEnabled": sensor.led_enabled,
        "enabled": sensor.enabled,
    });
    if let Err(e) = state.broker.publish(&topics.config, &config_payload).await {
        tracing::warn!(
            sensor_id = %sensor_id,
            error = %e,
            "Config push to device failed; stored config is updated"
        );
    }

    Json(ApiResponse::success(sensor)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

/// POST /api/sensors/:sensor_id/commands — publish a recognized command
/// to the device
pub async fn send_command(
    State(state): State<AppState>,
    Path(sensor_id): Path<String>,
    Json(req): Json<CommandRequest>,
) -> impl IntoResponse {
    if !RECOGNIZED_COMMANDS.contains(&req.command.as_str()) {
        return Error::Validation(format!(
            "unknown command {:?}; recognized: {}",
            req.command,
            RECOGNIZED_COMMANDS.join(", ")
        ))
        .into_response();
    }

    if let Err(e) = state.registry.service().require_sensor(&sensor_id).await {
        return e.into_response();
    }

    let topics = MqttTopics::for_sensor(&sensor_id);
    let payload = serde_json::json!({ "command": req.command });
    match state.broker.publish(&topics.commands, &payload).await {
        Ok(()) => Json(ApiResponse::success(serde_json::json!({
            "sensorId": sensor_id,
            "command": req.command,
            "published": true
        })))
        .into_response(),
        Err(e) => e.into_response(),
    }
}
