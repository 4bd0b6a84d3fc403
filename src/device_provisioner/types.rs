//! Provisioner data types

use crate::broker_gate::MqttTopics;
use crate::registry::QuietHours;
use serde::{Deserialize, Serialize};

/// Shown once with the credential bundle; the key is gone after that
pub const PRIVATE_KEY_WARNING: &str =
    "Save the certificate and private key NOW. The private key is not stored \
     anywhere and cannot be recovered; losing it means deprovisioning and \
     reprovisioning the device.";

/// Provisioning request (admin action, out-of-band from the event flow)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    pub sensor_id: String,
    pub user_id: String,
    pub location_label: Option<String>,
    pub playback_target_id: String,
    pub playback_context_ref: String,
    pub motion_debounce_seconds: Option<i32>,
    pub inactivity_timeout_seconds: Option<i32>,
    pub status_report_interval_seconds: Option<i32>,
    pub led_enabled: Option<bool>,
    pub quiet_hours: Option<QuietHours>,
}

/// One-time provisioning result.
///
/// `private_key_pem` is returned exactly once; no step reads it back.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialBundle {
    pub sensor_id: String,
    pub thing_handle: String,
    pub certificate_handle: String,
    pub certificate_pem: String,
    pub private_key_pem: String,
    pub broker_endpoint: String,
    pub policy_name: String,
    pub region: String,
    pub mqtt_topics: MqttTopics,
    pub warning: String,
}
