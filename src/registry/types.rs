//! Registry data types
//!
//! SSoT data structures for sensors and users

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Sensor entity (SSoT)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Sensor {
    pub sensor_id: String,
    pub user_id: String,
    pub location_label: Option<String>,
    pub enabled: bool,
    /// Minimum seconds between two admitted motions
    pub motion_debounce_seconds: i32,
    /// Seconds of silence before the session is closed
    pub inactivity_timeout_seconds: i32,
    /// How often the device publishes a status report
    pub status_report_interval_seconds: i32,
    /// Device-side motion indicator LED
    pub led_enabled: bool,
    /// Quiet-hours window start, "HH:MM"
    pub quiet_start: Option<String>,
    /// Quiet-hours window end, "HH:MM"
    pub quiet_end: Option<String>,
    /// IANA timezone the window is evaluated in
    pub quiet_tz: Option<String>,
    pub playback_target_id: String,
    pub playback_context_ref: String,
    /// Epoch seconds of the last admitted or observed motion
    pub last_motion_at: Option<i64>,
    /// Stored as VARCHAR in MySQL, converted to/from SensorStatus
    pub status: String,
    pub thing_handle: Option<String>,
    pub certificate_handle: Option<String>,
    pub firmware_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sensor {
    /// Assemble the quiet-hours window from the stored columns.
    ///
    /// A window exists only when all three columns are present.
    pub fn quiet_hours(&self) -> Option<QuietHours> {
        match (&self.quiet_start, &self.quiet_end, &self.quiet_tz) {
            (Some(start), Some(end), Some(tz)) => Some(QuietHours {
                start: start.clone(),
                end: end.clone(),
                timezone: tz.clone(),
            }),
            _ => None,
        }
    }
}

/// Sensor status enum (for API serialization only, not for sqlx)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    Registered,
    Active,
    Disabled,
    Error,
}

impl From<&str> for SensorStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "registered" => Self::Registered,
            "active" => Self::Active,
            "disabled" => Self::Disabled,
            _ => Self::Error,
        }
    }
}

impl From<SensorStatus> for String {
    fn from(s: SensorStatus) -> Self {
        match s {
            SensorStatus::Registered => "registered".to_string(),
            SensorStatus::Active => "active".to_string(),
            SensorStatus::Disabled => "disabled".to_string(),
            SensorStatus::Error => "error".to_string(),
        }
    }
}

/// Daily recurring window in a sensor's local time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuietHours {
    /// "HH:MM", 24-hour
    pub start: String,
    /// "HH:MM", 24-hour
    pub end: String,
    /// IANA timezone name, e.g. "Europe/London"
    pub timezone: String,
}

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: String,
    pub music_connected: bool,
    /// Opaque pointer into the secret store; non-null when connected
    pub token_ref: Option<String>,
    pub default_debounce_seconds: i32,
    pub default_timeout_seconds: i32,
    pub default_quiet_start: Option<String>,
    pub default_quiet_end: Option<String>,
    pub default_quiet_tz: Option<String>,
    pub notifications_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sensor creation request (written by the provisioner)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSensorRecord {
    pub sensor_id: String,
    pub user_id: String,
    pub location_label: Option<String>,
    pub motion_debounce_seconds: Option<i32>,
    pub inactivity_timeout_seconds: Option<i32>,
    pub status_report_interval_seconds: Option<i32>,
    pub led_enabled: Option<bool>,
    pub quiet_hours: Option<QuietHours>,
    pub playback_target_id: String,
    pub playback_context_ref: String,
    pub thing_handle: String,
    pub certificate_handle: String,
}

/// Sensor configuration update
///
/// Recognized device-side options are pushed to the sensor's config topic
/// after a successful write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSensorConfigRequest {
    pub enabled: Option<bool>,
    pub motion_debounce_seconds: Option<i32>,
    pub inactivity_timeout_seconds: Option<i32>,
    pub status_report_interval_seconds: Option<i32>,
    pub led_enabled: Option<bool>,
    pub quiet_hours: Option<QuietHours>,
    pub playback_target_id: Option<String>,
    pub playback_context_ref: Option<String>,
    pub location_label: Option<String>,
}

/// Validate a sensor id against the broker identity naming constraints.
///
/// Allowed: `[A-Za-z0-9_-]`, length 3..=128. Anything else would require
/// URL encoding in topic filters or break the identity name equality check.
pub fn validate_sensor_id(sensor_id: &str) -> bool {
    (3..=128).contains(&sensor_id.len())
        && sensor_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_id_shape() {
        assert!(validate_sensor_id("bathroom-main"));
        assert!(validate_sensor_id("bedroom_01"));
        assert!(validate_sensor_id("abc"));
        assert!(!validate_sensor_id("ab"));
        assert!(!validate_sensor_id("has space"));
        assert!(!validate_sensor_id("semi;colon"));
        assert!(!validate_sensor_id("sl/ash"));
        assert!(!validate_sensor_id(&"x".repeat(129)));
    }

    #[test]
    fn quiet_hours_requires_all_columns() {
        let mut sensor = sample_sensor();
        assert!(sensor.quiet_hours().is_some());

        sensor.quiet_tz = None;
        assert!(sensor.quiet_hours().is_none());
    }

    fn sample_sensor() -> Sensor {
        Sensor {
            sensor_id: "bathroom-main".into(),
            user_id: "u1".into(),
            location_label: Some("Main bathroom".into()),
            enabled: true,
            motion_debounce_seconds: 120,
            inactivity_timeout_seconds: 300,
            status_report_interval_seconds: 300,
            led_enabled: true,
            quiet_start: Some("22:00".into()),
            quiet_end: Some("07:00".into()),
            quiet_tz: Some("Europe/London".into()),
            playback_target_id: "D1".into(),
            playback_context_ref: "context:playlist:P".into(),
            last_motion_at: None,
            status: "registered".into(),
            thing_handle: Some("thing-1".into()),
            certificate_handle: Some("cert-1".into()),
            firmware_version: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
