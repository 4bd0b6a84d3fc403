//! Session store data types

use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Playback session row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub session_id: String,
    pub sensor_id: String,
    pub user_id: String,
    /// Stored as VARCHAR, `active` or `completed`
    pub status: String,
    /// Equals `sensor_id` while active, NULL once completed.
    /// Unique index on this column is the single-active-session witness.
    pub active_key: Option<String>,
    /// Epoch seconds
    pub start_at: i64,
    /// Epoch seconds of the last admitted motion
    pub last_motion_at: i64,
    /// Epoch seconds, NULL while active
    pub end_at: Option<i64>,
    pub motion_count: i32,
    pub playback_started: bool,
    pub duration_seconds: Option<i64>,
    /// Epoch seconds after which the retention purge may delete the row
    pub expire_at: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Session status enum (for API serialization only, not for sqlx)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl From<&str> for SessionStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "active" => Self::Active,
            _ => Self::Completed,
        }
    }
}

/// Append-only audit row, one per motion event delivered to the
/// orchestrator regardless of admission outcome
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MotionEvent {
    pub event_id: String,
    pub sensor_id: String,
    pub user_id: String,
    pub session_id: Option<String>,
    /// Epoch seconds (server-side event clock)
    pub occurred_at: i64,
    pub event_type: String,
    pub action_taken: String,
    pub battery_level: Option<i32>,
    pub signal_strength: Option<i32>,
    pub firmware_version: Option<String>,
    /// Set when the device timestamp was malformed and the server
    /// re-derived the event clock from receive time
    pub clock_rederived: bool,
    pub expire_at: i64,
    pub created_at: DateTime<Utc>,
}

/// Audit outcome of one motion delivery
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MotionEventType {
    Detected,
    Debounced,
    QuietHoursSuppressed,
    DisabledSuppressed,
    /// Reaper-emitted closure record; not a device motion
    SessionClosed,
}

impl MotionEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Debounced => "debounced",
            Self::QuietHoursSuppressed => "quiet-hours-suppressed",
            Self::DisabledSuppressed => "disabled-suppressed",
            Self::SessionClosed => "session-closed",
        }
    }
}

/// Device-reported metadata carried on the audit row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMetadata {
    pub battery_level: Option<i32>,
    pub signal_strength: Option<i32>,
    pub firmware_version: Option<String>,
    pub clock_rederived: bool,
}

/// Audit row insert
#[derive(Debug, Clone)]
pub struct NewMotionEvent {
    pub sensor_id: String,
    pub user_id: String,
    pub session_id: Option<String>,
    pub occurred_at: i64,
    pub event_type: MotionEventType,
    pub action_taken: String,
    pub metadata: EventMetadata,
}

/// Generate a session id: deterministic `{sensor}-{yyyymmddHHMMSS}` prefix
/// from the start instant plus a 4-char random suffix.
pub fn generate_session_id(sensor_id: &str, start_at: i64) -> String {
    let stamp = Utc
        .timestamp_opt(start_at, 0)
        .single()
        .map(|dt| dt.format("%Y%m%d%H%M%S").to_string())
        .unwrap_or_else(|| start_at.to_string());

    let rand_suffix: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(4)
        .map(|c| c.to_ascii_lowercase() as char)
        .collect();

    format!("{}-{}-{}", sensor_id, stamp, rand_suffix)
}

/// Generate an audit event id
pub fn generate_event_id(sensor_id: &str, occurred_at: i64) -> String {
    format!("evt-{}-{}-{}", sensor_id, occurred_at, uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_has_deterministic_prefix() {
        let a = generate_session_id("bathroom-main", 1_700_000_000);
        let b = generate_session_id("bathroom-main", 1_700_000_000);
        let prefix = "bathroom-main-20231114";
        assert!(a.starts_with(prefix), "{a}");
        assert!(b.starts_with(prefix), "{b}");
        // random suffix keeps ids distinct
        assert_ne!(a, b);
    }

    #[test]
    fn event_type_tags_match_wire_contract() {
        assert_eq!(MotionEventType::Detected.as_str(), "detected");
        assert_eq!(MotionEventType::Debounced.as_str(), "debounced");
        assert_eq!(
            MotionEventType::QuietHoursSuppressed.as_str(),
            "quiet-hours-suppressed"
        );
        assert_eq!(
            MotionEventType::DisabledSuppressed.as_str(),
            "disabled-suppressed"
        );
    }
}
