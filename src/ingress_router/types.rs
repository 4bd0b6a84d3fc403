//! Ingress wire types
//!
//! Incoming JSON becomes a tagged sum type; the router branches on the
//! tag and drops anything it cannot classify instead of best-effort
//! dispatching.

use serde::Deserialize;

/// One decoded delivery from the broker rule target
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedEvent {
    /// Full topic, e.g. `sensors/bathroom-main/motion`
    pub topic: String,
    /// Raw JSON payload as published by the device
    pub payload: serde_json::Value,
    /// Broker receive time, epoch seconds
    pub broker_timestamp: Option<i64>,
}

/// Topic leaf under `sensors/{sensorId}/`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    Motion,
    Register,
    Status,
}

/// Extract `(sensor_id, kind)` from a topic.
///
/// The sensor id segment is the only trusted id source; payload ids must
/// agree with it.
pub fn parse_topic(topic: &str) -> Option<(String, TopicKind)> {
    let mut parts = topic.split('/');
    if parts.next()? != "sensors" {
        return None;
    }
    let sensor_id = parts.next()?;
    if sensor_id.is_empty() {
        return None;
    }
    let kind = match parts.next()? {
        "motion" => TopicKind::Motion,
        "register" => TopicKind::Register,
        "status" => TopicKind::Status,
        _ => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((sensor_id.to_string(), kind))
}

/// Device payloads, discriminated on the `event` tag
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event")]
pub enum DevicePayload {
    #[serde(rename = "motion_detected")]
    MotionDetected(MotionPayload),
    #[serde(rename = "registration")]
    Registration(RegistrationPayload),
}

/// `sensors/{id}/motion` payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionPayload {
    pub sensor_id: String,
    /// Epoch seconds or ISO-8601; malformed values are re-derived
    /// server-side
    pub timestamp: Option<WireTimestamp>,
    pub metadata: Option<WireMetadata>,
}

/// `sensors/{id}/register` announce payload (informational; authoritative
/// registration is the provisioner)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationPayload {
    pub sensor_id: String,
    pub firmware_version: Option<String>,
}

/// `sensors/{id}/status` payload (no `event` tag on the wire)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub status: String,
    pub timestamp: Option<WireTimestamp>,
    pub ip_address: Option<String>,
    pub uptime: Option<i64>,
}

/// Device-reported metadata on motion events
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMetadata {
    pub battery_level: Option<i32>,
    pub signal_strength: Option<i32>,
    pub firmware_version: Option<String>,
    pub uptime: Option<i64>,
    pub free_heap: Option<i64>,
}

/// Timestamps arrive as epoch seconds or an ISO-8601 string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Epoch(i64),
    Iso(String),
}

impl WireTimestamp {
    /// Epoch seconds, if the value parses
    pub fn as_epoch(&self) -> Option<i64> {
        match self {
            WireTimestamp::Epoch(secs) if *secs > 0 => Some(*secs),
            WireTimestamp::Epoch(_) => None,
            WireTimestamp::Iso(s) => chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.timestamp()),
        }
    }
}

/// Resolve the event clock: device timestamp when well-formed, otherwise
/// re-derived from the broker receive time (or the server clock as a
/// last resort). The second field reports whether re-derivation happened.
pub fn resolve_event_clock(
    timestamp: Option<&WireTimestamp>,
    broker_timestamp: Option<i64>,
) -> (i64, bool) {
    if let Some(epoch) = timestamp.and_then(|t| t.as_epoch()) {
        return (epoch, false);
    }
    let fallback = broker_timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp());
    (fallback, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_parsing() {
        assert_eq!(
            parse_topic("sensors/bathroom-main/motion"),
            Some(("bathroom-main".to_string(), TopicKind::Motion))
        );
        assert_eq!(
            parse_topic("sensors/bedroom-01/register"),
            Some(("bedroom-01".to_string(), TopicKind::Register))
        );
        assert_eq!(
            parse_topic("sensors/bedroom-01/status"),
            Some(("bedroom-01".to_string(), TopicKind::Status))
        );
        assert_eq!(parse_topic("sensors/bedroom-01/config"), None);
        assert_eq!(parse_topic("sensors//motion"), None);
        assert_eq!(parse_topic("other/bedroom-01/motion"), None);
        assert_eq!(parse_topic("sensors/bedroom-01/motion/extra"), None);
    }

    #[test]
    fn motion_payload_decodes_with_tag() {
        let value = serde_json::json!({
            "event": "motion_detected",
            "sensorId": "bathroom-main",
            "timestamp": 1700000000,
            "metadata": { "batteryLevel": 87, "signalStrength": -61 }
        });
        let payload: DevicePayload = serde_json::from_value(value).unwrap();
        match payload {
            DevicePayload::MotionDetected(m) => {
                assert_eq!(m.sensor_id, "bathroom-main");
                assert_eq!(m.timestamp.unwrap().as_epoch(), Some(1_700_000_000));
                assert_eq!(m.metadata.unwrap().battery_level, Some(87));
            }
            other => panic!("expected motion, got {other:?}"),
        }
    }

    #[test]
    fn unknown_event_tag_is_rejected() {
        let value = serde_json::json!({ "event": "motion_cleared", "sensorId": "x" });
        assert!(serde_json::from_value::<DevicePayload>(value).is_err());
    }

    #[test]
    fn iso_timestamps_parse() {
        let ts = WireTimestamp::Iso("2023-11-14T22:13:20Z".to_string());
        assert_eq!(ts.as_epoch(), Some(1_700_000_000));

        let bad = WireTimestamp::Iso("yesterday".to_string());
        assert_eq!(bad.as_epoch(), None);
    }

    #[test]
    fn malformed_timestamp_is_rederived() {
        let bad = WireTimestamp::Iso("not-a-time".to_string());
        let (epoch, rederived) = resolve_event_clock(Some(&bad), Some(1_700_000_123));
        assert_eq!(epoch, 1_700_000_123);
        assert!(rederived);

        let (epoch, rederived) = resolve_event_clock(Some(&WireTimestamp::Epoch(42)), None);
        // epoch 42 is within range
        assert_eq!(epoch, 42);
        assert!(!rederived);

        let (_, rederived) = resolve_event_clock(None, Some(1_700_000_123));
        assert!(rederived);
    }
}
