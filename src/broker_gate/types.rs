//! Broker gate data types

use serde::{Deserialize, Serialize};

/// Freshly minted device credential material.
///
/// The private key exists only in this value for the lifetime of the
/// provisioning call; nothing reads it back afterwards.
#[derive(Debug, Clone)]
pub struct MintedCertificate {
    pub certificate_pem: String,
    pub private_key_pem: String,
}

/// The four device-facing topics for a sensor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MqttTopics {
    pub motion: String,
    pub status: String,
    pub register: String,
    pub config: String,
    pub commands: String,
}

impl MqttTopics {
    /// Build the topic set for a sensor id
    pub fn for_sensor(sensor_id: &str) -> Self {
        Self {
            motion: format!("sensors/{sensor_id}/motion"),
            status: format!("sensors/{sensor_id}/status"),
            register: format!("sensors/{sensor_id}/register"),
            config: format!("sensors/{sensor_id}/config"),
            commands: format!("sensors/{sensor_id}/commands"),
        }
    }
}

/// Topic-scoped authorization policy bound to a device certificate:
/// publish only on motion/status/register, subscribe only on
/// config/commands, connect only as the identity name.
pub fn device_policy_document(sensor_id: &str) -> serde_json::Value {
    let topics = MqttTopics::for_sensor(sensor_id);
    serde_json::json!({
        "version": 1,
        "connect": { "client_id": sensor_id },
        "publish": [topics.motion, topics.status, topics.register],
        "subscribe": [topics.config, topics.commands],
    })
}

/// Policy name for a sensor
pub fn device_policy_name(sensor_id: &str) -> String {
    format!("sensor-policy-{sensor_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_are_sensor_scoped() {
        let t = MqttTopics::for_sensor("bedroom-01");
        assert_eq!(t.motion, "sensors/bedroom-01/motion");
        assert_eq!(t.config, "sensors/bedroom-01/config");
        assert_eq!(t.commands, "sensors/bedroom-01/commands");
    }

    #[test]
    fn policy_scopes_publish_and_subscribe() {
        let doc = device_policy_document("bedroom-01");
        let publish = doc["publish"].as_array().unwrap();
        assert_eq!(publish.len(), 3);
        assert!(publish.iter().all(|t| {
            t.as_str().unwrap().starts_with("sensors/bedroom-01/")
        }));
        let subscribe = doc["subscribe"].as_array().unwrap();
        assert_eq!(subscribe.len(), 2);
        assert_eq!(doc["connect"]["client_id"], "bedroom-01");
    }
}
