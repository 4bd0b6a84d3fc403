//! IngressRouter - Broker Event Dispatch
//!
//! ## Responsibilities
//!
//! - Decode and validate events delivered by the broker rule target
//! - Extract the sensor id from the topic (the payload may never
//!   override it)
//! - Dispatch motion to the orchestrator; record registration and status
//!   without creating sensors
//!
//! ## Failure policy
//!
//! Malformed payloads, topic mismatches and unknown event tags are
//! logged at warn, counted, and dropped. The handler never crashes on
//! bad input.

mod types;

pub use types::*;

use crate::error::{Error, Result};
use crate::motion_orchestrator::MotionOrchestrator;
use crate::registry::{Registry, SensorStatus};
use crate::session_store::EventMetadata;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Overall deadline for one ingest invocation
const HANDLER_DEADLINE: Duration = Duration::from_secs(30);

/// What the router did with one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Motion dispatched to the orchestrator
    Dispatched { session_id: Option<String> },
    /// Registration / status recorded, no orchestration
    Recorded,
    /// Dropped with a reason tag
    Dropped(&'static str),
}

/// Drop/dispatch counters, surfaced on the status route
#[derive(Default)]
pub struct IngressCounters {
    pub received: AtomicU64,
    pub dispatched: AtomicU64,
    pub malformed: AtomicU64,
    pub topic_invalid: AtomicU64,
    pub sensor_id_mismatch: AtomicU64,
    pub registrations: AtomicU64,
    pub status_reports: AtomicU64,
}

/// Counter snapshot for serialization
#[derive(Debug, Clone, Serialize)]
pub struct IngressCountersSnapshot {
    pub received: u64,
    pub dispatched: u64,
    pub malformed: u64,
    pub topic_invalid: u64,
    pub sensor_id_mismatch: u64,
    pub registrations: u64,
    pub status_reports: u64,
}

impl IngressCounters {
    pub fn snapshot(&self) -> IngressCountersSnapshot {
        IngressCountersSnapshot {
            received: self.received.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            topic_invalid: self.topic_invalid.load(Ordering::Relaxed),
            sensor_id_mismatch: self.sensor_id_mismatch.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
            status_reports: self.status_reports.load(Ordering::Relaxed),
        }
    }
}

/// IngressRouter instance
pub struct IngressRouter {
    registry: Arc<Registry>,
    orchestrator: Arc<MotionOrchestrator>,
    counters: IngressCounters,
}

impl IngressRouter {
    /// Create new IngressRouter
    pub fn new(registry: Arc<Registry>, orchestrator: Arc<MotionOrchestrator>) -> Self {
        Self {
            registry,
            orchestrator,
            counters: IngressCounters::default(),
        }
    }

    /// Counter snapshot
    pub fn counters(&self) -> IngressCountersSnapshot {
        self.counters.snapshot()
    }

    /// Route one decoded delivery.
    ///
    /// Validation failures drop the event (Ok(Dropped)); only downstream
    /// persistence/adapter errors surface as Err.
    pub async fn route(&self, event: DecodedEvent) -> Result<RouteOutcome> {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        let Some((sensor_id, kind)) = parse_topic(&event.topic) else {
            self.counters.topic_invalid.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(topic = %event.topic, "Unroutable topic, dropping");
            return Ok(RouteOutcome::Dropped("topic-invalid"));
        };

        match kind {
            TopicKind::Motion => {
                self.route_motion(&sensor_id, event).await
            }
            TopicKind::Register => self.route_registration(&sensor_id, event).await,
            TopicKind::Status => self.route_status(&sensor_id, event).await,
        }
    }

    async fn route_motion(&self, sensor_id: &str, event: DecodedEvent) -> Result<RouteOutcome> {
        let payload: MotionPayload = match serde_json::from_value::<DevicePayload>(event.payload) {
            Ok(DevicePayload::MotionDetected(m)) => m,
            Ok(other) => {
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    sensor_id = sensor_id,
                    payload = ?other,
                    "Non-motion payload on motion topic, dropping"
                );
                return Ok(RouteOutcome::Dropped("event-tag-mismatch"));
            }
            Err(e) => {
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    sensor_id = sensor_id,
                    error = %e,
                    "Malformed motion payload, dropping"
                );
                return Ok(RouteOutcome::Dropped("malformed-payload"));
            }
        };

        // The topic segment is authoritative; a disagreeing payload id is
        // a validation failure, not a fallback
        if payload.sensor_id != sensor_id {
            self.counters.sensor_id_mismatch.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                topic_sensor_id = sensor_id,
                payload_sensor_id = %payload.sensor_id,
                "Payload sensor id disagrees with topic, dropping"
            );
            return Ok(RouteOutcome::Dropped("sensor-id-mismatch"));
        }

        let (occurred_at, rederived) =
            resolve_event_clock(payload.timestamp.as_ref(), event.broker_timestamp);
        if rederived {
            tracing::debug!(
                sensor_id = sensor_id,
                occurred_at = occurred_at,
                "Device timestamp malformed or missing; re-derived server-side"
            );
        }

        let wire_meta = payload.metadata.unwrap_or_default();
        let metadata = EventMetadata {
            battery_level: wire_meta.battery_level,
            signal_strength: wire_meta.signal_strength,
            firmware_version: wire_meta.firmware_version,
            clock_rederived: rederived,
        };

        let handled = tokio::time::timeout(
            HANDLER_DEADLINE,
            self.orchestrator.handle_motion(sensor_id, occurred_at, metadata),
        )
        .await;

        match handled {
            Ok(Ok(outcome)) => {
                self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                Ok(RouteOutcome::Dispatched {
                    session_id: outcome.session_id,
                })
            }
            Ok(Err(Error::NotFound(msg))) => {
                // Unknown sensor/user: ingress drops rather than erroring
                tracing::warn!(sensor_id = sensor_id, reason = %msg, "Motion for unknown sensor, dropping");
                Ok(RouteOutcome::Dropped("not-found"))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Transient(format!(
                "Motion handler deadline ({}s) exceeded for {}",
                HANDLER_DEADLINE.as_secs(),
                sensor_id
            ))),
        }
    }

    async fn route_registration(
        &self,
        sensor_id: &str,
        event: DecodedEvent,
    ) -> Result<RouteOutcome> {
        let payload = match serde_json::from_value::<DevicePayload>(event.payload) {
            Ok(DevicePayload::Registration(r)) => r,
            Ok(_) | Err(_) => {
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(sensor_id = sensor_id, "Malformed registration announce, dropping");
                return Ok(RouteOutcome::Dropped("malformed-payload"));
            }
        };

        if payload.sensor_id != sensor_id {
            self.counters.sensor_id_mismatch.fetch_add(1, Ordering::Relaxed);
            return Ok(RouteOutcome::Dropped("sensor-id-mismatch"));
        }

        self.counters.registrations.fetch_add(1, Ordering::Relaxed);

        // Announces are surfaced but never create sensors; provisioning
        // is authoritative
        match self.registry.service().get_sensor(sensor_id).await? {
            Some(_) => {
                tracing::info!(
                    sensor_id = sensor_id,
                    firmware_version = ?payload.firmware_version,
                    "Registered device announced itself"
                );
                if let Some(version) = payload.firmware_version.as_deref() {
                    self.registry
                        .service()
                        .update_firmware_version(sensor_id, version)
                        .await?;
                }
            }
            None => {
                tracing::warn!(
                    sensor_id = sensor_id,
                    "Announce from unprovisioned device (ignored)"
                );
            }
        }

        Ok(RouteOutcome::Recorded)
    }

    async fn route_status(&self, sensor_id: &str, event: DecodedEvent) -> Result<RouteOutcome> {
        let payload: StatusPayload = match serde_json::from_value(event.payload) {
            Ok(p) => p,
            Err(e) => {
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(sensor_id = sensor_id, error = %e, "Malformed status payload, dropping");
                return Ok(RouteOutcome::Dropped("malformed-payload"));
            }
        };

        self.counters.status_reports.fetch_add(1, Ordering::Relaxed);

        if self.registry.service().get_sensor(sensor_id).await?.is_none() {
            tracing::debug!(sensor_id = sensor_id, "Status from unknown sensor, ignoring");
            return Ok(RouteOutcome::Dropped("not-found"));
        }

        match payload.status.as_str() {
            "online" => {
                self.registry
                    .service()
                    .update_sensor_status(sensor_id, SensorStatus::Active)
                    .await?;
            }
            "error" => {
                self.registry
                    .service()
                    .update_sensor_status(sensor_id, SensorStatus::Error)
                    .await?;
            }
            "low_battery" => {
                tracing::warn!(sensor_id = sensor_id, "Device reports low battery");
            }
            "offline" => {
                tracing::info!(sensor_id = sensor_id, "Device going offline");
            }
            other => {
                tracing::debug!(sensor_id = sensor_id, status = other, "Unrecognized status value");
            }
        }

        Ok(RouteOutcome::Recorded)
    }
}
