//! DeviceProvisioner - Device Identity Lifecycle
//!
//! ## Responsibilities
//!
//! - Provision: identity, certificate, policy binding, registry record,
//!   credential bundle (returned exactly once)
//! - Deprovision: the inverse, idempotent, tolerating already-gone
//!
//! ## Failure handling
//!
//! Provisioning is a linear script. As each broker-side step succeeds a
//! cleanup entry is pushed; on failure the accumulated list is walked in
//! reverse, best-effort. The sensor record is written last, so its
//! presence is the authoritative signal of a successful provision.

mod types;

pub use types::*;

use crate::broker_gate::{
    device_policy_document, device_policy_name, mint_device_certificate, BrokerControlPlane,
    MintedCertificate, MqttTopics,
};
use crate::error::{Error, Result};
use crate::registry::{validate_sensor_id, CreateSensorRecord, Registry};
use std::sync::Arc;

/// Broker-side artifacts created during provisioning
#[derive(Debug)]
struct BrokerArtifacts {
    thing_handle: String,
    certificate_handle: String,
    minted: MintedCertificate,
}

/// Reverse-order cleanup entries
enum CleanupStep {
    DetachPolicy {
        certificate_handle: String,
        policy_name: String,
    },
    DetachCertificate {
        thing_handle: String,
        certificate_handle: String,
    },
    DeleteCertificate {
        certificate_handle: String,
    },
    DeleteIdentity {
        thing_handle: String,
    },
}

/// DeviceProvisioner instance
pub struct DeviceProvisioner {
    registry: Arc<Registry>,
    broker: Arc<dyn BrokerControlPlane>,
}

impl DeviceProvisioner {
    /// Create new DeviceProvisioner
    pub fn new(registry: Arc<Registry>, broker: Arc<dyn BrokerControlPlane>) -> Self {
        Self { registry, broker }
    }

    /// Provision a device: identity, certificate, policy, record.
    pub async fn provision(&self, req: ProvisionRequest) -> Result<CredentialBundle> {
        if !validate_sensor_id(&req.sensor_id) {
            return Err(Error::Validation(format!(
                "sensor_id {:?} must match [A-Za-z0-9_-]{{3,128}}",
                req.sensor_id
            )));
        }

        if self.registry.service().get_sensor(&req.sensor_id).await?.is_some() {
            return Err(Error::Conflict(format!(
                "Sensor {} is already provisioned",
                req.sensor_id
            )));
        }

        let artifacts = run_broker_ceremony(self.broker.as_ref(), &req.sensor_id).await?;

        // The record write is the last step; a failure here unwinds the
        // whole broker ceremony
        let record = CreateSensorRecord {
            sensor_id: req.sensor_id.clone(),
            user_id: req.user_id.clone(),
            location_label: req.location_label.clone(),
            motion_debounce_seconds: req.motion_debounce_seconds,
            inactivity_timeout_seconds: req.inactivity_timeout_seconds,
            status_report_interval_seconds: req.status_report_interval_seconds,
            led_enabled: req.led_enabled,
            quiet_hours: req.quiet_hours.clone(),
            playback_target_id: req.playback_target_id.clone(),
            playback_context_ref: req.playback_context_ref.clone(),
            thing_handle: artifacts.thing_handle.clone(),
            certificate_handle: artifacts.certificate_handle.clone(),
        };

        if let Err(e) = self.registry.service().create_sensor(record).await {
            tracing::error!(
                sensor_id = %req.sensor_id,
                error = %e,
                "Sensor record write failed, unwinding broker artifacts"
            );
            teardown_broker_artifacts(
                self.broker.as_ref(),
                &req.sensor_id,
                &artifacts.thing_handle,
                &[artifacts.certificate_handle.clone()],
            )
            .await;
            return Err(e);
        }

        tracing::info!(
            sensor_id = %req.sensor_id,
            user_id = %req.user_id,
            thing_handle = %artifacts.thing_handle,
            certificate_handle = %artifacts.certificate_handle,
            "Device provisioned"
        );

        Ok(CredentialBundle {
            sensor_id: req.sensor_id.clone(),
            thing_handle: artifacts.thing_handle,
            certificate_handle: artifacts.certificate_handle,
            certificate_pem: artifacts.minted.certificate_pem,
            private_key_pem: artifacts.minted.private_key_pem,
            broker_endpoint: self.broker.device_endpoint(),
            policy_name: device_policy_name(&req.sensor_id),
            region: self.broker.region(),
            mqtt_topics: MqttTopics::for_sensor(&req.sensor_id),
            warning: PRIVATE_KEY_WARNING.to_string(),
        })
    }

    /// Tear down a device. Idempotent: each step tolerates already-gone,
    /// and a partial previous run is completed by the next call. The
    /// record is deleted last, so a second call returns NotFound only
    /// once everything is actually gone.
    pub async fn deprovision(&self, sensor_id: &str) -> Result<()> {
        let sensor = self.registry.service().require_sensor(sensor_id).await?;

        if let Some(thing_handle) = sensor.thing_handle.as_deref() {
            let principals = match self.broker.list_principals(thing_handle).await {
                Ok(principals) if !principals.is_empty() => principals,
                Ok(_) => {
                    // Nothing attached (or identity gone); fall back to
                    // the recorded handle so orphaned certificates from a
                    // partial provision still get cleaned up
                    sensor.certificate_handle.clone().into_iter().collect()
                }
                Err(e) => {
                    tracing::warn!(
                        sensor_id = sensor_id,
                        error = %e,
                        "Principal listing failed, using recorded certificate handle"
                    );
                    sensor.certificate_handle.clone().into_iter().collect()
                }
            };

            teardown_broker_artifacts(self.broker.as_ref(), sensor_id, thing_handle, &principals)
                .await;
        }

        self.registry.service().delete_sensor(sensor_id).await?;

        tracing::info!(sensor_id = sensor_id, "Device deprovisioned");
        Ok(())
    }
}

/// Steps 3-6 of provisioning: identity, certificate, attachment, policy.
/// On failure the accumulated cleanup list is walked in reverse.
async fn run_broker_ceremony(
    broker: &dyn BrokerControlPlane,
    sensor_id: &str,
) -> Result<BrokerArtifacts> {
    let mut cleanup: Vec<CleanupStep> = Vec::new();

    let result = async {
        let thing_handle = broker.create_identity(sensor_id).await?;
        cleanup.push(CleanupStep::DeleteIdentity {
            thing_handle: thing_handle.clone(),
        });

        // Key material exists only in this value until the bundle is
        // handed to the caller
        let minted = mint_device_certificate(sensor_id)?;

        let certificate_handle = broker.register_certificate(&minted.certificate_pem).await?;
        cleanup.push(CleanupStep::DeleteCertificate {
            certificate_handle: certificate_handle.clone(),
        });

        broker
            .attach_certificate(&thing_handle, &certificate_handle)
            .await?;
        cleanup.push(CleanupStep::DetachCertificate {
            thing_handle: thing_handle.clone(),
            certificate_handle: certificate_handle.clone(),
        });

        let policy_name = device_policy_name(sensor_id);
        broker
            .attach_policy(
                &certificate_handle,
                &policy_name,
                &device_policy_document(sensor_id),
            )
            .await?;
        cleanup.push(CleanupStep::DetachPolicy {
            certificate_handle: certificate_handle.clone(),
            policy_name,
        });

        Ok(BrokerArtifacts {
            thing_handle,
            certificate_handle,
            minted,
        })
    }
    .await;

    match result {
        Ok(artifacts) => Ok(artifacts),
        Err(e) => {
            tracing::error!(
                sensor_id = sensor_id,
                error = %e,
                "Provisioning step failed, walking cleanup list"
            );
            unwind(broker, cleanup).await;
            Err(e)
        }
    }
}

/// Walk a cleanup list in reverse, best-effort
async fn unwind(broker: &dyn BrokerControlPlane, cleanup: Vec<CleanupStep>) {
    for step in cleanup.into_iter().rev() {
        let outcome = match &step {
            CleanupStep::DetachPolicy {
                certificate_handle,
                policy_name,
            } => broker.detach_policy(certificate_handle, policy_name).await,
            CleanupStep::DetachCertificate {
                thing_handle,
                certificate_handle,
            } => {
                broker
                    .detach_certificate(thing_handle, certificate_handle)
                    .await
            }
            CleanupStep::DeleteCertificate { certificate_handle } => {
                let deactivated = broker.deactivate_certificate(certificate_handle).await;
                if let Err(e) = deactivated {
                    tracing::warn!(certificate_handle = %certificate_handle, error = %e, "Deactivate during unwind failed");
                }
                broker.delete_certificate(certificate_handle).await
            }
            CleanupStep::DeleteIdentity { thing_handle } => {
                broker.delete_identity(thing_handle).await
            }
        };

        if let Err(e) = outcome {
            tracing::warn!(error = %e, "Cleanup step failed, continuing");
        }
    }
}

/// Full teardown of broker-side artifacts for a sensor: per certificate
/// detach policy, detach from identity, deactivate, delete; then delete
/// the identity. Every step tolerates already-gone.
async fn teardown_broker_artifacts(
    broker: &dyn BrokerControlPlane,
    sensor_id: &str,
    thing_handle: &str,
    certificate_handles: &[String],
) {
    let policy_name = device_policy_name(sensor_id);

    for certificate_handle in certificate_handles {
        if let Err(e) = broker.detach_policy(certificate_handle, &policy_name).await {
            tracing::warn!(certificate_handle = %certificate_handle, error = %e, "Policy detach failed, continuing");
        }
        if let Err(e) = broker.detach_certificate(thing_handle, certificate_handle).await {
            tracing::warn!(certificate_handle = %certificate_handle, error = %e, "Certificate detach failed, continuing");
        }
        if let Err(e) = broker.deactivate_certificate(certificate_handle).await {
            tracing::warn!(certificate_handle = %certificate_handle, error = %e, "Certificate deactivate failed, continuing");
        }
        if let Err(e) = broker.delete_certificate(certificate_handle).await {
            tracing::warn!(certificate_handle = %certificate_handle, error = %e, "Certificate delete failed, continuing");
        }
    }

    if let Err(e) = broker.delete_identity(thing_handle).await {
        tracing::warn!(thing_handle = %thing_handle, error = %e, "Identity delete failed, continuing");
    }
}

#[cfg(test)]
mod tests;
