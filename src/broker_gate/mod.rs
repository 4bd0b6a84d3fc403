//! BrokerGate - Broker Control-Plane Integration
//!
//! ## Responsibilities
//!
//! - Device identity ("thing") lifecycle
//! - Certificate principal registration and binding
//! - Topic-scoped authorization policies
//! - Server-side publish to device config/commands topics
//!
//! The trait seam keeps the provisioner testable against an in-memory
//! control plane.

mod certs;
mod client;
mod types;

pub use certs::mint_device_certificate;
pub use client::BrokerGateClient;
pub use types::*;

use crate::error::Result;
use async_trait::async_trait;

/// Broker control-plane operations the core depends on
#[async_trait]
pub trait BrokerControlPlane: Send + Sync {
    /// mTLS endpoint devices connect to (host:port)
    fn device_endpoint(&self) -> String;

    /// Deployment region label echoed in provisioning results
    fn region(&self) -> String;

    /// Create a device identity; returns its handle.
    /// Fails with Conflict when the name is taken.
    async fn create_identity(&self, name: &str) -> Result<String>;

    /// Delete a device identity (already-gone is success)
    async fn delete_identity(&self, handle: &str) -> Result<()>;

    /// Register certificate material as a principal; returns its handle
    async fn register_certificate(&self, certificate_pem: &str) -> Result<String>;

    /// Mark a certificate inactive (already-gone is success)
    async fn deactivate_certificate(&self, certificate_handle: &str) -> Result<()>;

    /// Delete a certificate (already-gone is success)
    async fn delete_certificate(&self, certificate_handle: &str) -> Result<()>;

    /// Attach a certificate principal to an identity
    async fn attach_certificate(
        &self,
        identity_handle: &str,
        certificate_handle: &str,
    ) -> Result<()>;

    /// Detach a certificate principal (already-gone is success)
    async fn detach_certificate(
        &self,
        identity_handle: &str,
        certificate_handle: &str,
    ) -> Result<()>;

    /// List certificate principals attached to an identity
    async fn list_principals(&self, identity_handle: &str) -> Result<Vec<String>>;

    /// Bind an authorization policy to a certificate principal
    async fn attach_policy(
        &self,
        certificate_handle: &str,
        policy_name: &str,
        policy_document: &serde_json::Value,
    ) -> Result<()>;

    /// Unbind a policy (already-gone is success)
    async fn detach_policy(&self, certificate_handle: &str, policy_name: &str) -> Result<()>;

    /// Publish a JSON payload to a topic (QoS 1)
    async fn publish(&self, topic: &str, payload: &serde_json::Value) -> Result<()>;
}
