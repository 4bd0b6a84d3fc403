//! Broker management API client
//!
//! REST adapter over the broker's control plane: device identities
//! ("things"), certificate principals, authorization policies, and
//! server-side publish. Delete paths tolerate "already gone" so teardown
//! stays idempotent.

use super::BrokerControlPlane;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Broker control-plane HTTP client
#[derive(Clone)]
pub struct BrokerGateClient {
    http: Client,
    /// Management API base, e.g. http://broker.internal:18083/api/v1
    base_url: String,
    /// mTLS endpoint handed to devices, e.g. broker.example.com:8883
    device_endpoint: String,
    region: String,
}

#[derive(Debug, Deserialize)]
struct HandleResponse {
    handle: String,
}

#[derive(Debug, Deserialize)]
struct PrincipalListResponse {
    principals: Vec<String>,
}

impl BrokerGateClient {
    /// Create new client
    pub fn new(base_url: String, device_endpoint: String, region: String) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            base_url,
            device_endpoint,
            region,
        }
    }

    fn unexpected(context: &str, status: StatusCode) -> Error {
        if status.is_server_error() {
            Error::Transient(format!("{context}: broker gate returned {status}"))
        } else {
            Error::Internal(format!("{context}: broker gate returned {status}"))
        }
    }
}

#[async_trait]
impl BrokerControlPlane for BrokerGateClient {
    fn device_endpoint(&self) -> String {
        self.device_endpoint.clone()
    }

    fn region(&self) -> String {
        self.region.clone()
    }

    async fn create_identity(&self, name: &str) -> Result<String> {
        let url = format!("{}/things", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::CONFLICT {
            return Err(Error::Conflict(format!(
                "Broker identity {name} already exists"
            )));
        }
        if !status.is_success() {
            return Err(Self::unexpected("create_identity", status));
        }

        let body: HandleResponse = resp.json().await?;
        tracing::info!(identity = name, handle = %body.handle, "Broker identity created");
        Ok(body.handle)
    }

    async fn delete_identity(&self, handle: &str) -> Result<()> {
        let url = format!(
            "{}/things/{}",
            self.base_url,
            urlencoding::encode(handle)
        );
        let resp = self.http.delete(&url).send().await?;

        let status = resp.status();
        // Already gone is success for teardown
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(Self::unexpected("delete_identity", status))
    }

    async fn register_certificate(&self, certificate_pem: &str) -> Result<String> {
        let url = format!("{}/certificates", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "certificate_pem": certificate_pem, "active": true }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Self::unexpected("register_certificate", status));
        }

        let body: HandleResponse = resp.json().await?;
        Ok(body.handle)
    }

    async fn deactivate_certificate(&self, certificate_handle: &str) -> Result<()> {
        let url = format!(
            "{}/certificates/{}/status",
            self.base_url,
            urlencoding::encode(certificate_handle)
        );
        let resp = self
            .http
            .put(&url)
            .json(&serde_json::json!({ "active": false }))
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(Self::unexpected("deactivate_certificate", status))
    }

    async fn delete_certificate(&self, certificate_handle: &str) -> Result<()> {
        let url = format!(
            "{}/certificates/{}",
            self.base_url,
            urlencoding::encode(certificate_handle)
        );
        let resp = self.http.delete(&url).send().await?;

        let status = resp.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(Self::unexpected("delete_certificate", status))
    }

    async fn attach_certificate(
        &self,
        identity_handle: &str,
        certificate_handle: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/things/{}/principals",
            self.base_url,
            urlencoding::encode(identity_handle)
        );
        let resp = self
            .http
            .put(&url)
            .json(&serde_json::json!({ "certificate": certificate_handle }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Self::unexpected("attach_certificate", status));
        }
        Ok(())
    }

    async fn detach_certificate(
        &self,
        identity_handle: &str,
        certificate_handle: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/things/{}/principals/{}",
            self.base_url,
            urlencoding::encode(identity_handle),
            urlencoding::encode(certificate_handle)
        );
        let resp = self.http.delete(&url).send().await?;

        let status = resp.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(Self::unexpected("detach_certificate", status))
    }

    async fn list_principals(&self, identity_handle: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/things/{}/principals",
            self.base_url,
            urlencoding::encode(identity_handle)
        );
        let resp = self.http.get(&url).send().await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(Self::unexpected("list_principals", status));
        }

        let body: PrincipalListResponse = resp.json().await?;
        Ok(body.principals)
    }

    async fn attach_policy(
        &self,
        certificate_handle: &str,
        policy_name: &str,
        policy_document: &serde_json::Value,
    ) -> Result<()> {
        let url = format!(
            "{}/policies/{}",
            self.base_url,
            urlencoding::encode(policy_name)
        );
        let resp = self
            .http
            .put(&url)
            .json(&serde_json::json!({
                "document": policy_document,
                "principal": certificate_handle,
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Self::unexpected("attach_policy", status));
        }
        Ok(())
    }

    async fn detach_policy(&self, certificate_handle: &str, policy_name: &str) -> Result<()> {
        let url = format!(
            "{}/policies/{}/principals/{}",
            self.base_url,
            urlencoding::encode(policy_name),
            urlencoding::encode(certificate_handle)
        );
        let resp = self.http.delete(&url).send().await?;

        let status = resp.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(Self::unexpected("detach_policy", status))
    }

    async fn publish(&self, topic: &str, payload: &serde_json::Value) -> Result<()> {
        let url = format!("{}/publish", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "topic": topic,
                "qos": 1,
                "payload": payload,
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Self::unexpected("publish", status));
        }

        tracing::debug!(topic = topic, "Published to broker");
        Ok(())
    }
}
