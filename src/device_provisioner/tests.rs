use super::{run_broker_ceremony, teardown_broker_artifacts};
use crate::broker_gate::BrokerControlPlane;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Mutex;

/// In-memory control plane that records every call and can be told to
/// fail at a single named operation.
struct MockBroker {
    calls: Mutex<Vec<String>>,
    fail_on: Option<&'static str>,
}

impl MockBroker {
    fn new(fail_on: Option<&'static str>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on,
        }
    }

    fn record(&self, op: &str, detail: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("{op}:{detail}"));
        if self.fail_on == Some(op) {
            return Err(Error::Transient(format!("injected failure at {op}")));
        }
        Ok(())
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrokerControlPlane for MockBroker {
    fn device_endpoint(&self) -> String {
        "broker.test:8883".to_string()
    }

    fn region(&self) -> String {
        "test-region".to_string()
    }

    async fn create_identity(&self, name: &str) -> Result<String> {
        self.record("create_identity", name)?;
        Ok(format!("thing-{name}"))
    }

    async fn delete_identity(&self, handle: &str) -> Result<()> {
        self.record("delete_identity", handle)
    }

    async fn register_certificate(&self, _certificate_pem: &str) -> Result<String> {
        self.record("register_certificate", "pem")?;
        Ok("cert-1".to_string())
    }

    async fn deactivate_certificate(&self, certificate_handle: &str) -> Result<()> {
        self.record("deactivate_certificate", certificate_handle)
    }

    async fn delete_certificate(&self, certificate_handle: &str) -> Result<()> {
        self.record("delete_certificate", certificate_handle)
    }

    async fn attach_certificate(
        &self,
        identity_handle: &str,
        certificate_handle: &str,
    ) -> Result<()> {
        self.record(
            "attach_certificate",
            &format!("{identity_handle}+{certificate_handle}"),
        )
    }

    async fn detach_certificate(
        &self,
        identity_handle: &str,
        certificate_handle: &str,
    ) -> Result<()> {
        self.record(
            "detach_certificate",
            &format!("{identity_handle}+{certificate_handle}"),
        )
    }

    async fn list_principals(&self, identity_handle: &str) -> Result<Vec<String>> {
        self.record("list_principals", identity_handle)?;
        Ok(vec!["cert-1".to_string()])
    }

    async fn attach_policy(
        &self,
        certificate_handle: &str,
        policy_name: &str,
        _policy_document: &serde_json::Value,
    ) -> Result<()> {
        self.record("attach_policy", &format!("{certificate_handle}+{policy_name}"))
    }

    async fn detach_policy(&self, certificate_handle: &str, policy_name: &str) -> Result<()> {
        self.record("detach_policy", &format!("{certificate_handle}+{policy_name}"))
    }

    async fn publish(&self, topic: &str, _payload: &serde_json::Value) -> Result<()> {
        self.record("publish", topic)
    }
}

fn ops(calls: &[String]) -> Vec<&str> {
    calls.iter().map(|c| c.split(':').next().unwrap()).collect()
}

#[tokio::test]
async fn ceremony_runs_steps_in_order() {
    let broker = MockBroker::new(None);
    let artifacts = run_broker_ceremony(&broker, "bedroom-01").await.unwrap();

    assert_eq!(artifacts.thing_handle, "thing-bedroom-01");
    assert_eq!(artifacts.certificate_handle, "cert-1");
    assert!(artifacts.minted.certificate_pem.contains("BEGIN CERTIFICATE"));

    assert_eq!(
        ops(&broker.calls()),
        vec![
            "create_identity",
            "register_certificate",
            "attach_certificate",
            "attach_policy",
        ]
    );
}

#[tokio::test]
async fn policy_failure_unwinds_in_reverse_order() {
    let broker = MockBroker::new(Some("attach_policy"));
    let err = run_broker_ceremony(&broker, "bedroom-01").await.unwrap_err();
    assert!(err.is_transient());

    assert_eq!(
        ops(&broker.calls()),
        vec![
            "create_identity",
            "register_certificate",
            "attach_certificate",
            "attach_policy",
            // unwind, newest artifact first
            "detach_certificate",
            "deactivate_certificate",
            "delete_certificate",
            "delete_identity",
        ]
    );
}

#[tokio::test]
async fn certificate_failure_unwinds_only_the_identity() {
    let broker = MockBroker::new(Some("register_certificate"));
    run_broker_ceremony(&broker, "bedroom-01").await.unwrap_err();

    assert_eq!(
        ops(&broker.calls()),
        vec!["create_identity", "register_certificate", "delete_identity"]
    );
}

#[tokio::test]
async fn teardown_continues_past_failing_steps() {
    // delete_certificate fails mid-teardown; delete_identity still runs
    let broker = MockBroker::new(Some("delete_certificate"));
    teardown_broker_artifacts(&broker, "bedroom-01", "thing-bedroom-01", &["cert-1".into()])
        .await;

    assert_eq!(
        ops(&broker.calls()),
        vec![
            "detach_policy",
            "detach_certificate",
            "deactivate_certificate",
            "delete_certificate",
            "delete_identity",
        ]
    );
}

#[tokio::test]
async fn teardown_is_safe_to_repeat() {
    let broker = MockBroker::new(None);
    teardown_broker_artifacts(&broker, "bedroom-01", "thing-bedroom-01", &["cert-1".into()])
        .await;
    teardown_broker_artifacts(&broker, "bedroom-01", "thing-bedroom-01", &["cert-1".into()])
        .await;

    // same sequence twice, no step refuses the second pass
    let calls = broker.calls();
    assert_eq!(calls.len(), 10);
    assert_eq!(ops(&calls[..5]), ops(&calls[5..]));
}
