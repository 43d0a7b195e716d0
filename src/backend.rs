//! Boundary to the external central-system integration.
//!
//! The gateway core never implements business effects itself: boot approval,
//! transaction authorization and telemetry ingestion all live behind
//! [`BackendClient`]. In return, the backend receives a [`PushHandle`] at
//! startup so it can push unsolicited frames to a specific charger by
//! identity.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;

use crate::protocol::OcppFrame;
use crate::session::{SendError, SharedRegistry};

/// Failure reported by the backend. Always logged and swallowed by the
/// dispatch path; never aborts message processing for the charger.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend rejected {action}: {reason}")]
    Rejected { action: String, reason: String },

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Telemetry forwarded to the backend, fire-and-forget.
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// The charger checked in.
    Heartbeat,
    /// One sampled meter value with an energy/power unit.
    MeterSample {
        connector_id: Option<i64>,
        transaction_id: Option<i64>,
        value: String,
        unit: String,
        measurand: Option<String>,
    },
    /// Connector status change.
    Status {
        connector_id: Option<i64>,
        status: Option<String>,
        error_code: Option<String>,
    },
}

/// The gateway's outbound entry point handed to the backend, so it can send
/// frames to a charger without touching the registry directly.
#[derive(Clone)]
pub struct PushHandle {
    registry: SharedRegistry,
}

impl PushHandle {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    /// Push a frame to the charger currently registered under `identity`.
    pub fn send(&self, identity: &str, frame: &OcppFrame) -> Result<(), SendError> {
        self.registry.send_to(identity, frame)
    }

    pub fn is_connected(&self, identity: &str) -> bool {
        self.registry.is_connected(identity)
    }
}

/// Central-system integration consumed by the dispatcher.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Forward a BootNotification; the returned payload becomes the
    /// CallResult sent back to the charger.
    async fn send_boot_notification(
        &self,
        identity: &str,
        payload: &Value,
    ) -> Result<Value, BackendError>;

    /// Forward Authorize/StartTransaction/StopTransaction as a transaction
    /// event. No synchronous reply is produced for the charger.
    async fn send_transaction_event(
        &self,
        identity: &str,
        action: &str,
        payload: &Value,
    ) -> Result<(), BackendError>;

    /// Forward a telemetry event.
    async fn send_telemetry(
        &self,
        identity: &str,
        event: TelemetryEvent,
    ) -> Result<(), BackendError>;

    /// Registration hook, called once at startup with the gateway's push
    /// entry point. Default implementation discards it.
    fn bind_push(&self, _push: PushHandle) {}
}

/// Standalone backend used by the binary when no real central system is
/// wired in: accepts every boot and logs everything else.
pub struct LoggingBackend {
    heartbeat_interval: i64,
    push: std::sync::Mutex<Option<PushHandle>>,
}

impl LoggingBackend {
    pub fn new(heartbeat_interval: i64) -> Self {
        Self {
            heartbeat_interval,
            push: std::sync::Mutex::new(None),
        }
    }

    pub fn shared(heartbeat_interval: i64) -> Arc<Self> {
        Arc::new(Self::new(heartbeat_interval))
    }

    /// Push channel received at startup, if the gateway has registered one.
    pub fn push_handle(&self) -> Option<PushHandle> {
        self.push.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendClient for LoggingBackend {
    async fn send_boot_notification(
        &self,
        identity: &str,
        payload: &Value,
    ) -> Result<Value, BackendError> {
        info!(charge_point_id = identity, payload = %payload, "boot notification");
        Ok(json!({
            "status": "Accepted",
            "currentTime": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "interval": self.heartbeat_interval,
        }))
    }

    async fn send_transaction_event(
        &self,
        identity: &str,
        action: &str,
        payload: &Value,
    ) -> Result<(), BackendError> {
        info!(charge_point_id = identity, action, payload = %payload, "transaction event");
        Ok(())
    }

    async fn send_telemetry(
        &self,
        identity: &str,
        event: TelemetryEvent,
    ) -> Result<(), BackendError> {
        info!(charge_point_id = identity, event = ?event, "telemetry event");
        Ok(())
    }

    fn bind_push(&self, push: PushHandle) {
        *self.push.lock().unwrap() = Some(push);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConnectionRegistry;

    #[tokio::test]
    async fn logging_backend_accepts_boot() {
        let backend = LoggingBackend::new(300);
        let reply = backend
            .send_boot_notification("CP001", &json!({"chargePointVendor": "V"}))
            .await
            .unwrap();
        assert_eq!(reply["status"], "Accepted");
        assert_eq!(reply["interval"], 300);
        assert!(reply["currentTime"].is_string());
    }

    #[tokio::test]
    async fn push_handle_reports_connectivity() {
        let registry = ConnectionRegistry::shared();
        let push = PushHandle::new(registry);
        assert!(!push.is_connected("CP001"));
        let frame = OcppFrame::CallResult {
            unique_id: "1".into(),
            payload: json!({}),
        };
        assert!(push.send("CP001", &frame).is_err());
    }

    #[test]
    fn bind_push_stores_the_handle() {
        let backend = LoggingBackend::new(300);
        assert!(backend.push_handle().is_none());
        backend.bind_push(PushHandle::new(ConnectionRegistry::shared()));
        assert!(backend.push_handle().is_some());
    }
}
