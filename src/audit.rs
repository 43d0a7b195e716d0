//! Best-effort forwarding of protocol traffic to an external log collector.
//!
//! Every inbound Call and every produced reply is offered to the collector
//! as a JSON body `{command, chargerIdentity, payload}`. Delivery is
//! fire-and-forget: no retry, no back-pressure on the protocol loop, and a
//! missing endpoint disables forwarding entirely.

use serde_json::{json, Value};
use tracing::{debug, warn};

/// Fire-and-forget client for the external log collector.
pub struct AuditLogger {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl AuditLogger {
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    /// Forwarding is disabled when no endpoint is configured.
    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Offer one entry to the collector. Returns immediately; the POST runs
    /// in a detached task and a non-success response is logged, not retried.
    pub fn record(&self, identity: &str, command: &str, payload: &Value) {
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };

        let body = json!({
            "command": command,
            "chargerIdentity": identity,
            "payload": payload,
        });
        let client = self.client.clone();
        let identity = identity.to_string();
        let command = command.to_string();

        tokio::spawn(async move {
            match client.post(&endpoint).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(charge_point_id = identity.as_str(), command = command.as_str(), "audit entry delivered");
                }
                Ok(response) => {
                    warn!(
                        charge_point_id = identity.as_str(),
                        command = command.as_str(),
                        status = %response.status(),
                        "log collector rejected audit entry"
                    );
                }
                Err(e) => {
                    warn!(
                        charge_point_id = identity.as_str(),
                        command = command.as_str(),
                        error = %e,
                        "failed to reach log collector"
                    );
                }
            }
        });
    }
}
