use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::backend::TelemetryEvent;
use crate::dispatch::{ActionHandler, CallContext};

/// Acknowledges StatusNotification with an empty payload and forwards the
/// connector status change.
pub struct StatusNotificationHandler;

#[async_trait]
impl ActionHandler for StatusNotificationHandler {
    async fn handle(&self, ctx: CallContext<'_>) -> Option<Value> {
        let event = TelemetryEvent::Status {
            connector_id: ctx.payload["connectorId"].as_i64(),
            status: ctx.payload["status"].as_str().map(str::to_string),
            error_code: ctx.payload["errorCode"].as_str().map(str::to_string),
        };
        if let Err(e) = ctx.backend.send_telemetry(ctx.identity, event).await {
            warn!(charge_point_id = ctx.identity, error = %e, "failed to forward status notification");
        }

        Some(json!({}))
    }
}
