use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::warn;

use crate::backend::TelemetryEvent;
use crate::dispatch::{ActionHandler, CallContext};

/// Answers with the gateway's current UTC time and records the check-in.
pub struct HeartbeatHandler;

#[async_trait]
impl ActionHandler for HeartbeatHandler {
    async fn handle(&self, ctx: CallContext<'_>) -> Option<Value> {
        if let Err(e) = ctx
            .backend
            .send_telemetry(ctx.identity, TelemetryEvent::Heartbeat)
            .await
        {
            warn!(charge_point_id = ctx.identity, error = %e, "failed to forward heartbeat");
        }

        Some(json!({
            "currentTime": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }))
    }
}
