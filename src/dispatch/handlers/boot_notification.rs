use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::dispatch::{ActionHandler, CallContext};

/// Delegates BootNotification to the backend; its reply payload goes back to
/// the charger verbatim. On backend failure the charger gets no reply and
/// may retry on its own schedule.
pub struct BootNotificationHandler;

#[async_trait]
impl ActionHandler for BootNotificationHandler {
    async fn handle(&self, ctx: CallContext<'_>) -> Option<Value> {
        match ctx
            .backend
            .send_boot_notification(ctx.identity, ctx.payload)
            .await
        {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!(
                    charge_point_id = ctx.identity,
                    error = %e,
                    "backend failed to process boot notification"
                );
                None
            }
        }
    }
}
