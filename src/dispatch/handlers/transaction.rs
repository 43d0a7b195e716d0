use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::dispatch::{ActionHandler, CallContext};

/// Forwards Authorize, StartTransaction and StopTransaction to the backend
/// as transaction events. The charger receives no synchronous reply from the
/// gateway; any answer comes back through the backend's push channel.
pub struct TransactionEventHandler;

#[async_trait]
impl ActionHandler for TransactionEventHandler {
    async fn handle(&self, ctx: CallContext<'_>) -> Option<Value> {
        if let Err(e) = ctx
            .backend
            .send_transaction_event(ctx.identity, ctx.action, ctx.payload)
            .await
        {
            warn!(
                charge_point_id = ctx.identity,
                action = ctx.action,
                error = %e,
                "backend failed to process transaction event"
            );
        }
        None
    }
}
