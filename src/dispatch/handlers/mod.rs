//! One module per charger-initiated action.

pub mod boot_notification;
pub mod heartbeat;
pub mod meter_values;
pub mod status_notification;
pub mod transaction;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{ActionHandler, CallContext};

pub use boot_notification::BootNotificationHandler;
pub use heartbeat::HeartbeatHandler;
pub use meter_values::MeterValuesHandler;
pub use status_notification::StatusNotificationHandler;
pub use transaction::TransactionEventHandler;

/// Placeholder for actions the gateway accepts but does nothing with yet.
pub struct NoopHandler;

#[async_trait]
impl ActionHandler for NoopHandler {
    async fn handle(&self, ctx: CallContext<'_>) -> Option<Value> {
        debug!(
            charge_point_id = ctx.identity,
            action = ctx.action,
            "accepted without processing"
        );
        None
    }
}

/// The full action table. One entry per supported action name.
pub fn default_handlers() -> HashMap<&'static str, Box<dyn ActionHandler>> {
    let mut handlers: HashMap<&'static str, Box<dyn ActionHandler>> = HashMap::new();
    handlers.insert("BootNotification", Box::new(BootNotificationHandler));
    handlers.insert("Heartbeat", Box::new(HeartbeatHandler));
    handlers.insert("MeterValues", Box::new(MeterValuesHandler));
    handlers.insert("StatusNotification", Box::new(StatusNotificationHandler));
    handlers.insert("Authorize", Box::new(TransactionEventHandler));
    handlers.insert("StartTransaction", Box::new(TransactionEventHandler));
    handlers.insert("StopTransaction", Box::new(TransactionEventHandler));
    handlers.insert("DataTransfer", Box::new(NoopHandler));
    handlers.insert("DiagnosticsStatusNotification", Box::new(NoopHandler));
    handlers.insert("FirmwareStatusNotification", Box::new(NoopHandler));
    handlers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_supported_action_is_registered() {
        let handlers = default_handlers();
        for action in [
            "BootNotification",
            "Heartbeat",
            "MeterValues",
            "StatusNotification",
            "Authorize",
            "StartTransaction",
            "StopTransaction",
            "DataTransfer",
            "DiagnosticsStatusNotification",
            "FirmwareStatusNotification",
        ] {
            assert!(handlers.contains_key(action), "missing handler for {action}");
        }
    }
}
