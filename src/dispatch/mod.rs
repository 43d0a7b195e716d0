//! Action dispatch: routes a validated Call to its typed handler and frames
//! the reply.
//!
//! Handlers are registered in a static map keyed by action name, one handler
//! per action, all implementing [`ActionHandler`]. Adding an action means
//! adding a handler module and one registration line in
//! [`handlers::default_handlers`].

pub mod handlers;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::audit::AuditLogger;
use crate::backend::BackendClient;
use crate::protocol::{classify, OcppErrorCode, OcppFrame, SchemaStore};
use crate::session::PendingRequests;

/// Everything a handler may consult while processing one Call.
pub struct CallContext<'a> {
    pub identity: &'a str,
    pub action: &'a str,
    pub payload: &'a Value,
    pub backend: &'a dyn BackendClient,
}

/// One action's processing unit.
///
/// Returns the CallResult payload for the charger, or `None` when the action
/// produces no synchronous reply.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, ctx: CallContext<'_>) -> Option<Value>;
}

/// Routes decoded frames: Calls to their handler, replies to the pending
/// table.
pub struct Dispatcher {
    schemas: Arc<SchemaStore>,
    backend: Arc<dyn BackendClient>,
    audit: Arc<AuditLogger>,
    pending: Arc<PendingRequests>,
    handlers: HashMap<&'static str, Box<dyn ActionHandler>>,
}

impl Dispatcher {
    pub fn new(
        schemas: Arc<SchemaStore>,
        backend: Arc<dyn BackendClient>,
        audit: Arc<AuditLogger>,
        pending: Arc<PendingRequests>,
    ) -> Self {
        Self {
            schemas,
            backend,
            audit,
            pending,
            handlers: handlers::default_handlers(),
        }
    }

    /// Process one decoded frame from `identity`. The returned frame, if
    /// any, is the reply to send back on the same connection.
    pub async fn dispatch(&self, identity: &str, frame: OcppFrame) -> Option<OcppFrame> {
        match frame {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => self.dispatch_call(identity, unique_id, action, payload).await,

            OcppFrame::CallResult { unique_id, payload } => {
                self.pending.on_result(identity, &unique_id, &payload);
                None
            }

            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                ..
            } => {
                self.pending
                    .on_error(identity, &unique_id, &error_code, &error_description);
                None
            }
        }
    }

    async fn dispatch_call(
        &self,
        identity: &str,
        unique_id: String,
        action: String,
        payload: Value,
    ) -> Option<OcppFrame> {
        info!(charge_point_id = identity, action = action.as_str(), "received Call");
        self.audit.record(identity, &action, &payload);

        let outcome = self.schemas.validate(&action, &payload);
        if !outcome.valid {
            let (code, details) = classify(&outcome);
            warn!(
                charge_point_id = identity,
                action = action.as_str(),
                error_code = code.as_str(),
                "rejecting Call"
            );
            return Some(self.finish(
                identity,
                &action,
                OcppFrame::CallError {
                    unique_id,
                    error_code: code.as_str().to_string(),
                    error_description: String::new(),
                    error_details: details,
                },
            ));
        }

        let Some(handler) = self.handlers.get(action.as_str()) else {
            // schema exists but nothing handles the action
            warn!(
                charge_point_id = identity,
                action = action.as_str(),
                "no handler registered for valid action"
            );
            return Some(self.finish(
                identity,
                &action,
                OcppFrame::CallError {
                    unique_id,
                    error_code: OcppErrorCode::NotImplemented.as_str().to_string(),
                    error_description: String::new(),
                    error_details: json!({}),
                },
            ));
        };

        let ctx = CallContext {
            identity,
            action: &action,
            payload: &payload,
            backend: self.backend.as_ref(),
        };

        handler
            .handle(ctx)
            .await
            .map(|reply_payload| {
                self.finish(
                    identity,
                    &action,
                    OcppFrame::CallResult {
                        unique_id,
                        payload: reply_payload,
                    },
                )
            })
    }

    /// Forward a produced reply to the collector, labeled with its
    /// originating action, before handing it back to the session loop.
    fn finish(&self, identity: &str, action: &str, reply: OcppFrame) -> OcppFrame {
        match &reply {
            OcppFrame::CallResult { payload, .. } => {
                self.audit
                    .record(identity, &format!("{action}Response"), payload);
            }
            OcppFrame::CallError {
                error_code,
                error_details,
                ..
            } => {
                let view = json!({
                    "errorCode": error_code,
                    "errorDetails": error_details,
                });
                self.audit
                    .record(identity, &format!("{action}Error"), &view);
            }
            OcppFrame::Call { .. } => {}
        }
        reply
    }
}
