//! Pending-request table for replies to central-system-initiated Calls.
//!
//! CALLRESULT/CALLERROR frames arriving from a charger belong to a Call this
//! gateway sent earlier. The core currently issues no such Calls, so the
//! table stays empty and every inbound reply is recorded as unmatched. The
//! table is kept as the explicit extension point for outstanding-request
//! correlation; no FIFO or timeout semantics are assumed.

use dashmap::DashMap;
use serde_json::Value;
use tracing::{info, warn};

/// A Call awaiting its reply, keyed by uniqueId.
#[derive(Debug)]
pub struct PendingCall {
    pub identity: String,
    pub action: String,
}

/// Table of outstanding central-system-initiated Calls.
pub struct PendingRequests {
    requests: DashMap<String, PendingCall>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self {
            requests: DashMap::new(),
        }
    }

    /// Record an outstanding Call before its frame goes out.
    pub fn track(&self, unique_id: impl Into<String>, identity: impl Into<String>, action: impl Into<String>) {
        self.requests.insert(
            unique_id.into(),
            PendingCall {
                identity: identity.into(),
                action: action.into(),
            },
        );
    }

    /// Handle a CallResult from `identity`. Returns the matched Call, if any.
    pub fn on_result(&self, identity: &str, unique_id: &str, payload: &Value) -> Option<PendingCall> {
        match self.requests.remove(unique_id) {
            Some((_, call)) => {
                info!(
                    charge_point_id = identity,
                    message_id = unique_id,
                    action = call.action.as_str(),
                    "received reply for outstanding call"
                );
                Some(call)
            }
            None => {
                warn!(
                    charge_point_id = identity,
                    message_id = unique_id,
                    payload = %payload,
                    "CallResult without a matching outstanding call"
                );
                None
            }
        }
    }

    /// Handle a CallError from `identity`. Returns the matched Call, if any.
    pub fn on_error(
        &self,
        identity: &str,
        unique_id: &str,
        error_code: &str,
        error_description: &str,
    ) -> Option<PendingCall> {
        match self.requests.remove(unique_id) {
            Some((_, call)) => {
                warn!(
                    charge_point_id = identity,
                    message_id = unique_id,
                    action = call.action.as_str(),
                    error_code,
                    error_description,
                    "outstanding call failed"
                );
                Some(call)
            }
            None => {
                warn!(
                    charge_point_id = identity,
                    message_id = unique_id,
                    error_code,
                    "CallError without a matching outstanding call"
                );
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unmatched_reply_is_a_no_op() {
        let pending = PendingRequests::new();
        assert!(pending.on_result("CP001", "77", &json!({})).is_none());
        assert!(pending
            .on_error("CP001", "77", "GenericError", "")
            .is_none());
        assert!(pending.is_empty());
    }

    #[test]
    fn tracked_call_is_matched_once() {
        let pending = PendingRequests::new();
        pending.track("CS-1", "CP001", "Reset");
        assert_eq!(pending.len(), 1);

        let call = pending.on_result("CP001", "CS-1", &json!({"status": "Accepted"}));
        assert_eq!(call.unwrap().action, "Reset");

        // replay is unmatched
        assert!(pending.on_result("CP001", "CS-1", &json!({})).is_none());
    }
}
