//! Connection registry: one live session per charge point identity.
//!
//! The registry is the only state shared across connection tasks. It is
//! injected into the server rather than living in a static, and all mutating
//! operations are atomic: a stale receive loop can never evict a session that
//! a newer connection has already taken over, because removal is keyed on the
//! specific connection instance.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{info, warn};

use crate::protocol::OcppFrame;

use super::connection::{ChargerConnection, CloseKind, SendError};

/// Close reason delivered to a socket superseded by a reconnect.
pub const SUPERSEDED_REASON: &str = "new websocket request from client";

/// One registered charge point session.
#[derive(Debug)]
pub struct ChargerSession {
    pub identity: String,
    /// Current transport connection. Swapped in place on reconnect.
    pub connection: ChargerConnection,
}

/// Thread-safe registry of active charge point sessions.
pub struct ConnectionRegistry {
    sessions: DashMap<String, ChargerSession>,
}

/// Shared, reference-counted registry.
pub type SharedRegistry = Arc<ConnectionRegistry>;

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Wrap in `Arc` for shared ownership.
    pub fn shared() -> SharedRegistry {
        Arc::new(Self::new())
    }

    /// Register `connection` as the current one for `identity`, replacing any
    /// prior connection in place.
    ///
    /// If a distinct, still-open prior connection existed, it is asked to
    /// close with [`SUPERSEDED_REASON`] without blocking this registration,
    /// and returned to the caller.
    pub fn upsert(&self, identity: &str, connection: ChargerConnection) -> Option<ChargerConnection> {
        match self.sessions.entry(identity.to_string()) {
            Entry::Occupied(mut occupied) => {
                let new_id = connection.connection_id;
                let prior =
                    std::mem::replace(&mut occupied.get_mut().connection, connection);
                if prior.connection_id != new_id && prior.is_open() {
                    info!(
                        charge_point_id = identity,
                        old_connection = prior.connection_id,
                        "session taken over by new connection"
                    );
                    prior.request_close(CloseKind::Normal, SUPERSEDED_REASON);
                }
                Some(prior)
            }
            Entry::Vacant(vacant) => {
                info!(
                    charge_point_id = identity,
                    connection = connection.connection_id,
                    "registering charge point session"
                );
                vacant.insert(ChargerSession {
                    identity: identity.to_string(),
                    connection,
                });
                None
            }
        }
    }

    /// Current connection handle for `identity`, if any.
    pub fn get(&self, identity: &str) -> Option<ChargerConnection> {
        self.sessions.get(identity).map(|s| s.connection.clone())
    }

    /// Remove the session for `identity` only if `connection` is still its
    /// current connection. Idempotent: replaying after success is a no-op.
    pub fn remove_if_current(&self, identity: &str, connection: &ChargerConnection) -> bool {
        let removed = self
            .sessions
            .remove_if(identity, |_, session| {
                session.connection.connection_id == connection.connection_id
            })
            .is_some();
        if removed {
            info!(charge_point_id = identity, "unregistered charge point session");
        }
        removed
    }

    /// Send a frame to a specific charge point by identity. This is the push
    /// path handed to the backend for unsolicited messages.
    pub fn send_to(&self, identity: &str, frame: &OcppFrame) -> Result<(), SendError> {
        match self.sessions.get(identity) {
            Some(session) => session.connection.send_frame(frame),
            None => Err(SendError::NotConnected(identity.to_string())),
        }
    }

    /// Whether a charge point currently has a registered session.
    pub fn is_connected(&self, identity: &str) -> bool {
        self.sessions.contains_key(identity)
    }

    /// Identities of all registered sessions.
    pub fn connected_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|s| s.key().clone()).collect()
    }

    /// Number of registered sessions.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Ask every live session to close. Used during shutdown.
    pub fn close_all(&self, kind: CloseKind, reason: &str) {
        for session in self.sessions.iter() {
            if session.connection.is_open() {
                session.connection.request_close(kind, reason);
            } else {
                warn!(
                    charge_point_id = session.identity.as_str(),
                    "session already closed during shutdown sweep"
                );
            }
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::connection::Outbound;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn make_connection(
        identity: &str,
    ) -> (ChargerConnection, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChargerConnection::new(identity, tx), rx)
    }

    #[test]
    fn upsert_new_identity_returns_none() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = make_connection("CP001");
        assert!(registry.upsert("CP001", conn).is_none());
        assert!(registry.is_connected("CP001"));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn takeover_asks_old_connection_to_close() {
        let registry = ConnectionRegistry::new();
        let (old, mut old_rx) = make_connection("CP001");
        let old_id = old.connection_id;
        registry.upsert("CP001", old);

        let (new, _new_rx) = make_connection("CP001");
        let new_id = new.connection_id;
        let prior = registry.upsert("CP001", new).expect("prior connection");
        assert_eq!(prior.connection_id, old_id);

        // the superseded socket gets a close request with the takeover reason
        match old_rx.try_recv().unwrap() {
            Outbound::Close { kind, reason } => {
                assert_eq!(kind, CloseKind::Normal);
                assert_eq!(reason, SUPERSEDED_REASON);
            }
            other => panic!("expected Close, got {:?}", other),
        }

        // the new connection is now current, and there is only one entry
        assert_eq!(registry.get("CP001").unwrap().connection_id, new_id);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn closed_prior_connection_is_not_asked_to_close_again() {
        let registry = ConnectionRegistry::new();
        let (old, mut old_rx) = make_connection("CP001");
        old.mark_closed();
        registry.upsert("CP001", old);

        let (new, _new_rx) = make_connection("CP001");
        registry.upsert("CP001", new);
        assert!(old_rx.try_recv().is_err());
    }

    #[test]
    fn stale_connection_cannot_remove_current_session() {
        let registry = ConnectionRegistry::new();
        let (old, _old_rx) = make_connection("CP001");
        let stale = old.clone();
        registry.upsert("CP001", old);

        let (new, _new_rx) = make_connection("CP001");
        registry.upsert("CP001", new.clone());

        // old receive loop winding down must not evict the new session
        assert!(!registry.remove_if_current("CP001", &stale));
        assert!(registry.is_connected("CP001"));

        // the current connection can
        assert!(registry.remove_if_current("CP001", &new));
        assert!(!registry.is_connected("CP001"));
    }

    #[test]
    fn remove_if_current_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = make_connection("CP001");
        registry.upsert("CP001", conn.clone());

        assert!(registry.remove_if_current("CP001", &conn));
        assert!(!registry.remove_if_current("CP001", &conn));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn send_to_unknown_identity_fails() {
        let registry = ConnectionRegistry::new();
        let frame = OcppFrame::CallResult {
            unique_id: "1".into(),
            payload: json!({}),
        };
        assert!(matches!(
            registry.send_to("CP404", &frame),
            Err(SendError::NotConnected(_))
        ));
    }

    #[test]
    fn send_to_delivers_to_current_connection() {
        let registry = ConnectionRegistry::new();
        let (conn, mut rx) = make_connection("CP001");
        registry.upsert("CP001", conn);

        let frame = OcppFrame::Call {
            unique_id: "42".into(),
            action: "Reset".into(),
            payload: json!({"type": "Soft"}),
        };
        registry.send_to("CP001", &frame).unwrap();
        assert!(matches!(rx.try_recv().unwrap(), Outbound::Text(_)));
    }

    #[test]
    fn close_all_reaches_every_session() {
        let registry = ConnectionRegistry::new();
        let (a, mut rx_a) = make_connection("CP001");
        let (b, mut rx_b) = make_connection("CP002");
        registry.upsert("CP001", a);
        registry.upsert("CP002", b);

        registry.close_all(CloseKind::GoingAway, "server shutting down");
        assert!(matches!(rx_a.try_recv().unwrap(), Outbound::Close { .. }));
        assert!(matches!(rx_b.try_recv().unwrap(), Outbound::Close { .. }));
    }
}
