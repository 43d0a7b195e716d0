//! Per-connection state for one charge point socket.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::protocol::OcppFrame;

/// Process-wide counter distinguishing connection instances, so a stale
/// reader can never be mistaken for the registry's current connection.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Close semantics requested of the writer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Normal closure: session teardown, or takeover of a superseded socket.
    Normal,
    /// Subprotocol negotiation failure.
    Protocol,
    /// Identity rejected by the allowlist.
    Policy,
    /// Server is shutting down.
    GoingAway,
}

/// Message for a connection's single-writer task. All socket writes are
/// funneled through this channel, so no two tasks ever write concurrently.
#[derive(Debug)]
pub enum Outbound {
    /// A serialized OCPP-J frame.
    Text(String),
    /// Close the socket with the given reason, then stop the writer.
    Close { kind: CloseKind, reason: String },
}

/// Handle to one live charge point connection.
///
/// The registry holds the current handle per identity; the session loop and
/// the writer task hold clones of it. At most one non-closed connection
/// exists per identity once a takeover settles.
#[derive(Debug, Clone)]
pub struct ChargerConnection {
    pub connection_id: u64,
    pub identity: String,
    sender: mpsc::UnboundedSender<Outbound>,
    open: Arc<AtomicBool>,
    outbound_busy: Arc<AtomicBool>,
}

impl ChargerConnection {
    pub fn new(identity: impl Into<String>, sender: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            connection_id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            identity: identity.into(),
            sender,
            open: Arc::new(AtomicBool::new(true)),
            outbound_busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue a frame for the writer task. Fails if the socket is no longer
    /// open or the writer has stopped.
    pub fn send_frame(&self, frame: &OcppFrame) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::NotOpen(self.identity.clone()));
        }
        self.sender
            .send(Outbound::Text(frame.serialize()))
            .map_err(|_| SendError::ChannelClosed(self.identity.clone()))
    }

    /// Ask the writer task to close the socket. Non-blocking and best-effort;
    /// a writer that already stopped means the socket is going away anyway.
    pub fn request_close(&self, kind: CloseKind, reason: impl Into<String>) {
        let _ = self.sender.send(Outbound::Close {
            kind,
            reason: reason.into(),
        });
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Flip the open flag once the socket is gone.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Advisory flag: true while a physical write is in flight.
    pub fn is_outbound_busy(&self) -> bool {
        self.outbound_busy.load(Ordering::SeqCst)
    }

    pub fn set_outbound_busy(&self, busy: bool) {
        self.outbound_busy.store(busy, Ordering::SeqCst);
    }
}

/// Failure to hand a frame to a connection.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("charge point {0} is not connected")]
    NotConnected(String),

    #[error("connection for {0} is no longer open")]
    NotOpen(String),

    #[error("writer for {0} has stopped")]
    ChannelClosed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_connection() -> (ChargerConnection, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChargerConnection::new("CP001", tx), rx)
    }

    fn empty_result() -> OcppFrame {
        OcppFrame::CallResult {
            unique_id: "1".into(),
            payload: json!({}),
        }
    }

    #[test]
    fn connection_ids_are_distinct() {
        let (a, _rx_a) = make_connection();
        let (b, _rx_b) = make_connection();
        assert_ne!(a.connection_id, b.connection_id);
    }

    #[test]
    fn send_frame_reaches_writer() {
        let (conn, mut rx) = make_connection();
        conn.send_frame(&empty_result()).unwrap();
        match rx.try_recv().unwrap() {
            Outbound::Text(text) => assert_eq!(text, r#"[3,"1",{}]"#),
            other => panic!("expected Text, got {:?}", other),
        }
    }

    #[test]
    fn send_frame_after_close_fails() {
        let (conn, _rx) = make_connection();
        conn.mark_closed();
        assert!(matches!(
            conn.send_frame(&empty_result()),
            Err(SendError::NotOpen(_))
        ));
    }

    #[test]
    fn send_frame_with_stopped_writer_fails() {
        let (conn, rx) = make_connection();
        drop(rx);
        assert!(matches!(
            conn.send_frame(&empty_result()),
            Err(SendError::ChannelClosed(_))
        ));
    }

    #[test]
    fn request_close_delivers_reason() {
        let (conn, mut rx) = make_connection();
        conn.request_close(CloseKind::Normal, "bye");
        match rx.try_recv().unwrap() {
            Outbound::Close { kind, reason } => {
                assert_eq!(kind, CloseKind::Normal);
                assert_eq!(reason, "bye");
            }
            other => panic!("expected Close, got {:?}", other),
        }
    }

    #[test]
    fn busy_flag_toggles() {
        let (conn, _rx) = make_connection();
        assert!(!conn.is_outbound_busy());
        conn.set_outbound_busy(true);
        assert!(conn.is_outbound_busy());
        conn.set_outbound_busy(false);
        assert!(!conn.is_outbound_busy());
    }
}
