//! WebSocket listener and per-connection session loop.
//!
//! Each accepted socket negotiates the `ocpp1.6` subprotocol, derives the
//! charge point identity from the request path, registers with the
//! connection registry (taking over any prior session for that identity) and
//! then runs a reader loop plus a single writer task. Every socket write
//! goes through the writer task's channel, so concurrent senders can never
//! interleave frames.

pub mod shutdown;

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::config::GatewayConfig;
use crate::dispatch::Dispatcher;
use crate::protocol::OcppFrame;
use crate::session::{ChargerConnection, CloseKind, Outbound, SharedRegistry};

use shutdown::ShutdownSignal;

/// The only subprotocol this gateway speaks.
const OCPP_SUBPROTOCOL: &str = "ocpp1.6";

fn close_code(kind: CloseKind) -> CloseCode {
    match kind {
        CloseKind::Normal => CloseCode::Normal,
        CloseKind::Protocol => CloseCode::Protocol,
        CloseKind::Policy => CloseCode::Policy,
        CloseKind::GoingAway => CloseCode::Away,
    }
}

/// The charge point identity is the last path segment of the request URI.
fn extract_identity(path: &str) -> Option<String> {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// OCPP 1.6 WebSocket gateway.
pub struct GatewayServer {
    config: Arc<GatewayConfig>,
    registry: SharedRegistry,
    dispatcher: Arc<Dispatcher>,
    shutdown_signal: Option<ShutdownSignal>,
}

impl GatewayServer {
    pub fn new(
        config: Arc<GatewayConfig>,
        registry: SharedRegistry,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            config,
            registry,
            dispatcher,
            shutdown_signal: None,
        }
    }

    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown_signal = Some(signal);
        self
    }

    /// Bind and serve until shutdown is triggered.
    pub async fn run(&self) -> std::io::Result<()> {
        let addr = self.config.address();
        let listener = TcpListener::bind(&addr).await?;
        info!(address = addr.as_str(), "gateway listening");

        loop {
            let accepted = match &self.shutdown_signal {
                Some(shutdown) => {
                    tokio::select! {
                        result = listener.accept() => result,
                        _ = shutdown.notified().wait() => {
                            info!("listener received shutdown signal");
                            self.graceful_shutdown().await;
                            return Ok(());
                        }
                    }
                }
                None => listener.accept().await,
            };

            match accepted {
                Ok((stream, peer)) => self.spawn_connection(stream, peer),
                Err(e) => error!(error = %e, "failed to accept connection"),
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let config = self.config.clone();
        let registry = self.registry.clone();
        let dispatcher = self.dispatcher.clone();
        let shutdown = self.shutdown_signal.clone();

        tokio::spawn(async move {
            if let Err(e) =
                handle_connection(stream, peer, config, registry, dispatcher, shutdown).await
            {
                warn!(peer = %peer, error = %e, "connection ended with error");
            }
        });
    }

    /// Ask every live session to close, then wait for the connection tasks
    /// to unregister, bounded by the configured shutdown timeout.
    async fn graceful_shutdown(&self) {
        let count = self.registry.count();
        if count > 0 {
            info!(sessions = count, "closing charge point sessions");
            self.registry
                .close_all(CloseKind::GoingAway, "server shutting down");

            let deadline =
                tokio::time::Duration::from_secs(self.config.server.shutdown_timeout_secs);
            let drained = tokio::time::timeout(deadline, async {
                while self.registry.count() > 0 {
                    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
                }
            })
            .await;
            if drained.is_err() {
                warn!(
                    remaining = self.registry.count(),
                    "shutdown timeout expired with sessions still registered"
                );
            }
        }
        info!("gateway shutdown complete");
    }
}

/// How a connection's session loop ended.
enum LoopEnd {
    WriterStopped,
    ReaderStopped,
    Shutdown,
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<GatewayConfig>,
    registry: SharedRegistry,
    dispatcher: Arc<Dispatcher>,
    shutdown: Option<ShutdownSignal>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let mut identity: Option<String> = None;
    let mut subprotocol_ok = false;

    // Accept the handshake unconditionally. Rejections are delivered as
    // descriptive close frames on the established socket, which charger
    // firmware surfaces far better than a failed HTTP upgrade.
    let mut ws_stream =
        tokio_tungstenite::accept_hdr_async(stream, |req: &Request, mut response: Response| {
            identity = extract_identity(req.uri().path());

            let requested = req
                .headers()
                .get("Sec-WebSocket-Protocol")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            subprotocol_ok = requested
                .split(',')
                .map(str::trim)
                .any(|p| p == OCPP_SUBPROTOCOL);

            if subprotocol_ok {
                response.headers_mut().insert(
                    "Sec-WebSocket-Protocol",
                    OCPP_SUBPROTOCOL.parse().expect("static header value"),
                );
            }
            debug!(peer = %peer, path = req.uri().path(), subprotocols = requested, "websocket handshake");
            Ok(response)
        })
        .await?;

    if !subprotocol_ok {
        warn!(peer = %peer, "rejecting connection without ocpp1.6 subprotocol");
        return close_now(
            &mut ws_stream,
            CloseKind::Protocol,
            "subprotocol ocpp1.6 is required",
        )
        .await;
    }

    let Some(identity) = identity else {
        warn!(peer = %peer, "rejecting connection without charge point identity in path");
        return close_now(
            &mut ws_stream,
            CloseKind::Policy,
            "charge point identity missing from request path",
        )
        .await;
    };

    if !config.identity_allowed(&identity) {
        warn!(charge_point_id = identity.as_str(), peer = %peer, "identity not in allowlist");
        return close_now(
            &mut ws_stream,
            CloseKind::Policy,
            "charge point identity is not allowed",
        )
        .await;
    }

    info!(charge_point_id = identity.as_str(), peer = %peer, "charge point connected");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let connection = ChargerConnection::new(identity.clone(), tx);

    // Takeover: a reconnect under the same identity swaps the registry entry
    // and asks the superseded socket to close, without blocking us.
    registry.upsert(&identity, connection.clone());

    let writer_conn = connection.clone();
    let writer_identity = identity.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Text(text) => {
                    debug!(charge_point_id = writer_identity.as_str(), frame = text.as_str(), "sending frame");
                    writer_conn.set_outbound_busy(true);
                    let result = ws_sender.send(Message::Text(text)).await;
                    writer_conn.set_outbound_busy(false);
                    if let Err(e) = result {
                        error!(charge_point_id = writer_identity.as_str(), error = %e, "socket write failed");
                        break;
                    }
                }
                Outbound::Close { kind, reason } => {
                    info!(
                        charge_point_id = writer_identity.as_str(),
                        reason = reason.as_str(),
                        "closing connection"
                    );
                    let frame = CloseFrame {
                        code: close_code(kind),
                        reason: reason.into(),
                    };
                    let _ = ws_sender.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }
        writer_conn.mark_closed();
    });

    let reader_conn = connection.clone();
    let reader_identity = identity.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    debug!(charge_point_id = reader_identity.as_str(), frame = text.as_str(), "received frame");
                    let frame = match OcppFrame::parse(&text) {
                        Ok(frame) => frame,
                        Err(e) => {
                            // no uniqueId to correlate an error reply with
                            warn!(
                                charge_point_id = reader_identity.as_str(),
                                error = %e,
                                "dropping undecodable frame"
                            );
                            continue;
                        }
                    };

                    if let Some(reply) = dispatcher.dispatch(&reader_identity, frame).await {
                        if let Err(e) = reader_conn.send_frame(&reply) {
                            error!(charge_point_id = reader_identity.as_str(), error = %e, "failed to queue reply");
                            break;
                        }
                    }
                }
                // tungstenite answers pings on its own
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Binary(data)) => {
                    warn!(
                        charge_point_id = reader_identity.as_str(),
                        bytes = data.len(),
                        "ignoring binary message"
                    );
                }
                Ok(Message::Close(frame)) => {
                    info!(charge_point_id = reader_identity.as_str(), close = ?frame, "charge point closed connection");
                    break;
                }
                Ok(Message::Frame(_)) => {}
                Err(e) => {
                    warn!(charge_point_id = reader_identity.as_str(), error = %e, "websocket error");
                    break;
                }
            }
        }
    });

    let ended = if let Some(shutdown) = shutdown {
        tokio::select! {
            _ = &mut send_task => LoopEnd::WriterStopped,
            _ = &mut recv_task => LoopEnd::ReaderStopped,
            _ = shutdown.notified().wait() => LoopEnd::Shutdown,
        }
    } else {
        tokio::select! {
            _ = &mut send_task => LoopEnd::WriterStopped,
            _ = &mut recv_task => LoopEnd::ReaderStopped,
        }
    };

    // The writer owns the socket's write half and holds a sender for its own
    // channel, so it only stops on a Close message or a write error. Whatever
    // ended the session, it must be told to close or the task and the write
    // half outlive the connection.
    match ended {
        LoopEnd::WriterStopped => {}
        LoopEnd::ReaderStopped => {
            connection.request_close(CloseKind::Normal, "normal closure");
            let _ = tokio::time::timeout(std::time::Duration::from_secs(1), &mut send_task).await;
        }
        LoopEnd::Shutdown => {
            connection.request_close(CloseKind::GoingAway, "server shutting down");
            let _ = tokio::time::timeout(std::time::Duration::from_secs(1), &mut send_task).await;
        }
    }

    send_task.abort();
    recv_task.abort();
    connection.mark_closed();

    // Only the current connection may evict the session. A socket that was
    // taken over must leave the successor's registration alone.
    if registry.remove_if_current(&identity, &connection) {
        info!(charge_point_id = identity.as_str(), "charge point disconnected");
    } else {
        debug!(
            charge_point_id = identity.as_str(),
            "connection superseded, registry entry kept"
        );
    }

    Ok(())
}

/// Send a close frame on a freshly accepted socket and finish the handshake
/// teardown.
async fn close_now(
    ws_stream: &mut tokio_tungstenite::WebSocketStream<TcpStream>,
    kind: CloseKind,
    reason: &str,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    ws_stream
        .close(Some(CloseFrame {
            code: close_code(kind),
            reason: reason.to_string().into(),
        }))
        .await?;
    Ok(())
}
