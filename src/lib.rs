//! # OCPP 1.6 WebSocket Gateway
//!
//! Protocol gateway between OCPP-J 1.6 charge points and a central-system
//! backend.
//!
//! ## Architecture
//!
//! - **protocol**: OCPP-J frame codec, JSON Schema validation, error codes
//! - **dispatch**: typed per-action handlers behind a single dispatcher
//! - **session**: connection registry with takeover, pending-reply table
//! - **server**: WebSocket listener, per-connection loops, shutdown
//! - **backend**: central-system integration trait and push channel
//! - **audit**: fire-and-forget forwarding to an external log collector

pub mod audit;
pub mod backend;
pub mod config;
pub mod dispatch;
pub mod protocol;
pub mod server;
pub mod session;

pub use audit::AuditLogger;
pub use backend::{BackendClient, BackendError, LoggingBackend, PushHandle, TelemetryEvent};
pub use config::{ConfigError, GatewayConfig, CONFIG_ENV_VAR};
pub use dispatch::{ActionHandler, CallContext, Dispatcher};
pub use protocol::{classify, FrameError, OcppErrorCode, OcppFrame, SchemaStore};
pub use server::shutdown::{ShutdownCoordinator, ShutdownSignal};
pub use server::GatewayServer;
pub use session::{ConnectionRegistry, PendingRequests, SharedRegistry, SUPERSEDED_REASON};
