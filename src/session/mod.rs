//! Session management: per-connection state, the identity-keyed connection
//! registry and the pending-reply table.

pub mod connection;
pub mod pending;
pub mod registry;

pub use connection::{ChargerConnection, CloseKind, Outbound, SendError};
pub use pending::PendingRequests;
pub use registry::{ConnectionRegistry, SharedRegistry, SUPERSEDED_REASON};
