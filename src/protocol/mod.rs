//! OCPP-J protocol layer: wire framing, payload validation and the error
//! classifier.

pub mod error_code;
pub mod frame;
pub mod validator;

pub use error_code::{classify, OcppErrorCode};
pub use frame::{FrameError, OcppFrame};
pub use validator::{SchemaStore, SchemaViolation, ValidationOutcome, ViolationKind};
