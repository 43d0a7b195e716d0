//! OCPP-J message framing
//!
//! The OCPP-J (JSON over WebSocket) transport envelope is a JSON array whose
//! first element is the message-type id:
//!
//! - **Call**       `[2, "<uniqueId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<uniqueId>", {<payload>}]`
//! - **CallError**  `[4, "<uniqueId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`
//!
//! Arity is fixed per kind: a Call has exactly 4 elements, a CallResult 3,
//! a CallError 5. Anything else is a decode error and the message is dropped
//! by the session loop.

use serde_json::Value;
use thiserror::Error;

const MSG_TYPE_CALL: u64 = 2;
const MSG_TYPE_CALL_RESULT: u64 = 3;
const MSG_TYPE_CALL_ERROR: u64 = 4;

/// A parsed OCPP-J frame.
#[derive(Debug, Clone, PartialEq)]
pub enum OcppFrame {
    /// `[2, uniqueId, action, payload]`
    Call {
        unique_id: String,
        action: String,
        payload: Value,
    },
    /// `[3, uniqueId, payload]`
    CallResult { unique_id: String, payload: Value },
    /// `[4, uniqueId, errorCode, errorDescription, errorDetails]`
    CallError {
        unique_id: String,
        error_code: String,
        error_description: String,
        error_details: Value,
    },
}

impl OcppFrame {
    /// Parse raw message text into a frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let elements: Vec<Value> =
            serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;

        let msg_type = elements
            .first()
            .and_then(Value::as_u64)
            .ok_or(FrameError::MissingMessageType)?;

        match msg_type {
            MSG_TYPE_CALL => {
                expect_arity(&elements, 4)?;
                Ok(Self::Call {
                    unique_id: string_element(&elements, 1, "uniqueId")?,
                    action: string_element(&elements, 2, "action")?,
                    payload: elements[3].clone(),
                })
            }
            MSG_TYPE_CALL_RESULT => {
                expect_arity(&elements, 3)?;
                Ok(Self::CallResult {
                    unique_id: string_element(&elements, 1, "uniqueId")?,
                    payload: elements[2].clone(),
                })
            }
            MSG_TYPE_CALL_ERROR => {
                expect_arity(&elements, 5)?;
                Ok(Self::CallError {
                    unique_id: string_element(&elements, 1, "uniqueId")?,
                    error_code: string_element(&elements, 2, "errorCode")?,
                    error_description: string_element(&elements, 3, "errorDescription")?,
                    error_details: elements[4].clone(),
                })
            }
            other => Err(FrameError::UnknownMessageType(other)),
        }
    }

    /// Serialize this frame to its wire JSON-array form.
    pub fn serialize(&self) -> String {
        let array = match self {
            Self::Call {
                unique_id,
                action,
                payload,
            } => Value::Array(vec![
                MSG_TYPE_CALL.into(),
                unique_id.clone().into(),
                action.clone().into(),
                payload.clone(),
            ]),
            Self::CallResult { unique_id, payload } => Value::Array(vec![
                MSG_TYPE_CALL_RESULT.into(),
                unique_id.clone().into(),
                payload.clone(),
            ]),
            Self::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => Value::Array(vec![
                MSG_TYPE_CALL_ERROR.into(),
                unique_id.clone().into(),
                error_code.clone().into(),
                error_description.clone().into(),
                error_details.clone(),
            ]),
        };

        // serializing a Value never fails
        serde_json::to_string(&array).unwrap()
    }

    /// The caller-assigned correlation token.
    pub fn unique_id(&self) -> &str {
        match self {
            Self::Call { unique_id, .. }
            | Self::CallResult { unique_id, .. }
            | Self::CallError { unique_id, .. } => unique_id,
        }
    }
}

fn expect_arity(elements: &[Value], expected: usize) -> Result<(), FrameError> {
    if elements.len() != expected {
        return Err(FrameError::WrongArity {
            expected,
            got: elements.len(),
        });
    }
    Ok(())
}

fn string_element(
    elements: &[Value],
    index: usize,
    field: &'static str,
) -> Result<String, FrameError> {
    elements[index]
        .as_str()
        .map(str::to_owned)
        .ok_or(FrameError::FieldType(field))
}

/// Errors produced while decoding a raw message into a frame.
///
/// All of these are non-fatal: the session loop logs them and waits for the
/// next message.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("message-type id missing or not an integer")]
    MissingMessageType,

    #[error("unknown message type: {0}")]
    UnknownMessageType(u64),

    #[error("expected {expected} elements, got {got}")]
    WrongArity { expected: usize, got: usize },

    #[error("{0} must be a string")]
    FieldType(&'static str),
}
