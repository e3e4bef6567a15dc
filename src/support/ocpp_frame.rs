//! OCPP-J message framing
//!
//! Every OCPP-J text frame is a JSON array in one of three shapes:
//!
//! - **Call**       `[2, "<uniqueId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<uniqueId>", {<payload>}]`
//! - **CallError**  `[4, "<uniqueId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`
//!
//! [`OcppMessage::decode`] is strict about arity and field types so that a
//! malformed frame is answered with `FormationViolation` instead of being
//! guessed at. [`OcppMessage::encode`] is its exact inverse.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

// ── Message-type constants ─────────────────────────────────────

const MSG_TYPE_CALL: u64 = 2;
const MSG_TYPE_CALL_RESULT: u64 = 3;
const MSG_TYPE_CALL_ERROR: u64 = 4;

/// Correlation id used when a malformed frame carries no readable id.
pub const UNKNOWN_CORRELATION_ID: &str = "-1";

// ── OcppMessage ────────────────────────────────────────────────

/// `[2, uniqueId, action, payload]`
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub correlation_id: String,
    pub action: String,
    pub payload: Map<String, Value>,
}

/// `[3, uniqueId, payload]`
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    pub correlation_id: String,
    pub payload: Map<String, Value>,
}

/// `[4, uniqueId, errorCode, errorDescription, errorDetails]`
#[derive(Debug, Clone, PartialEq)]
pub struct CallError {
    pub correlation_id: String,
    pub error_code: String,
    pub error_description: String,
    pub error_details: Map<String, Value>,
}

/// A decoded OCPP-J frame.
#[derive(Debug, Clone, PartialEq)]
pub enum OcppMessage {
    Call(Call),
    CallResult(CallResult),
    CallError(CallError),
}

impl OcppMessage {
    // ── Decoding ───────────────────────────────────────────

    /// Decode raw frame bytes.
    pub fn decode(raw: &[u8]) -> Result<Self, FormationError> {
        let value: Value = serde_json::from_slice(raw)
            .map_err(|e| FormationError::new(raw, None, FormationKind::InvalidJson(e.to_string())))?;

        let arr = match value {
            Value::Array(arr) => arr,
            _ => return Err(FormationError::new(raw, None, FormationKind::NotAnArray)),
        };

        // Best effort: recover the id before validating anything else so the
        // CallError we send back can still be correlated by the peer.
        let correlation_id = arr.get(1).and_then(Value::as_str).map(str::to_string);
        let fail = |kind| FormationError::new(raw, correlation_id.clone(), kind);

        let msg_type = arr
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| fail(FormationKind::InvalidMessageType))?;

        let expected = match msg_type {
            MSG_TYPE_CALL => 4,
            MSG_TYPE_CALL_RESULT => 3,
            MSG_TYPE_CALL_ERROR => 5,
            other => return Err(fail(FormationKind::UnknownMessageType(other))),
        };
        if arr.len() != expected {
            return Err(fail(FormationKind::WrongArity {
                expected,
                got: arr.len(),
            }));
        }

        let unique_id = correlation_id
            .clone()
            .ok_or_else(|| fail(FormationKind::FieldTypeMismatch("uniqueId must be a string")))?;

        let mut fields = arr.into_iter().skip(2);
        let mut next = || fields.next().unwrap_or(Value::Null);

        match msg_type {
            MSG_TYPE_CALL => {
                let action = match next() {
                    Value::String(s) if !s.is_empty() => s,
                    _ => {
                        return Err(fail(FormationKind::FieldTypeMismatch(
                            "action must be a non-empty string",
                        )))
                    }
                };
                let payload = as_object(next())
                    .ok_or_else(|| fail(FormationKind::FieldTypeMismatch("payload must be an object")))?;
                Ok(Self::Call(Call {
                    correlation_id: unique_id,
                    action,
                    payload,
                }))
            }
            MSG_TYPE_CALL_RESULT => {
                let payload = as_object(next())
                    .ok_or_else(|| fail(FormationKind::FieldTypeMismatch("payload must be an object")))?;
                Ok(Self::CallResult(CallResult {
                    correlation_id: unique_id,
                    payload,
                }))
            }
            _ => {
                let error_code = as_string(next())
                    .ok_or_else(|| fail(FormationKind::FieldTypeMismatch("errorCode must be a string")))?;
                let error_description = as_string(next()).ok_or_else(|| {
                    fail(FormationKind::FieldTypeMismatch("errorDescription must be a string"))
                })?;
                let error_details = as_object(next()).ok_or_else(|| {
                    fail(FormationKind::FieldTypeMismatch("errorDetails must be an object"))
                })?;
                Ok(Self::CallError(CallError {
                    correlation_id: unique_id,
                    error_code,
                    error_description,
                    error_details,
                }))
            }
        }
    }

    // ── Encoding ───────────────────────────────────────────

    /// Encode this message as OCPP-J text.
    pub fn encode(&self) -> String {
        let arr = match self {
            Self::Call(call) => vec![
                Value::from(MSG_TYPE_CALL),
                Value::String(call.correlation_id.clone()),
                Value::String(call.action.clone()),
                Value::Object(call.payload.clone()),
            ],
            Self::CallResult(result) => vec![
                Value::from(MSG_TYPE_CALL_RESULT),
                Value::String(result.correlation_id.clone()),
                Value::Object(result.payload.clone()),
            ],
            Self::CallError(error) => vec![
                Value::from(MSG_TYPE_CALL_ERROR),
                Value::String(error.correlation_id.clone()),
                Value::String(error.error_code.clone()),
                Value::String(error.error_description.clone()),
                Value::Object(error.error_details.clone()),
            ],
        };

        Value::Array(arr).to_string()
    }

    // ── Helpers ────────────────────────────────────────────

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::Call(call) => &call.correlation_id,
            Self::CallResult(result) => &result.correlation_id,
            Self::CallError(error) => &error.correlation_id,
        }
    }

    /// Build a `CallResult` from an arbitrary JSON value; non-object values
    /// are wrapped as an empty payload.
    pub fn call_result(correlation_id: impl Into<String>, payload: Value) -> Self {
        Self::CallResult(CallResult {
            correlation_id: correlation_id.into(),
            payload: as_object(payload).unwrap_or_default(),
        })
    }

    /// Build a `CallError` with empty details.
    pub fn call_error(
        correlation_id: impl Into<String>,
        error_code: ErrorCode,
        error_description: impl Into<String>,
    ) -> Self {
        Self::CallError(CallError {
            correlation_id: correlation_id.into(),
            error_code: error_code.as_str().to_string(),
            error_description: error_description.into(),
            error_details: Map::new(),
        })
    }
}

fn as_object(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn as_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        _ => None,
    }
}

// ── Error codes ────────────────────────────────────────────────

/// OCPP-J `CallError` error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotImplemented,
    NotSupported,
    InternalError,
    ProtocolError,
    SecurityError,
    FormationViolation,
    PropertyConstraintViolation,
    /// Spelled as in the OCPP-J 1.6 specification.
    OccurenceConstraintViolation,
    TypeConstraintViolation,
    GenericError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotImplemented => "NotImplemented",
            Self::NotSupported => "NotSupported",
            Self::InternalError => "InternalError",
            Self::ProtocolError => "ProtocolError",
            Self::SecurityError => "SecurityError",
            Self::FormationViolation => "FormationViolation",
            Self::PropertyConstraintViolation => "PropertyConstraintViolation",
            Self::OccurenceConstraintViolation => "OccurenceConstraintViolation",
            Self::TypeConstraintViolation => "TypeConstraintViolation",
            Self::GenericError => "GenericError",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Errors ─────────────────────────────────────────────────────

/// What exactly was wrong with a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormationKind {
    InvalidJson(String),
    NotAnArray,
    InvalidMessageType,
    UnknownMessageType(u64),
    WrongArity { expected: usize, got: usize },
    FieldTypeMismatch(&'static str),
}

impl fmt::Display for FormationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson(msg) => write!(f, "Invalid JSON: {}", msg),
            Self::NotAnArray => write!(f, "Frame is not a JSON array"),
            Self::InvalidMessageType => write!(f, "Message type is not an unsigned integer"),
            Self::UnknownMessageType(t) => write!(f, "Unknown message type: {}", t),
            Self::WrongArity { expected, got } => {
                write!(f, "Expected {} elements, got {}", expected, got)
            }
            Self::FieldTypeMismatch(msg) => write!(f, "Field type mismatch: {}", msg),
        }
    }
}

/// A frame that is not a valid OCPP-J envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct FormationError {
    /// The offending frame, verbatim.
    pub raw: Vec<u8>,
    /// Correlation id, if element 1 was a string.
    pub correlation_id: Option<String>,
    pub kind: FormationKind,
}

impl FormationError {
    fn new(raw: &[u8], correlation_id: Option<String>, kind: FormationKind) -> Self {
        Self {
            raw: raw.to_vec(),
            correlation_id,
            kind,
        }
    }

    /// The id to answer with: the recovered one, or the placeholder.
    pub fn reply_id(&self) -> &str {
        self.correlation_id
            .as_deref()
            .unwrap_or(UNKNOWN_CORRELATION_ID)
    }

    /// Build the `FormationViolation` reply for this frame.
    pub fn to_call_error(&self) -> OcppMessage {
        OcppMessage::call_error(
            self.reply_id(),
            ErrorCode::FormationViolation,
            self.kind.to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        as_object(value).unwrap()
    }

    #[test]
    fn decode_call() {
        let text = r#"[2,"19223201","BootNotification",{"chargePointVendor":"Power Grid","chargePointModel":"Model-1 Optimus"}]"#;
        match OcppMessage::decode(text.as_bytes()).unwrap() {
            OcppMessage::Call(call) => {
                assert_eq!(call.correlation_id, "19223201");
                assert_eq!(call.action, "BootNotification");
                assert_eq!(call.payload["chargePointVendor"], "Power Grid");
            }
            other => panic!("Expected Call, got {:?}", other),
        }
    }

    #[test]
    fn decode_call_with_empty_payload() {
        let msg = OcppMessage::decode(br#"[2,"19223202","Heartbeat",{}]"#).unwrap();
        assert_eq!(
            msg,
            OcppMessage::Call(Call {
                correlation_id: "19223202".into(),
                action: "Heartbeat".into(),
                payload: Map::new(),
            })
        );
    }

    #[test]
    fn decode_call_result_and_error() {
        let result = OcppMessage::decode(br#"[3,"abc",{"status":"Accepted"}]"#).unwrap();
        assert_eq!(result.correlation_id(), "abc");
        assert!(matches!(result, OcppMessage::CallResult(_)));

        let error =
            OcppMessage::decode(br#"[4,"abc","NotImplemented","Action not supported",{}]"#).unwrap();
        match error {
            OcppMessage::CallError(e) => {
                assert_eq!(e.error_code, "NotImplemented");
                assert_eq!(e.error_description, "Action not supported");
            }
            other => panic!("Expected CallError, got {:?}", other),
        }
    }

    #[test]
    fn encode_produces_wire_arrays() {
        let call = OcppMessage::Call(Call {
            correlation_id: "26".into(),
            action: "StartTransaction".into(),
            payload: object(json!({"connectorId": 1})),
        });
        assert_eq!(call.encode(), r#"[2,"26","StartTransaction",{"connectorId":1}]"#);

        let error = OcppMessage::call_error("7", ErrorCode::InternalError, "boom");
        assert_eq!(error.encode(), r#"[4,"7","InternalError","boom",{}]"#);
    }

    #[test]
    fn decode_inverts_encode() {
        let messages = vec![
            OcppMessage::Call(Call {
                correlation_id: "138ffd31-9245-4c63-9185-4036067dffb9".into(),
                action: "RemoteStartTransaction".into(),
                payload: object(json!({"connectorId": 1, "idTag": "dummyToken"})),
            }),
            OcppMessage::call_result("id2", json!({"currentTime": "2024-01-01T00:00:00Z"})),
            OcppMessage::CallError(CallError {
                correlation_id: "id3".into(),
                error_code: "GenericError".into(),
                error_description: "Something went wrong".into(),
                error_details: object(json!({"hint": [1, 2, 3]})),
            }),
        ];

        for msg in messages {
            let decoded = OcppMessage::decode(msg.encode().as_bytes()).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn malformed_frames_are_formation_errors() {
        let cases: &[&[u8]] = &[
            b"",
            b"\xff\xfe\x00",
            b"not json",
            b"{}",
            b"[]",
            b"[2]",
            br#"["2","id","Heartbeat",{}]"#,
            br#"[9,"id","Heartbeat",{}]"#,
            br#"[2,"id","Heartbeat"]"#,
            br#"[2,"id","Heartbeat",{},{}]"#,
            br#"[2,"id","",{}]"#,
            br#"[2,"id",5,{}]"#,
            br#"[2,"id","Heartbeat",[]]"#,
            br#"[2,42,"Heartbeat",{}]"#,
            br#"[3,"id",null]"#,
            br#"[4,"id","GenericError","desc"]"#,
            br#"[4,"id",1,"desc",{}]"#,
            br#"[-2,"id","Heartbeat",{}]"#,
        ];

        for raw in cases {
            let err = OcppMessage::decode(raw).unwrap_err();
            assert_eq!(err.raw, raw.to_vec());
        }
    }

    #[test]
    fn formation_error_recovers_correlation_id() {
        let err = OcppMessage::decode(br#"[2,"abc","Heartbeat"]"#).unwrap_err();
        assert_eq!(err.reply_id(), "abc");
        assert_eq!(err.kind, FormationKind::WrongArity { expected: 4, got: 3 });

        let err = OcppMessage::decode(b"garbage").unwrap_err();
        assert_eq!(err.reply_id(), UNKNOWN_CORRELATION_ID);

        match err.to_call_error() {
            OcppMessage::CallError(e) => {
                assert_eq!(e.correlation_id, "-1");
                assert_eq!(e.error_code, "FormationViolation");
            }
            other => panic!("Expected CallError, got {:?}", other),
        }
    }

    #[test]
    fn call_result_wraps_non_object_payload() {
        let msg = OcppMessage::call_result("x", Value::Null);
        assert_eq!(msg.encode(), r#"[3,"x",{}]"#);
    }
}
