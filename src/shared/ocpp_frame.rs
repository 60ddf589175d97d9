//! OCPP-J message framing
//!
//! Implements the OCPP-J (JSON over WebSocket) transport envelope shared by
//! OCPP 1.5 and 1.6:
//!
//! - **Call**       `[2, "<uniqueId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<uniqueId>", {<payload>}]`
//! - **CallError**  `[4, "<uniqueId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`
//!
//! `serde_json` is built with `preserve_order`, so payload key order survives
//! a decode/encode cycle and compact frames round-trip byte for byte.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};
use thiserror::Error;

// ── Message-type constants ─────────────────────────────────────

const MSG_TYPE_CALL: u64 = 2;
const MSG_TYPE_CALL_RESULT: u64 = 3;
const MSG_TYPE_CALL_ERROR: u64 = 4;

// ── OcppFrame ──────────────────────────────────────────────────

/// A decoded OCPP-J frame (version-agnostic transport envelope).
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
    // ── Decoding ───────────────────────────────────────────

    /// Decode raw WebSocket text into an `OcppFrame`.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;

        let Value::Array(mut arr) = value else {
            return Err(FrameError::NotAnArray);
        };

        if !(3..=5).contains(&arr.len()) {
            return Err(FrameError::InvalidLength(arr.len()));
        }

        let msg_type = arr[0].as_u64().ok_or(FrameError::InvalidMessageType)?;

        match msg_type {
            MSG_TYPE_CALL => {
                expect_arity(&arr, 4, 4)?;
                let payload = arr.pop().unwrap_or_default();
                let action = take_string(&mut arr, 2, "action must be a string")?;
                let unique_id = take_string(&mut arr, 1, "uniqueId must be a string")?;
                Ok(Self::Call {
                    unique_id,
                    action,
                    payload,
                })
            }
            MSG_TYPE_CALL_RESULT => {
                expect_arity(&arr, 3, 3)?;
                let payload = arr.pop().unwrap_or_default();
                let unique_id = take_string(&mut arr, 1, "uniqueId must be a string")?;
                Ok(Self::CallResult { unique_id, payload })
            }
            MSG_TYPE_CALL_ERROR => {
                expect_arity(&arr, 4, 5)?;
                // Some stations omit errorDetails; treat it as an empty object.
                let error_details = if arr.len() == 5 {
                    arr.pop().unwrap_or_default()
                } else {
                    Value::Object(Map::new())
                };
                let error_description =
                    take_string(&mut arr, 3, "errorDescription must be a string")?;
                let error_code = take_string(&mut arr, 2, "errorCode must be a string")?;
                let unique_id = take_string(&mut arr, 1, "uniqueId must be a string")?;
                Ok(Self::CallError {
                    unique_id,
                    error_code,
                    error_description,
                    error_details,
                })
            }
            other => Err(FrameError::UnknownMessageType(other)),
        }
    }

    // ── Encoding ───────────────────────────────────────────

    /// Encode this frame as compact JSON text.
    pub fn encode(&self) -> String {
        let arr = match self {
            Self::Call {
                unique_id,
                action,
                payload,
            } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL.into()),
                Value::String(unique_id.clone()),
                Value::String(action.clone()),
                payload.clone(),
            ]),

            Self::CallResult { unique_id, payload } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL_RESULT.into()),
                Value::String(unique_id.clone()),
                payload.clone(),
            ]),

            Self::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL_ERROR.into()),
                Value::String(unique_id.clone()),
                Value::String(error_code.clone()),
                Value::String(error_description.clone()),
                error_details.clone(),
            ]),
        };

        // Display on a Value cannot fail.
        arr.to_string()
    }

    // ── Helpers ────────────────────────────────────────────

    /// Get the unique message ID.
    pub fn unique_id(&self) -> &str {
        match self {
            Self::Call { unique_id, .. }
            | Self::CallResult { unique_id, .. }
            | Self::CallError { unique_id, .. } => unique_id,
        }
    }

    /// Build a `CallError` reply for the given unique ID.
    pub fn error_response(
        unique_id: impl Into<String>,
        code: CallErrorCode,
        error_description: impl Into<String>,
        error_details: Value,
    ) -> Self {
        Self::CallError {
            unique_id: unique_id.into(),
            error_code: code.as_str().to_string(),
            error_description: error_description.into(),
            error_details,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Self::Call { .. })
    }

    pub fn is_call_result(&self) -> bool {
        matches!(self, Self::CallResult { .. })
    }

    pub fn is_call_error(&self) -> bool {
        matches!(self, Self::CallError { .. })
    }
}

fn expect_arity(arr: &[Value], min: usize, max: usize) -> Result<(), FrameError> {
    if arr.len() < min || arr.len() > max {
        return Err(FrameError::WrongArity {
            expected: min,
            got: arr.len(),
        });
    }
    Ok(())
}

fn take_string(arr: &mut [Value], index: usize, what: &'static str) -> Result<String, FrameError> {
    match arr.get_mut(index).map(Value::take) {
        Some(Value::String(s)) => Ok(s),
        _ => Err(FrameError::FieldTypeMismatch(what)),
    }
}

// ── CallErrorCode ──────────────────────────────────────────────

/// Error codes allowed in an OCPP-J `CallError` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallErrorCode {
    NotImplemented,
    NotSupported,
    InternalError,
    ProtocolError,
    SecurityError,
    FormationViolation,
    PropertyConstraintViolation,
    OccurenceConstraintViolation,
    TypeConstraintViolation,
    GenericError,
}

impl CallErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotImplemented => "NotImplemented",
            Self::NotSupported => "NotSupported",
            Self::InternalError => "InternalError",
            Self::ProtocolError => "ProtocolError",
            Self::SecurityError => "SecurityError",
            Self::FormationViolation => "FormationViolation",
            Self::PropertyConstraintViolation => "PropertyConstraintViolation",
            // Misspelled on the wire in OCPP-J 1.6.
            Self::OccurenceConstraintViolation => "OccurenceConstraintViolation",
            Self::TypeConstraintViolation => "TypeConstraintViolation",
            Self::GenericError => "GenericError",
        }
    }
}

impl fmt::Display for CallErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallErrorCode {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "NotImplemented" => Self::NotImplemented,
            "NotSupported" => Self::NotSupported,
            "InternalError" => Self::InternalError,
            "ProtocolError" => Self::ProtocolError,
            "SecurityError" => Self::SecurityError,
            "FormationViolation" => Self::FormationViolation,
            "PropertyConstraintViolation" => Self::PropertyConstraintViolation,
            "OccurenceConstraintViolation" => Self::OccurenceConstraintViolation,
            "TypeConstraintViolation" => Self::TypeConstraintViolation,
            "GenericError" => Self::GenericError,
            _ => return Err(FrameError::FieldTypeMismatch("unknown errorCode")),
        })
    }
}

// ── Errors ─────────────────────────────────────────────────────

/// Protocol errors raised while decoding an OCPP-J frame.
///
/// A frame that fails to decode cannot be answered: without a trustworthy
/// uniqueId there is nothing to correlate a `CallError` with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("OCPP message is not a JSON array")]
    NotAnArray,
    #[error("OCPP message array must have 3 to 5 elements, got {0}")]
    InvalidLength(usize),
    #[error("Message type is not a number")]
    InvalidMessageType,
    #[error("Unknown message type: {0}")]
    UnknownMessageType(u64),
    #[error("Expected {expected} fields, got {got}")]
    WrongArity { expected: usize, got: usize },
    #[error("Field type mismatch: {0}")]
    FieldTypeMismatch(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn decode_heartbeat_call() {
        let frame = OcppFrame::decode(r#"[2,"123","Heartbeat",{}]"#).unwrap();
        assert_eq!(
            frame,
            OcppFrame::Call {
                unique_id: "123".into(),
                action: "Heartbeat".into(),
                payload: json!({}),
            }
        );
    }

    #[test]
    fn decode_call_error_with_details() {
        let text = r#"[4,"abc123","NotImplemented","Action not supported",{"a":1}]"#;
        match OcppFrame::decode(text).unwrap() {
            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => {
                assert_eq!(unique_id, "abc123");
                assert_eq!(error_code, "NotImplemented");
                assert_eq!(error_description, "Action not supported");
                assert_eq!(error_details, json!({"a": 1}));
            }
            other => panic!("Expected CallError frame, got {:?}", other),
        }
    }

    #[test]
    fn decode_call_error_without_details_defaults_to_empty_object() {
        let frame = OcppFrame::decode(r#"[4,"x","GenericError","boom"]"#).unwrap();
        match frame {
            OcppFrame::CallError { error_details, .. } => assert_eq!(error_details, json!({})),
            other => panic!("Expected CallError frame, got {:?}", other),
        }
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(matches!(
            OcppFrame::decode("not json"),
            Err(FrameError::InvalidJson(_))
        ));
        assert_eq!(
            OcppFrame::decode(r#"{"a":1}"#),
            Err(FrameError::NotAnArray)
        );
        assert_eq!(
            OcppFrame::decode(r#"[2,"1"]"#),
            Err(FrameError::InvalidLength(2))
        );
        assert_eq!(
            OcppFrame::decode(r#"[2,"1","A",{},{},{}]"#),
            Err(FrameError::InvalidLength(6))
        );
        assert_eq!(
            OcppFrame::decode(r#"[5,"1",{}]"#),
            Err(FrameError::UnknownMessageType(5))
        );
        assert_eq!(
            OcppFrame::decode(r#"["2","1","A",{}]"#),
            Err(FrameError::InvalidMessageType)
        );
        assert!(matches!(
            OcppFrame::decode(r#"[2,1,"Heartbeat",{}]"#),
            Err(FrameError::FieldTypeMismatch(_))
        ));
        assert!(matches!(
            OcppFrame::decode(r#"[3,"1",{},{}]"#),
            Err(FrameError::WrongArity { .. })
        ));
    }

    #[test]
    fn encode_preserves_payload_key_order() {
        let text = r#"[3,"9",{"status":"Accepted","currentTime":"2024-01-01T00:00:00Z","interval":300}]"#;
        assert_eq!(OcppFrame::decode(text).unwrap().encode(), text);
    }

    #[test]
    fn error_response_uses_code_name() {
        let frame = OcppFrame::error_response(
            "id3",
            CallErrorCode::FormationViolation,
            "bad payload",
            json!({}),
        );
        assert_eq!(
            frame.encode(),
            r#"[4,"id3","FormationViolation","bad payload",{}]"#
        );
    }

    #[test]
    fn call_error_code_parses_back() {
        for code in [
            CallErrorCode::NotImplemented,
            CallErrorCode::InternalError,
            CallErrorCode::OccurenceConstraintViolation,
        ] {
            assert_eq!(code.as_str().parse::<CallErrorCode>().unwrap(), code);
        }
    }

    fn arb_payload() -> impl Strategy<Value = Value> {
        prop::collection::vec(("[a-zA-Z]{1,8}", any::<i32>(), "[ -~]{0,12}"), 0..4).prop_map(
            |fields| {
                let mut map = Map::new();
                for (key, number, text) in fields {
                    map.insert(format!("{}N", key), json!(number));
                    map.insert(format!("{}S", key), json!(text));
                }
                Value::Object(map)
            },
        )
    }

    fn arb_frame() -> impl Strategy<Value = OcppFrame> {
        let id = "[A-Za-z0-9-]{1,36}";
        prop_oneof![
            (id, "[A-Za-z]{1,30}", arb_payload()).prop_map(|(unique_id, action, payload)| {
                OcppFrame::Call {
                    unique_id,
                    action,
                    payload,
                }
            }),
            (id, arb_payload())
                .prop_map(|(unique_id, payload)| OcppFrame::CallResult { unique_id, payload }),
            (id, "[A-Za-z]{1,30}", "[ -~]{0,40}", arb_payload()).prop_map(
                |(unique_id, error_code, error_description, error_details)| {
                    OcppFrame::CallError {
                        unique_id,
                        error_code,
                        error_description,
                        error_details,
                    }
                }
            ),
        ]
    }

    proptest! {
        #[test]
        fn encoded_frames_decode_and_reencode_identically(frame in arb_frame()) {
            let text = frame.encode();
            let decoded = OcppFrame::decode(&text).unwrap();
            prop_assert_eq!(&decoded, &frame);
            prop_assert_eq!(decoded.encode(), text);
        }
    }
}
