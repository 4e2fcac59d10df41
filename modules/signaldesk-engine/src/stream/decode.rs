//! One NDJSON line → one `StreamEvent`.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Events emitted by an audit run. Closed set: an unknown `type` is a
/// decode failure, never passed through.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Human-readable progress line.
    Log { message: String },
    /// Batch of produced records, still raw; validated per record on merge.
    Result { data: Vec<Value> },
    /// Terminal failure reported by the backend.
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeCause {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("missing \"type\" discriminator")]
    MissingType,

    #[error("unknown event type {0:?}")]
    UnknownType(String),

    #[error("malformed {kind} event: {detail}")]
    InvalidPayload { kind: String, detail: String },
}

/// A line that could not be decoded. Non-fatal: reported and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("undecodable stream line ({cause}): {line}")]
pub struct DecodeFailure {
    pub line: String,
    pub cause: DecodeCause,
}

const KNOWN_TYPES: [&str; 3] = ["log", "result", "error"];

/// Decode one complete line. Blank lines are not events and yield `None`.
pub fn decode(line: &str) -> Option<Result<StreamEvent, DecodeFailure>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let fail = |cause| {
        Some(Err(DecodeFailure {
            line: line.to_string(),
            cause,
        }))
    };

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(e) => return fail(DecodeCause::InvalidJson(e.to_string())),
    };

    let kind = match value.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        _ => return fail(DecodeCause::MissingType),
    };
    if !KNOWN_TYPES.contains(&kind.as_str()) {
        return fail(DecodeCause::UnknownType(kind));
    }

    match serde_json::from_value::<StreamEvent>(value) {
        Ok(event) => Some(Ok(event)),
        Err(e) => fail(DecodeCause::InvalidPayload {
            kind,
            detail: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cause(line: &str) -> DecodeCause {
        decode(line).unwrap().unwrap_err().cause
    }

    #[test]
    fn decodes_each_kind() {
        assert_eq!(
            decode(r#"{"type":"log","message":"hi"}"#),
            Some(Ok(StreamEvent::Log {
                message: "hi".to_string()
            }))
        );
        assert_eq!(
            decode(r#"{"type":"result","data":[{"signal_id":"SIG-1"}]}"#),
            Some(Ok(StreamEvent::Result {
                data: vec![json!({"signal_id": "SIG-1"})]
            }))
        );
        assert_eq!(
            decode(r#"{"type":"error","message":"boom"}"#),
            Some(Ok(StreamEvent::Error {
                message: "boom".to_string()
            }))
        );
    }

    #[test]
    fn blank_lines_are_not_failures() {
        assert_eq!(decode(""), None);
        assert_eq!(decode("   \t\r"), None);
    }

    #[test]
    fn trailing_carriage_return_is_tolerated() {
        assert!(matches!(
            decode("{\"type\":\"log\",\"message\":\"crlf\"}\r"),
            Some(Ok(StreamEvent::Log { .. }))
        ));
    }

    #[test]
    fn failures_carry_the_offending_line() {
        let failure = decode(r#"{"type":"log""#).unwrap().unwrap_err();
        assert_eq!(failure.line, r#"{"type":"log""#);
        assert!(matches!(failure.cause, DecodeCause::InvalidJson(_)));
    }

    #[test]
    fn missing_or_non_string_type() {
        assert_eq!(cause(r#"{"message":"hi"}"#), DecodeCause::MissingType);
        assert_eq!(cause(r#"{"type":7,"message":"hi"}"#), DecodeCause::MissingType);
        assert_eq!(cause(r#"["log","hi"]"#), DecodeCause::MissingType);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert_eq!(
            cause(r#"{"type":"progress","pct":40}"#),
            DecodeCause::UnknownType("progress".to_string())
        );
    }

    #[test]
    fn known_type_with_bad_payload() {
        assert!(matches!(
            cause(r#"{"type":"result","data":"not a list"}"#),
            DecodeCause::InvalidPayload { ref kind, .. } if kind == "result"
        ));
        assert!(matches!(
            cause(r#"{"type":"log"}"#),
            DecodeCause::InvalidPayload { ref kind, .. } if kind == "log"
        ));
    }
}
