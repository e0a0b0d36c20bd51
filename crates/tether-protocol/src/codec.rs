//! Wire codec for JSON-RPC frames.
//!
//! A [`Codec`] turns outbound frames into bytes and classifies inbound bytes
//! as request, response or notification. Decoding failures carry the request
//! id when it could be recovered, so the session can answer malformed
//! requests with a proper error response instead of dropping them.

use bytes::Bytes;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::jsonrpc::{
    JSONRPC_VERSION, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RequestId,
};

/// Category of a codec failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecErrorKind {
    /// Bytes are not valid JSON
    Parse,
    /// Valid JSON, but not a JSON-RPC 2.0 frame
    InvalidMessage,
    /// Outbound frame could not be serialized
    Encode,
}

/// Error produced by [`Codec::encode`] or [`Codec::decode`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("codec error ({kind:?}): {message}")]
pub struct CodecError {
    /// Failure category
    pub kind: CodecErrorKind,
    /// Human-readable detail
    pub message: String,
    /// Id of the offending frame, when recoverable
    pub id: Option<RequestId>,
    /// Method of the offending frame, when it named one
    pub method: Option<String>,
}

impl CodecError {
    /// The bytes were not JSON.
    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: CodecErrorKind::Parse,
            message: message.into(),
            id: None,
            method: None,
        }
    }

    /// The JSON was not a valid frame.
    pub fn invalid(message: impl Into<String>, id: Option<RequestId>) -> Self {
        Self {
            kind: CodecErrorKind::InvalidMessage,
            message: message.into(),
            id,
            method: None,
        }
    }

    /// Attach the method name recovered from the frame.
    #[must_use]
    pub fn with_method(mut self, method: Option<String>) -> Self {
        self.method = method;
        self
    }

    /// Whether the offending frame looked like a request from the peer.
    ///
    /// Such frames deserve an error response; malformed responses instead
    /// fail the call that was waiting for them.
    pub fn is_request(&self) -> bool {
        self.method.is_some() && self.id.is_some()
    }

    /// Serialization failed.
    pub fn encode(message: impl Into<String>) -> Self {
        Self {
            kind: CodecErrorKind::Encode,
            message: message.into(),
            id: None,
            method: None,
        }
    }

    /// JSON-RPC error object to send back to the peer.
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        match self.kind {
            CodecErrorKind::Parse => JsonRpcError::parse_error(&self.message),
            CodecErrorKind::InvalidMessage | CodecErrorKind::Encode => {
                JsonRpcError::invalid_request(&self.message)
            }
        }
    }
}

/// Frame serialization boundary.
///
/// Implementations must be shareable across tasks; the session holds one
/// behind an `Arc` for both its send path and its receive loop.
pub trait Codec: Send + Sync + std::fmt::Debug {
    /// Serialize a frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecErrorKind::Encode`] if the frame cannot be serialized.
    fn encode(&self, message: &JsonRpcMessage) -> Result<Bytes, CodecError>;

    /// Parse and classify a frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecErrorKind::Parse`] for malformed bytes and
    /// [`CodecErrorKind::InvalidMessage`] for JSON that is not a frame.
    fn decode(&self, bytes: &[u8]) -> Result<JsonRpcMessage, CodecError>;

    /// Content type of encoded frames.
    fn content_type(&self) -> &'static str;

    /// Codec name for logs.
    fn name(&self) -> &'static str;
}

/// JSON codec (the MCP wire format).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec
    pub fn new() -> Self {
        Self
    }

    fn classify(map: Map<String, Value>) -> Result<JsonRpcMessage, CodecError> {
        let id = map
            .get("id")
            .and_then(|raw| serde_json::from_value::<RequestId>(raw.clone()).ok());
        let method = map
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);

        match map.get("jsonrpc") {
            Some(Value::String(v)) if v == JSONRPC_VERSION => {}
            _ => {
                return Err(
                    CodecError::invalid("missing or unsupported jsonrpc version", id)
                        .with_method(method),
                );
            }
        }

        let has_method = map.contains_key("method");
        let has_result = map.contains_key("result");
        let has_error = map.contains_key("error");
        let id_present = map.get("id").is_some_and(|v| !v.is_null());
        let frame = Value::Object(map);

        if has_method {
            if id_present {
                if id.is_none() {
                    return Err(CodecError::invalid(
                        "request id must be a string or integer",
                        None,
                    ));
                }
                serde_json::from_value::<JsonRpcRequest>(frame)
                    .map(JsonRpcMessage::Request)
                    .map_err(|e| CodecError::invalid(e.to_string(), id).with_method(method))
            } else {
                serde_json::from_value::<JsonRpcNotification>(frame)
                    .map(JsonRpcMessage::Notification)
                    .map_err(|e| CodecError::invalid(e.to_string(), None).with_method(method))
            }
        } else if has_result && has_error {
            Err(CodecError::invalid(
                "response carries both result and error",
                id,
            ))
        } else if has_result || has_error {
            serde_json::from_value::<JsonRpcResponse>(frame)
                .map(JsonRpcMessage::Response)
                .map_err(|e| CodecError::invalid(e.to_string(), id))
        } else {
            Err(CodecError::invalid(
                "frame is neither request, response nor notification",
                id,
            ))
        }
    }
}

impl Codec for JsonCodec {
    fn encode(&self, message: &JsonRpcMessage) -> Result<Bytes, CodecError> {
        serde_json::to_vec(message)
            .map(Bytes::from)
            .map_err(|e| CodecError::encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<JsonRpcMessage, CodecError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| CodecError::parse(e.to_string()))?;

        match value {
            Value::Object(map) => Self::classify(map),
            Value::Array(_) => Err(CodecError::invalid("batch frames are not supported", None)),
            _ => Err(CodecError::invalid("frame must be a JSON object", None)),
        }
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::JsonRpcResponsePayload;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn decode(value: Value) -> Result<JsonRpcMessage, CodecError> {
        JsonCodec::new().decode(&serde_json::to_vec(&value).unwrap())
    }

    #[test]
    fn test_classifies_request_response_notification() {
        let request = decode(json!({"jsonrpc": "2.0", "id": "s1", "method": "ping"})).unwrap();
        assert!(matches!(request, JsonRpcMessage::Request(ref r) if r.method == "ping"));

        let response = decode(json!({"jsonrpc": "2.0", "id": 4, "result": {}})).unwrap();
        assert_eq!(response.id(), Some(&RequestId::Number(4)));

        let note = decode(json!({
            "jsonrpc": "2.0",
            "method": "notifications/tools/list_changed"
        }))
        .unwrap();
        assert_eq!(note.method(), Some("notifications/tools/list_changed"));
        assert_eq!(note.id(), None);
    }

    #[test]
    fn test_error_response_with_null_id() {
        let frame = decode(json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": {"code": -32700, "message": "Parse error"}
        }))
        .unwrap();
        match frame {
            JsonRpcMessage::Response(r) => {
                assert!(r.id.is_null());
                assert!(matches!(r.payload, JsonRpcResponsePayload::Error { .. }));
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_has_no_id() {
        let err = JsonCodec::new().decode(b"{not json").unwrap_err();
        assert_eq!(err.kind, CodecErrorKind::Parse);
        assert_eq!(err.id, None);
        assert_eq!(err.to_jsonrpc_error().code, -32700);
    }

    #[test]
    fn test_invalid_frame_recovers_id() {
        let err = decode(json!({"jsonrpc": "1.0", "id": 9, "method": "x"})).unwrap_err();
        assert_eq!(err.kind, CodecErrorKind::InvalidMessage);
        assert_eq!(err.id, Some(RequestId::Number(9)));
        assert!(err.is_request());
        assert_eq!(err.to_jsonrpc_error().code, -32600);
    }

    #[test]
    fn test_malformed_response_is_not_a_request() {
        let err = decode(json!({"jsonrpc": "2.0", "id": 2, "error": "boom"})).unwrap_err();
        assert_eq!(err.id, Some(RequestId::Number(2)));
        assert!(!err.is_request());
    }

    #[test]
    fn test_rejects_batches_and_ambiguous_responses() {
        assert!(decode(json!([{"jsonrpc": "2.0", "method": "ping", "id": 1}])).is_err());
        let both = decode(json!({
            "jsonrpc": "2.0", "id": 1, "result": {}, "error": {"code": 1, "message": "x"}
        }))
        .unwrap_err();
        assert_eq!(both.id, Some(RequestId::Number(1)));
    }

    #[test]
    fn test_encoded_frames_are_single_line() {
        let message = JsonRpcMessage::Request(JsonRpcRequest::new(
            "tools/call",
            Some(json!({"name": "echo", "arguments": {"text": "line1\nline2"}})),
            RequestId::Number(1),
        ));
        let bytes = JsonCodec::new().encode(&message).unwrap();
        assert!(!bytes.contains(&b'\n'));
        assert_eq!(JsonCodec::new().decode(&bytes).unwrap(), message);
    }
}
