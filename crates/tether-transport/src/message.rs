//! Transport message type.

use bytes::Bytes;

/// One encoded frame travelling over a transport.
///
/// The payload is opaque to the transport; framing (newline delimiting for
/// stdio) is applied and stripped by the transport itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    /// The encoded frame.
    pub payload: Bytes,

    /// MIME type of the payload, if the sender declared one.
    pub content_type: Option<String>,
}

impl TransportMessage {
    /// Creates a new `TransportMessage` from an encoded frame.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            content_type: None,
        }
    }

    /// Creates a new `TransportMessage` with a declared content type.
    pub fn with_content_type(payload: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            content_type: Some(content_type.into()),
        }
    }

    /// Returns the size of the message payload in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// Payload as UTF-8 text, for logging.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}
