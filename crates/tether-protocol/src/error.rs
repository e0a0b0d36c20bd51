//! Protocol-level error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while building or interpreting protocol values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolError {
    /// A version range whose lower bound sorts after its upper bound.
    #[error("Invalid version range: min {min} is greater than max {max}")]
    InvalidVersionRange {
        /// Declared lower bound
        min: String,
        /// Declared upper bound
        max: String,
    },

    /// A version string that cannot be ordered.
    #[error("Invalid protocol version: {0:?}")]
    InvalidVersion(String),

    /// A payload that does not match the expected shape for its method.
    #[error("Invalid payload for {method}: {reason}")]
    InvalidPayload {
        /// JSON-RPC method the payload belongs to
        method: String,
        /// Deserializer message
        reason: String,
    },
}

impl ProtocolError {
    /// Build an [`ProtocolError::InvalidPayload`] from a serde error.
    pub fn invalid_payload(method: impl Into<String>, err: &serde_json::Error) -> Self {
        Self::InvalidPayload {
            method: method.into(),
            reason: err.to_string(),
        }
    }
}
