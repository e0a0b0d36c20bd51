//! Error taxonomy for session operations.
//!
//! Every fallible session operation returns [`Error`]. Variants fall into two
//! groups: *local* errors are raised before anything reaches the transport
//! (see [`Error::is_local`]), everything else was observed on the wire or on
//! the connection itself.

use std::time::Duration;

use serde_json::Value;
use tether_protocol::{JsonRpcError, VersionRange};
use tether_transport::TransportError;
use thiserror::Error;

use crate::client::SessionState;
use crate::registry::CapabilityKind;

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by a [`Session`](crate::Session).
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The handshake has not completed yet.
    #[error("Session not ready (state: {state})")]
    NotReady {
        /// State at the time of the call
        state: SessionState,
    },

    /// A lifecycle operation was attempted from a state that does not allow it.
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        /// Rejected operation
        operation: &'static str,
        /// State at the time of the call
        state: SessionState,
    },

    /// Client and server protocol version ranges do not overlap.
    #[error("No common protocol version: client supports {client}, server supports {server}")]
    VersionMismatch {
        /// Range offered by this client
        client: VersionRange,
        /// Range declared by the server
        server: VersionRange,
    },

    /// The name is not in the cached registry snapshot.
    #[error("Unknown capability {name} ({kind})")]
    UnknownCapability {
        /// Registry kind searched
        kind: CapabilityKind,
        /// Requested name
        name: String,
    },

    /// Listing a capability kind failed; the previous snapshot is kept.
    #[error("Discovery of {kind} failed: {source}")]
    DiscoveryFailed {
        /// Kind being discovered
        kind: CapabilityKind,
        /// Underlying failure
        source: Box<Error>,
    },

    /// No response arrived within the call's timeout.
    #[error("{method} timed out after {timeout:?}")]
    Timeout {
        /// Method of the abandoned request
        method: String,
        /// Timeout that elapsed
        timeout: Duration,
    },

    /// The caller cancelled the call before a response arrived.
    #[error("{method} was cancelled")]
    Cancelled {
        /// Method of the abandoned request
        method: String,
    },

    /// The approval gate refused the tool call.
    #[error(
        "Call to {tool} denied{}",
        .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default()
    )]
    Denied {
        /// Tool that was refused
        tool: String,
        /// Reason given by the gate, if any
        reason: Option<String>,
    },

    /// Arguments failed local validation.
    #[error("Invalid arguments for {name}: {reason}")]
    InvalidArguments {
        /// Tool or prompt name
        name: String,
        /// What was wrong
        reason: String,
    },

    /// The peer sent something that does not follow the protocol.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The server answered with a JSON-RPC error.
    #[error("Server error {code}: {message}")]
    Server {
        /// JSON-RPC error code
        code: i32,
        /// Error message
        message: String,
        /// Optional error data
        data: Option<Value>,
    },

    /// The server did not declare the capability the operation needs.
    #[error("Server does not support {capability}")]
    Unsupported {
        /// Missing capability
        capability: String,
    },

    /// The connection ended unexpectedly.
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// Description of the failure
        reason: String,
    },

    /// The session was closed.
    #[error("Session closed")]
    SessionClosed,

    /// Transport-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    /// Build a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolError(message.into())
    }

    /// Build a connection-lost error.
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self::ConnectionLost {
            reason: reason.into(),
        }
    }

    /// Whether retrying the same operation could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Transport(e) => !e.is_fatal(),
            Self::DiscoveryFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Whether the error was raised locally, before anything was sent.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::NotReady { .. }
                | Self::InvalidState { .. }
                | Self::UnknownCapability { .. }
                | Self::Denied { .. }
                | Self::InvalidArguments { .. }
                | Self::Unsupported { .. }
                | Self::SessionClosed
        )
    }

    /// JSON-RPC error code, for server errors.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Server { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<JsonRpcError> for Error {
    fn from(error: JsonRpcError) -> Self {
        Self::Server {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }
}
