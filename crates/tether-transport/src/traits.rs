//! Core transport trait.

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::message::TransportMessage;
use crate::metrics::TransportMetrics;
use crate::types::{TransportState, TransportType};

/// A bidirectional, message-based channel to one MCP server.
///
/// A session is the only consumer of `receive`; implementations may assume a
/// single reader but must accept `send` from many tasks concurrently and keep
/// each frame contiguous on the wire.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Returns the type of this transport.
    fn transport_type(&self) -> TransportType;

    /// Returns the current state of the transport.
    async fn state(&self) -> TransportState;

    /// Establishes the connection. Calling this on a connected transport is a no-op.
    async fn connect(&self) -> TransportResult<()>;

    /// Closes the connection and stops any background readers.
    async fn disconnect(&self) -> TransportResult<()>;

    /// Sends a single frame.
    async fn send(&self, message: TransportMessage) -> TransportResult<()>;

    /// Waits for the next frame.
    ///
    /// Returns `Ok(None)` once the peer has closed its side of the stream.
    async fn receive(&self) -> TransportResult<Option<TransportMessage>>;

    /// Returns a snapshot of the transport's traffic counters.
    async fn metrics(&self) -> TransportMetrics;

    /// Returns `true` if the transport is currently in the `Connected` state.
    async fn is_connected(&self) -> bool {
        matches!(self.state().await, TransportState::Connected)
    }

    /// Returns the endpoint address or identifier for this transport, if applicable.
    fn endpoint(&self) -> Option<String> {
        None
    }
}
