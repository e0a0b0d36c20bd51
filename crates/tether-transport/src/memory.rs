//! In-process transport pair.
//!
//! [`MemoryTransport::pair`] returns two connected ends; whatever one end
//! sends, the other receives. Useful for running a scripted server in the
//! same process as the session, and for asserting on traffic counters.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tracing::{debug, trace};

use crate::error::{TransportError, TransportResult};
use crate::message::TransportMessage;
use crate::metrics::{AtomicMetrics, TransportMetrics};
use crate::traits::Transport;
use crate::types::{TransportState, TransportType};

const CHANNEL_CAPACITY: usize = 1000;

/// One end of an in-memory channel pair.
#[derive(Debug)]
pub struct MemoryTransport {
    name: &'static str,
    state: Mutex<TransportState>,
    outbound: Mutex<Option<mpsc::Sender<TransportMessage>>>,
    inbound: TokioMutex<mpsc::Receiver<TransportMessage>>,
    metrics: Arc<AtomicMetrics>,
}

impl MemoryTransport {
    /// Create two linked ends, `(client, server)`.
    ///
    /// ```rust
    /// use tether_transport::{MemoryTransport, Transport, TransportMessage};
    ///
    /// # tokio_test::block_on(async {
    /// let (client, server) = MemoryTransport::pair();
    /// client.connect().await.unwrap();
    /// server.connect().await.unwrap();
    ///
    /// client.send(TransportMessage::new(&b"{}"[..])).await.unwrap();
    /// let received = server.receive().await.unwrap().unwrap();
    /// assert_eq!(&received.payload[..], b"{}");
    /// # });
    /// ```
    pub fn pair() -> (Self, Self) {
        let (client_tx, server_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (server_tx, client_rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            Self::new("client", client_tx, client_rx),
            Self::new("server", server_tx, server_rx),
        )
    }

    fn new(
        name: &'static str,
        tx: mpsc::Sender<TransportMessage>,
        rx: mpsc::Receiver<TransportMessage>,
    ) -> Self {
        Self {
            name,
            state: Mutex::new(TransportState::Disconnected),
            outbound: Mutex::new(Some(tx)),
            inbound: TokioMutex::new(rx),
            metrics: Arc::new(AtomicMetrics::default()),
        }
    }

    /// Shared handle to this end's counters.
    ///
    /// Stays valid after the transport itself has been moved into a session.
    pub fn metrics_handle(&self) -> Arc<AtomicMetrics> {
        Arc::clone(&self.metrics)
    }

    fn set_state(&self, new_state: TransportState) {
        let mut state = self.state.lock();
        if *state != new_state {
            trace!(end = self.name, "memory transport state: {} -> {}", *state, new_state);
            *state = new_state;
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Memory
    }

    async fn state(&self) -> TransportState {
        self.state.lock().clone()
    }

    async fn connect(&self) -> TransportResult<()> {
        if self.outbound.lock().is_none() {
            self.metrics
                .failed_connections
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return Err(TransportError::ConnectionFailed(
                "memory transport was disconnected and cannot be reused".to_string(),
            ));
        }
        self.metrics
            .connections
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.set_state(TransportState::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        // Dropping the sender ends the peer's stream.
        self.outbound.lock().take();
        self.set_state(TransportState::Disconnected);
        debug!(end = self.name, "memory transport disconnected");
        Ok(())
    }

    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        let state = self.state().await;
        if state != TransportState::Connected {
            return Err(TransportError::ConnectionFailed(format!(
                "Transport not connected: {state}"
            )));
        }

        let sender = self.outbound.lock().clone().ok_or(TransportError::Closed)?;
        let size = message.size();
        sender.send(message).await.map_err(|_| {
            self.set_state(TransportState::Failed {
                reason: "peer dropped".to_string(),
            });
            TransportError::ConnectionLost("peer dropped".to_string())
        })?;

        self.metrics.record_sent(size);
        Ok(())
    }

    async fn receive(&self) -> TransportResult<Option<TransportMessage>> {
        let mut inbound = self.inbound.lock().await;
        match inbound.recv().await {
            Some(message) => {
                self.metrics.record_received(message.size());
                Ok(Some(message))
            }
            None => {
                debug!(end = self.name, "memory transport peer closed");
                Ok(None)
            }
        }
    }

    async fn metrics(&self) -> TransportMetrics {
        self.metrics.snapshot()
    }

    fn endpoint(&self) -> Option<String> {
        Some(format!("memory://{}", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_pair_delivers_in_both_directions() {
        let (client, server) = MemoryTransport::pair();
        client.connect().await.unwrap();
        server.connect().await.unwrap();

        client.send(TransportMessage::new("ping")).await.unwrap();
        let received = server.receive().await.unwrap().unwrap();
        assert_eq!(received.as_text(), Some("ping"));

        server.send(TransportMessage::new("pong")).await.unwrap();
        let received = client.receive().await.unwrap().unwrap();
        assert_eq!(received.as_text(), Some("pong"));

        assert_eq!(client.metrics().await.messages_sent, 1);
        assert_eq!(client.metrics().await.bytes_sent, 4);
    }

    #[tokio::test]
    async fn test_send_requires_connect() {
        let (client, _server) = MemoryTransport::pair();
        let err = client.send(TransportMessage::new("x")).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed(_)));
        assert_eq!(client.metrics_handle().snapshot().bytes_sent, 0);
    }

    #[tokio::test]
    async fn test_disconnect_ends_peer_stream() {
        let (client, server) = MemoryTransport::pair();
        client.connect().await.unwrap();
        server.connect().await.unwrap();

        server.disconnect().await.unwrap();
        assert_eq!(client.receive().await.unwrap(), None);
        assert!(client.connect().await.is_ok());
        assert!(server.connect().await.is_err());
    }

    #[tokio::test]
    async fn test_send_to_dropped_peer_is_connection_lost() {
        let (client, server) = MemoryTransport::pair();
        client.connect().await.unwrap();
        drop(server);

        let err = client.send(TransportMessage::new("x")).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(client.state().await, TransportState::Failed { .. }));
    }
}
