//! Standard I/O transport.
//!
//! Newline-delimited JSON over a pair of byte streams: the current process's
//! stdin/stdout, a spawned child process, or any raw reader/writer pair.
//!
//! Locking follows the usual split for async I/O:
//!
//! - `parking_lot::Mutex` for state and the child handle (never held across `.await`)
//! - [`AtomicMetrics`] for counters
//! - `tokio::sync::Mutex` for the writer and the receive channel (held across `.await`)

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, error, trace, warn};

use crate::error::{TransportError, TransportResult};
use crate::message::TransportMessage;
use crate::metrics::{AtomicMetrics, TransportMetrics};
use crate::traits::Transport;
use crate::types::{TransportState, TransportType};

type BoxedAsyncRead = Pin<Box<dyn AsyncRead + Send + Sync + 'static>>;
type BoxedAsyncWrite = Pin<Box<dyn AsyncWrite + Send + Sync + 'static>>;
type LineWriter = FramedWrite<BoxedAsyncWrite, LinesCodec>;
type Inbound = TransportResult<TransportMessage>;

const CHANNEL_CAPACITY: usize = 1000;

/// Source of stdio streams for the transport
enum StreamSource {
    /// Use the current process's stdin/stdout
    ProcessStdio,
    /// Use raw streams, taken on first connect
    Raw {
        reader: Option<BoxedAsyncRead>,
        writer: Option<BoxedAsyncWrite>,
    },
}

impl std::fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProcessStdio => write!(f, "ProcessStdio"),
            Self::Raw { reader, writer } => f
                .debug_struct("Raw")
                .field("reader", &reader.as_ref().map(|_| "<async reader>"))
                .field("writer", &writer.as_ref().map(|_| "<async writer>"))
                .finish(),
        }
    }
}

/// Standard I/O transport implementation
///
/// # Examples
///
/// ```rust,ignore
/// use tokio::process::Command;
/// use tether_transport::StdioTransport;
///
/// let transport = StdioTransport::spawn(Command::new("my-mcp-server").arg("--stdio"))?;
/// ```
pub struct StdioTransport {
    state: Mutex<TransportState>,
    max_message_size: usize,
    metrics: Arc<AtomicMetrics>,
    stream_source: Mutex<StreamSource>,
    writer: TokioMutex<Option<LineWriter>>,
    inbound: TokioMutex<Option<mpsc::Receiver<Inbound>>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    child: Mutex<Option<Child>>,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("state", &*self.state.lock())
            .field("max_message_size", &self.max_message_size)
            .field("metrics", &self.metrics)
            .field("stream_source", &*self.stream_source.lock())
            .field("child", &self.child.lock().as_ref().and_then(Child::id))
            .finish_non_exhaustive()
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl StdioTransport {
    fn with_source(source: StreamSource) -> Self {
        Self {
            state: Mutex::new(TransportState::Disconnected),
            max_message_size: tether_protocol::MAX_MESSAGE_SIZE,
            metrics: Arc::new(AtomicMetrics::default()),
            stream_source: Mutex::new(source),
            writer: TokioMutex::new(None),
            inbound: TokioMutex::new(None),
            reader_task: Mutex::new(None),
            child: Mutex::new(None),
        }
    }

    /// Create a stdio transport over the current process's stdin/stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_source(StreamSource::ProcessStdio)
    }

    /// Spawn a server process and talk to it over its stdin/stdout.
    ///
    /// The child is killed when the transport disconnects or is dropped.
    /// Its stderr is inherited unless the command configures otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    pub fn spawn(command: &mut Command) -> TransportResult<Self> {
        let mut child = command
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::ConnectionFailed(format!("spawn failed: {e}")))?;

        let transport = Self::from_child(&mut child)?;
        *transport.child.lock() = Some(child);
        Ok(transport)
    }

    /// Create a stdio transport from an already spawned child process.
    ///
    /// The child must have been spawned with piped stdin and stdout. The
    /// caller keeps ownership of the child handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the child's stdin or stdout was not piped.
    pub fn from_child(child: &mut Child) -> TransportResult<Self> {
        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::ConfigurationError(
                "Child process stdin was not piped. Use Stdio::piped() when spawning.".to_string(),
            )
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::ConfigurationError(
                "Child process stdout was not piped. Use Stdio::piped() when spawning.".to_string(),
            )
        })?;

        Ok(Self::from_raw(stdout, stdin))
    }

    /// Create a stdio transport from raw async streams.
    ///
    /// `reader` is what the server writes to (its stdout); `writer` is what the
    /// server reads from (its stdin).
    pub fn from_raw<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
        W: AsyncWrite + Send + Sync + 'static,
    {
        Self::with_source(StreamSource::Raw {
            reader: Some(Box::pin(reader)),
            writer: Some(Box::pin(writer)),
        })
    }

    /// Override the maximum accepted line length in bytes.
    #[must_use]
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    fn set_state(&self, new_state: TransportState) {
        let mut state = self.state.lock();
        if *state != new_state {
            trace!("Stdio transport state: {} -> {}", *state, new_state);
            *state = new_state;
        }
    }

    fn take_streams(&self) -> TransportResult<(BoxedAsyncRead, BoxedAsyncWrite)> {
        let mut source = self.stream_source.lock();
        match &mut *source {
            StreamSource::ProcessStdio => {
                Ok((Box::pin(tokio::io::stdin()), Box::pin(tokio::io::stdout())))
            }
            StreamSource::Raw { reader, writer } => {
                let reader = reader.take().ok_or_else(|| {
                    TransportError::ConfigurationError(
                        "Raw reader stream already consumed".to_string(),
                    )
                })?;
                let writer = writer.take().ok_or_else(|| {
                    TransportError::ConfigurationError(
                        "Raw writer stream already consumed".to_string(),
                    )
                })?;
                Ok((reader, writer))
            }
        }
    }

    async fn setup_streams(&self) -> TransportResult<()> {
        let (reader, writer) = self.take_streams()?;

        *self.writer.lock().await = Some(FramedWrite::new(writer, LinesCodec::new()));

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        *self.inbound.lock().await = Some(rx);

        let lines = FramedRead::new(
            BufReader::new(reader),
            LinesCodec::new_with_max_length(self.max_message_size),
        );
        let task = tokio::spawn(read_lines(lines, tx, Arc::clone(&self.metrics)));
        *self.reader_task.lock() = Some(task);

        Ok(())
    }

    fn validate_outbound(&self, message: &TransportMessage) -> TransportResult<String> {
        let line = std::str::from_utf8(&message.payload)
            .map_err(|e| TransportError::SerializationFailed(e.to_string()))?;

        // Frames are newline-delimited, so a frame may not contain one.
        if line.contains('\n') || line.contains('\r') {
            return Err(TransportError::ProtocolError(
                "Message contains embedded newlines".to_string(),
            ));
        }

        if line.len() > self.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: line.len(),
                max: self.max_message_size,
            });
        }

        Ok(line.to_string())
    }
}

async fn read_lines(
    mut lines: FramedRead<BufReader<BoxedAsyncRead>, LinesCodec>,
    tx: mpsc::Sender<Inbound>,
    metrics: Arc<AtomicMetrics>,
) {
    let max = lines.decoder().max_length();
    while let Some(result) = lines.next().await {
        let item = match result {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                trace!("Received line: {}", line);
                metrics.record_received(line.len());
                Ok(TransportMessage::with_content_type(
                    line.to_string(),
                    "application/json",
                ))
            }
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!("Discarding oversized line from server");
                Err(TransportError::ProtocolError(format!(
                    "inbound line exceeds {max} bytes"
                )))
            }
            Err(LinesCodecError::Io(e)) => {
                error!("Failed to read from server stream: {}", e);
                let _ = tx.send(Err(TransportError::ReceiveFailed(e.to_string()))).await;
                break;
            }
        };

        if tx.send(item).await.is_err() {
            debug!("Receive channel closed, stopping reader task");
            break;
        }
    }

    debug!("Stdio reader task completed");
}

#[async_trait]
impl Transport for StdioTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Stdio
    }

    async fn state(&self) -> TransportState {
        self.state.lock().clone()
    }

    async fn connect(&self) -> TransportResult<()> {
        if matches!(self.state().await, TransportState::Connected) {
            return Ok(());
        }

        self.set_state(TransportState::Connecting);

        match self.setup_streams().await {
            Ok(()) => {
                self.metrics.connections.fetch_add(1, Ordering::Relaxed);
                self.set_state(TransportState::Connected);
                debug!("Stdio transport connected");
                Ok(())
            }
            Err(e) => {
                self.metrics
                    .failed_connections
                    .fetch_add(1, Ordering::Relaxed);
                self.set_state(TransportState::Failed {
                    reason: e.to_string(),
                });
                error!("Failed to connect stdio transport: {}", e);
                Err(e)
            }
        }
    }

    async fn disconnect(&self) -> TransportResult<()> {
        if matches!(self.state().await, TransportState::Disconnected) {
            return Ok(());
        }

        self.set_state(TransportState::Disconnecting);

        // Closing the server's stdin is the polite shutdown signal.
        *self.writer.lock().await = None;
        *self.inbound.lock().await = None;

        let task = self.reader_task.lock().take();
        if let Some(task) = task {
            task.abort();
        }

        let child = self.child.lock().take();
        if let Some(mut child) = child
            && let Err(e) = child.start_kill()
        {
            debug!("Server process already gone: {}", e);
        }

        self.set_state(TransportState::Disconnected);
        debug!("Stdio transport disconnected");
        Ok(())
    }

    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        let state = self.state().await;
        if !matches!(state, TransportState::Connected) {
            return Err(TransportError::ConnectionFailed(format!(
                "Transport not connected: {state}"
            )));
        }

        let line = self.validate_outbound(&message)?;
        let size = line.len();

        let mut writer = self.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Err(TransportError::SendFailed(
                "Stdout writer not available".to_string(),
            ));
        };

        // `send` on a FramedWrite flushes the sink.
        if let Err(e) = writer.send(line).await {
            error!("Failed to send message: {}", e);
            self.set_state(TransportState::Failed {
                reason: e.to_string(),
            });
            return Err(TransportError::ConnectionLost(e.to_string()));
        }

        self.metrics.record_sent(size);
        trace!("Sent message: {} bytes", size);
        Ok(())
    }

    async fn receive(&self) -> TransportResult<Option<TransportMessage>> {
        let mut inbound = self.inbound.lock().await;
        let Some(receiver) = inbound.as_mut() else {
            return Err(TransportError::ReceiveFailed(
                "Receive channel not available".to_string(),
            ));
        };

        match receiver.recv().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(e)) => {
                if e.is_fatal() {
                    self.set_state(TransportState::Failed {
                        reason: e.to_string(),
                    });
                }
                Err(e)
            }
            None => {
                debug!("Server closed its output stream");
                self.set_state(TransportState::Disconnected);
                Ok(None)
            }
        }
    }

    async fn metrics(&self) -> TransportMetrics {
        self.metrics.snapshot()
    }

    fn endpoint(&self) -> Option<String> {
        Some("stdio://".to_string())
    }
}
