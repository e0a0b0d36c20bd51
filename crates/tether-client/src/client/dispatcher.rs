//! Call dispatcher and receive loop
//!
//! The dispatcher multiplexes any number of outstanding requests over one
//! transport. A single background task is the only consumer of
//! `transport.receive()` and routes every inbound frame:
//!
//! - **Responses** resolve the waiting caller through its oneshot channel
//! - **Requests** from the server go to the session's request hook
//! - **Notifications** go to the session's notification hook
//! - **Undecodable frames** are reported as faults, and answered when they
//!   looked like a request
//!
//! ```text
//! caller ──register──▶ pending table ◀──resolve── receive loop ◀── transport
//!    │                                                 │
//!    └──encode + send──▶ transport                     ├──▶ request hook
//!                                                      └──▶ notification hook
//! ```
//!
//! Callers register their pending entry *before* the request is sent, so a
//! fast response can never race past its waiter. Entries leave the table on
//! resolution, timeout, cancellation, caller drop, or session end; a
//! response for an id no longer in the table is logged and discarded.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{Value, json};
use tether_protocol::{
    Codec, CodecError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    RequestId, methods,
};
use tether_transport::{Transport, TransportMessage};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Per-call overrides.
///
/// ```rust
/// use std::time::Duration;
/// use tether_client::CallOptions;
/// use tokio_util::sync::CancellationToken;
///
/// let token = CancellationToken::new();
/// let options = CallOptions::new()
///     .with_timeout(Duration::from_secs(5))
///     .with_cancel(token.clone());
/// // Later, from anywhere: token.cancel();
/// # assert!(options.timeout.is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Timeout for this call; the session default when `None`
    pub timeout: Option<Duration>,
    /// Token that abandons the call when cancelled
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    /// Options using the session defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

struct PendingCall {
    method: String,
    created_at: Instant,
    tx: oneshot::Sender<Result<Value>>,
}

#[derive(Default)]
struct PendingTable {
    calls: HashMap<RequestId, PendingCall>,
    // Once set, the dispatcher is finished and new calls fail with this.
    terminal: Option<Error>,
}

pub(crate) type RequestHook = Arc<dyn Fn(JsonRpcRequest) + Send + Sync>;
pub(crate) type NotificationHook = Arc<dyn Fn(JsonRpcNotification) + Send + Sync>;
pub(crate) type ErrorHook = Arc<dyn Fn(Error) + Send + Sync>;

/// Callbacks the receive loop invokes. None of them may block.
pub(crate) struct DispatcherHooks {
    pub(crate) on_request: RequestHook,
    pub(crate) on_notification: NotificationHook,
    pub(crate) on_fault: ErrorHook,
    pub(crate) on_lost: ErrorHook,
}

pub(crate) struct Dispatcher {
    transport: Arc<dyn Transport>,
    codec: Arc<dyn Codec>,
    pending: Mutex<PendingTable>,
    next_id: AtomicU64,
    default_timeout: Duration,
    propagate_cancellation: bool,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("transport", &self.transport.transport_type())
            .field("codec", &self.codec.name())
            .field("pending", &self.pending_count())
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

/// Removes the pending entry however the waiting future ends.
struct PendingGuard<'a> {
    dispatcher: &'a Dispatcher,
    id: &'a RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.dispatcher.pending.lock().calls.remove(self.id);
    }
}

impl Dispatcher {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        codec: Arc<dyn Codec>,
        default_timeout: Duration,
        propagate_cancellation: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            codec,
            pending: Mutex::new(PendingTable::default()),
            next_id: AtomicU64::new(1),
            default_timeout,
            propagate_cancellation,
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    /// Spawn the receive loop.
    pub(crate) fn start(self: &Arc<Self>, hooks: DispatcherHooks) {
        let handle = tokio::spawn(Arc::clone(self).run(hooks));
        *self.task.lock() = Some(handle);
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.lock().calls.len()
    }

    /// Send a request and wait for its outcome.
    pub(crate) async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: &CallOptions,
    ) -> Result<Value> {
        if options
            .cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            return Err(Error::Cancelled {
                method: method.to_string(),
            });
        }

        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed) as i64);
        let (tx, rx) = oneshot::channel();
        {
            let mut table = self.pending.lock();
            if let Some(terminal) = &table.terminal {
                return Err(terminal.clone());
            }
            table.calls.insert(
                id.clone(),
                PendingCall {
                    method: method.to_string(),
                    created_at: Instant::now(),
                    tx,
                },
            );
        }
        let _guard = PendingGuard {
            dispatcher: self,
            id: &id,
        };

        debug!(method, id = %id, "Dispatching request");
        let request = JsonRpcRequest::new(method, params, id.clone());
        self.send_frame(&JsonRpcMessage::Request(request)).await?;

        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let cancelled = async {
            match &options.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            outcome = rx => outcome.unwrap_or(Err(Error::SessionClosed)),
            () = cancelled => {
                self.abandon(&id, "cancelled by caller").await;
                Err(Error::Cancelled { method: method.to_string() })
            }
            () = tokio::time::sleep(timeout) => {
                self.abandon(&id, "request timed out").await;
                Err(Error::Timeout { method: method.to_string(), timeout })
            }
        }
    }

    /// Send a notification. Notifications never touch the pending table.
    pub(crate) async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        debug!(method, "Sending notification");
        let notification = JsonRpcNotification::new(method, params);
        self.send_frame(&JsonRpcMessage::Notification(notification))
            .await
    }

    /// Answer a server-initiated request.
    pub(crate) async fn respond(&self, response: JsonRpcResponse) -> Result<()> {
        self.send_frame(&JsonRpcMessage::Response(response)).await
    }

    async fn send_frame(&self, message: &JsonRpcMessage) -> Result<()> {
        let bytes = self
            .codec
            .encode(message)
            .map_err(|e| Error::protocol(e.to_string()))?;
        trace!(frame = %String::from_utf8_lossy(&bytes), "Outbound frame");
        self.transport
            .send(TransportMessage::with_content_type(
                bytes,
                self.codec.content_type(),
            ))
            .await
            .map_err(Error::from)
    }

    /// Drop a pending call and, if configured, tell the server.
    async fn abandon(&self, id: &RequestId, reason: &str) {
        let removed = self.pending.lock().calls.remove(id);
        let Some(call) = removed else {
            return;
        };
        debug!(method = %call.method, id = %id, reason, "Abandoning request");

        if self.propagate_cancellation {
            let params = json!({ "requestId": id, "reason": reason });
            if let Err(e) = self.notify(methods::CANCELLED, Some(params)).await {
                debug!(id = %id, error = %e, "Could not propagate cancellation");
            }
        }
    }

    /// Fail every pending call with `reason` and refuse new ones.
    ///
    /// Returns `false` if the dispatcher had already been finished.
    fn finish(&self, reason: &Error) -> bool {
        let drained = {
            let mut table = self.pending.lock();
            if table.terminal.is_some() {
                return false;
            }
            table.terminal = Some(reason.clone());
            std::mem::take(&mut table.calls)
        };

        if !drained.is_empty() {
            debug!(count = drained.len(), reason = %reason, "Resolving outstanding requests");
        }
        for (_, call) in drained {
            let _ = call.tx.send(Err(reason.clone()));
        }
        true
    }

    /// Resolve everything with `reason` and stop the receive loop.
    pub(crate) fn shutdown(&self, reason: &Error) {
        self.finish(reason);
        self.shutdown.cancel();
    }

    /// Wait for the receive loop to exit.
    pub(crate) async fn join(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
            && e.is_panic()
        {
            warn!("Receive loop panicked");
        }
    }

    async fn run(self: Arc<Self>, hooks: DispatcherHooks) {
        debug!(transport = %self.transport.transport_type(), "Receive loop started");

        let lost = loop {
            let received = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break None,
                received = self.transport.receive() => received,
            };

            match received {
                Ok(Some(message)) => self.route(&message.payload, &hooks),
                Ok(None) => break Some("transport closed by peer".to_string()),
                Err(e) if e.is_fatal() => break Some(e.to_string()),
                Err(e) => {
                    warn!(error = %e, "Dropping unreadable frame");
                    (hooks.on_fault)(Error::Transport(e));
                }
            }
        };

        if let Some(reason) = lost {
            let error = Error::connection_lost(reason);
            if self.finish(&error) {
                (hooks.on_lost)(error);
            }
            if let Err(e) = self.transport.disconnect().await {
                debug!(error = %e, "Transport disconnect after loss failed");
            }
        }

        debug!("Receive loop stopped");
    }

    fn route(self: &Arc<Self>, bytes: &[u8], hooks: &DispatcherHooks) {
        trace!(frame = %String::from_utf8_lossy(bytes), "Inbound frame");

        match self.codec.decode(bytes) {
            Ok(JsonRpcMessage::Response(response)) => self.resolve(response, hooks),
            Ok(JsonRpcMessage::Notification(notification)) => {
                (hooks.on_notification)(notification);
            }
            Ok(JsonRpcMessage::Request(request)) => (hooks.on_request)(request),
            Err(e) => self.reject(e, hooks),
        }
    }

    fn resolve(&self, response: JsonRpcResponse, hooks: &DispatcherHooks) {
        let (id, outcome) = response.into_parts();
        let Some(id) = id.0 else {
            let detail = match outcome {
                Err(e) => e.to_string(),
                Ok(_) => "result without id".to_string(),
            };
            warn!(detail = %detail, "Server response carries no request id");
            (hooks.on_fault)(Error::protocol(format!(
                "server response without request id: {detail}"
            )));
            return;
        };

        let call = self.pending.lock().calls.remove(&id);
        match call {
            Some(call) => {
                debug!(
                    method = %call.method,
                    id = %id,
                    elapsed = ?call.created_at.elapsed(),
                    "Response routed"
                );
                let _ = call.tx.send(outcome.map_err(Error::from));
            }
            None => debug!(id = %id, "Discarding response for unknown or abandoned request"),
        }
    }

    fn reject(self: &Arc<Self>, error: CodecError, hooks: &DispatcherHooks) {
        warn!(error = %error, "Undecodable frame");
        (hooks.on_fault)(Error::protocol(error.to_string()));

        if error.is_request() {
            let response = JsonRpcResponse::error(error.id.clone(), error.to_jsonrpc_error());
            let dispatcher = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = dispatcher.respond(response).await {
                    debug!(error = %e, "Could not answer malformed request");
                }
            });
        } else if let Some(id) = &error.id {
            let call = self.pending.lock().calls.remove(id);
            if let Some(call) = call {
                let _ = call.tx.send(Err(Error::protocol(format!(
                    "malformed response to {}: {}",
                    call.method, error.message
                ))));
            }
        }
    }
}
