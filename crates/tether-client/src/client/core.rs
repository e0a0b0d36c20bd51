//! Session handle and lifecycle
//!
//! [`Session`] is a cheaply cloneable handle to one server connection. All
//! clones share the same state machine, registry, and dispatcher, so a host
//! may hand clones to concurrent tasks. The receive loop only holds a weak
//! reference: dropping the last handle shuts the session down.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tether_protocol::types::{
    ClientCapabilities, Implementation, InitializeRequest, InitializeResult, ServerCapabilities,
};
use tether_protocol::{
    Codec, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ProtocolVersion, RequestId,
    methods, negotiate,
};
use tether_transport::Transport;
use tokio::sync::{broadcast, watch};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::builder::SessionBuilder;
use super::config::SessionConfig;
use super::dispatcher::{CallOptions, Dispatcher, DispatcherHooks};
use super::state::{SessionState, StateCell};
use crate::approval::ApprovalGate;
use crate::error::{Error, Result};
use crate::handlers::{Handlers, ServerRequest};
use crate::notifications::ServerNotification;
use crate::registry::Registries;

/// What the server told us during the handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerDetails {
    /// Revision both sides agreed on
    pub protocol_version: ProtocolVersion,
    /// Server name and version
    pub server_info: Implementation,
    /// Declared server capabilities
    pub capabilities: ServerCapabilities,
    /// Usage hints for the host
    pub instructions: Option<String>,
}

pub(crate) struct SessionInner {
    pub(crate) id: Uuid,
    pub(crate) config: SessionConfig,
    pub(crate) codec: Arc<dyn Codec>,
    pub(crate) handlers: Handlers,
    pub(crate) gate: Option<Arc<dyn ApprovalGate>>,
    pub(crate) state: StateCell,
    pub(crate) dispatcher: OnceLock<Arc<Dispatcher>>,
    pub(crate) server: OnceLock<ServerDetails>,
    pub(crate) endpoint: OnceLock<Option<String>>,
    pub(crate) failure: Mutex<Option<String>>,
    pub(crate) registries: Registries,
    pub(crate) notifications: broadcast::Sender<ServerNotification>,
    pub(crate) faults: broadcast::Sender<Error>,
    // Server-initiated requests still being handled, by their id.
    inflight: Arc<Mutex<HashMap<RequestId, AbortHandle>>>,
}

impl SessionInner {
    pub(crate) fn new(
        config: SessionConfig,
        codec: Arc<dyn Codec>,
        handlers: Handlers,
        gate: Option<Arc<dyn ApprovalGate>>,
    ) -> Self {
        let capacity = config.notification_capacity.max(1);
        let (notifications, _) = broadcast::channel(capacity);
        let (faults, _) = broadcast::channel(capacity);
        Self {
            id: Uuid::new_v4(),
            config,
            codec,
            handlers,
            gate,
            state: StateCell::new(),
            dispatcher: OnceLock::new(),
            server: OnceLock::new(),
            endpoint: OnceLock::new(),
            failure: Mutex::new(None),
            registries: Registries::default(),
            notifications,
            faults,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Dispatcher of a `Ready` session, or the error matching the state.
    pub(crate) fn ensure_ready(&self) -> Result<Arc<Dispatcher>> {
        match self.state.get() {
            SessionState::Ready => self
                .dispatcher
                .get()
                .cloned()
                .ok_or(Error::SessionClosed),
            SessionState::Closing | SessionState::Closed => Err(Error::SessionClosed),
            SessionState::Failed => Err(Error::connection_lost(
                self.failure
                    .lock()
                    .clone()
                    .unwrap_or_else(|| "session failed".to_string()),
            )),
            state => Err(Error::NotReady { state }),
        }
    }

    pub(crate) fn client_capabilities(&self) -> ClientCapabilities {
        self.config
            .capabilities
            .clone()
            .unwrap_or_else(|| self.handlers.capabilities())
    }

    fn publish_fault(&self, fault: Error) {
        // No receivers is fine.
        let _ = self.faults.send(fault);
    }

    fn on_notification(&self, raw: JsonRpcNotification) {
        let notification = ServerNotification::from(raw);
        match &notification {
            ServerNotification::ListChanged(kind) => {
                self.registries.mark_stale(*kind);
                debug!(kind = %kind, "Capability listing is stale");
            }
            ServerNotification::Cancelled(cancelled) => {
                let handle = self.inflight.lock().remove(&cancelled.request_id);
                if let Some(handle) = handle {
                    handle.abort();
                    debug!(id = %cancelled.request_id, "Server cancelled its request");
                }
            }
            ServerNotification::Other { method, .. } => {
                warn!(method = %method, "Unrecognised notification");
            }
            _ => {}
        }
        let _ = self.notifications.send(notification);
    }

    fn on_request(&self, request: JsonRpcRequest) {
        let Some(dispatcher) = self.dispatcher.get().cloned() else {
            return;
        };
        debug!(method = %request.method, id = %request.id, "Server request");

        let handlers = self.handlers.clone();
        let inflight = Arc::clone(&self.inflight);
        let id = request.id.clone();

        // Held across the spawn so the task cannot remove its entry first.
        let mut table = self.inflight.lock();
        let task = tokio::spawn(async move {
            let JsonRpcRequest {
                method, params, id, ..
            } = request;
            let result = match ServerRequest::parse(&method, params) {
                Ok(parsed) => handlers.dispatch(parsed).await,
                Err(e) => {
                    warn!(method = %method, error = %e, "Rejecting server request");
                    Err(e)
                }
            };
            inflight.lock().remove(&id);

            let response = match result {
                Ok(value) => JsonRpcResponse::success(id, value),
                Err(e) => JsonRpcResponse::error(Some(id), e),
            };
            if let Err(e) = dispatcher.respond(response).await {
                warn!(method = %method, error = %e, "Could not answer server request");
            }
        });
        table.insert(id, task.abort_handle());
    }

    fn on_connection_lost(&self, lost: Error) {
        if let Ok(previous) = self
            .state
            .transition(&[SessionState::Handshaking, SessionState::Ready], SessionState::Failed)
        {
            let reason = match &lost {
                Error::ConnectionLost { reason } => reason.clone(),
                other => other.to_string(),
            };
            *self.failure.lock() = Some(reason);
            error!(session = %self.id, from = %previous, error = %lost, "Connection lost");
        }
        self.abort_inflight();
        self.publish_fault(lost);
    }

    fn abort_inflight(&self) {
        for (_, handle) in self.inflight.lock().drain() {
            handle.abort();
        }
    }

    fn hooks(self: &Arc<Self>) -> DispatcherHooks {
        let weak: Weak<Self> = Arc::downgrade(self);
        let on_request = weak.clone();
        let on_notification = weak.clone();
        let on_fault = weak.clone();
        let on_lost = weak;

        DispatcherHooks {
            on_request: Arc::new(move |request: JsonRpcRequest| {
                if let Some(inner) = on_request.upgrade() {
                    inner.on_request(request);
                }
            }),
            on_notification: Arc::new(move |notification: JsonRpcNotification| {
                if let Some(inner) = on_notification.upgrade() {
                    inner.on_notification(notification);
                }
            }),
            on_fault: Arc::new(move |fault: Error| {
                if let Some(inner) = on_fault.upgrade() {
                    inner.publish_fault(fault);
                }
            }),
            on_lost: Arc::new(move |lost: Error| {
                if let Some(inner) = on_lost.upgrade() {
                    inner.on_connection_lost(lost);
                }
            }),
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.get() {
            dispatcher.shutdown(&Error::SessionClosed);
        }
        self.abort_inflight();
    }
}

/// One MCP client session.
///
/// # Examples
///
/// ```rust,no_run
/// use serde_json::json;
/// use tether_client::{CallOptions, CapabilityKind, Session};
/// use tether_transport::StdioTransport;
/// use tokio::process::Command;
///
/// # async fn example() -> tether_client::Result<()> {
/// let transport = StdioTransport::spawn(Command::new("my-mcp-server").arg("--stdio"))?;
/// let session = Session::builder().build();
/// session.connect(Box::new(transport)).await?;
///
/// session.discover(CapabilityKind::Tools).await?;
/// let outcome = session
///     .call_tool("echo", json!({"text": "hi"}), CallOptions::new())
///     .await?;
/// println!("{}", outcome.text());
///
/// session.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("state", &self.inner.state.get())
            .field("endpoint", &self.endpoint())
            .field("has_approval_gate", &self.inner.gate.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start building a session.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Session with the given configuration and no handlers or gate.
    pub fn new(config: SessionConfig) -> Self {
        SessionBuilder::new().with_config(config).build()
    }

    /// Unique id of this session, used in logs.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.state.get()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.watch()
    }

    /// Configuration the session was built with.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Transport endpoint, once connected.
    pub fn endpoint(&self) -> Option<String> {
        self.inner.endpoint.get().cloned().flatten()
    }

    /// Handshake outcome, once `Ready`.
    pub fn server_details(&self) -> Option<&ServerDetails> {
        self.inner.server.get()
    }

    /// Negotiated protocol revision, once `Ready`.
    pub fn negotiated_version(&self) -> Option<&ProtocolVersion> {
        self.server_details().map(|d| &d.protocol_version)
    }

    /// Server name and version, once `Ready`.
    pub fn server_info(&self) -> Option<&Implementation> {
        self.server_details().map(|d| &d.server_info)
    }

    /// Capabilities the server declared, once `Ready`.
    pub fn server_capabilities(&self) -> Option<&ServerCapabilities> {
        self.server_details().map(|d| &d.capabilities)
    }

    /// Capabilities this client announces.
    pub fn client_capabilities(&self) -> ClientCapabilities {
        self.inner.client_capabilities()
    }

    /// Receiver for server notifications, in arrival order.
    ///
    /// Only notifications arriving after the call are delivered. A receiver
    /// that falls behind by more than `notification_capacity` messages skips
    /// ahead and observes `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerNotification> {
        self.inner.notifications.subscribe()
    }

    /// Receiver for faults that have no caller to report to: undecodable
    /// frames, unreadable transport frames, and connection loss.
    pub fn faults(&self) -> broadcast::Receiver<Error> {
        self.inner.faults.subscribe()
    }

    /// Attach a transport and perform the handshake.
    ///
    /// Valid only on an `Unconnected` session. The session takes exclusive
    /// ownership of the transport.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the session was already connected
    /// - [`Error::Transport`] if the transport fails to connect
    /// - [`Error::VersionMismatch`] if no protocol revision is shared
    /// - [`Error::Timeout`] if the server does not answer within
    ///   `handshake_timeout`
    /// - [`Error::SessionClosed`] if `close` ran while connecting or during
    ///   the handshake
    ///
    /// Every error except `InvalidState` leaves the session `Failed` or
    /// `Closed`, with the transport released.
    pub async fn connect(&self, transport: Box<dyn Transport>) -> Result<()> {
        let inner = &self.inner;
        inner
            .state
            .transition(&[SessionState::Unconnected], SessionState::Handshaking)
            .map_err(|state| Error::InvalidState {
                operation: "connect",
                state,
            })?;

        let transport: Arc<dyn Transport> = Arc::from(transport);
        let _ = inner.endpoint.set(transport.endpoint());
        debug!(
            session = %inner.id,
            transport = %transport.transport_type(),
            endpoint = ?transport.endpoint(),
            "Connecting"
        );

        if let Err(e) = transport.connect().await {
            let reason = format!("transport connect failed: {e}");
            if inner
                .state
                .transition(&[SessionState::Handshaking], SessionState::Failed)
                .is_ok()
            {
                *inner.failure.lock() = Some(reason);
            }
            warn!(session = %inner.id, error = %e, "Transport connect failed");
            return Err(Error::Transport(e));
        }

        // `close` may have run while the transport was connecting.
        if inner.state.get() != SessionState::Handshaking {
            debug!(session = %inner.id, "Closed while connecting");
            if let Err(e) = transport.disconnect().await {
                warn!(session = %inner.id, error = %e, "Transport disconnect failed");
            }
            return Err(Error::SessionClosed);
        }

        let dispatcher = Dispatcher::new(
            transport,
            Arc::clone(&inner.codec),
            inner.config.request_timeout(),
            inner.config.propagate_cancellation,
        );
        // The Unconnected guard above makes this the only set.
        let _ = inner.dispatcher.set(Arc::clone(&dispatcher));

        // A `close` that ran before the set did not see the dispatcher.
        if inner.state.get() != SessionState::Handshaking {
            release(&dispatcher, &Error::SessionClosed).await;
            return Err(Error::SessionClosed);
        }
        dispatcher.start(inner.hooks());

        let budget = inner.config.handshake_timeout();
        let outcome = match tokio::time::timeout(budget, self.handshake(&dispatcher)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Timeout {
                method: methods::INITIALIZE.to_string(),
                timeout: budget,
            }),
        };

        let details = match outcome {
            Ok(details) => details,
            Err(err) => {
                self.abort_handshake(&dispatcher, &err).await;
                return Err(err);
            }
        };

        let version = details.protocol_version.clone();
        let server_name = details.server_info.name.clone();
        let _ = inner.server.set(details);

        match inner
            .state
            .transition(&[SessionState::Handshaking], SessionState::Ready)
        {
            Ok(_) => {
                info!(
                    session = %inner.id,
                    server = %server_name,
                    protocol_version = %version,
                    "Session ready"
                );
                Ok(())
            }
            Err(state) => {
                // Closed or lost while the handshake was finishing.
                release(&dispatcher, &Error::SessionClosed).await;
                match state {
                    SessionState::Failed => match inner.ensure_ready() {
                        Err(lost) => Err(lost),
                        Ok(_) => Err(Error::SessionClosed),
                    },
                    _ => Err(Error::SessionClosed),
                }
            }
        }
    }

    async fn handshake(&self, dispatcher: &Dispatcher) -> Result<ServerDetails> {
        let inner = &self.inner;
        let versions = &inner.config.versions;
        let request = InitializeRequest {
            protocol_version: versions.max.clone(),
            supported_versions: Some(versions.clone()),
            capabilities: inner.client_capabilities(),
            client_info: inner.config.client_info.clone(),
        };
        let params = serde_json::to_value(&request)
            .map_err(|e| Error::protocol(format!("cannot encode initialize params: {e}")))?;

        let options = CallOptions::new().with_timeout(inner.config.handshake_timeout());
        let value = dispatcher
            .request(methods::INITIALIZE, Some(params), &options)
            .await?;
        let result: InitializeResult = serde_json::from_value(value)
            .map_err(|e| Error::protocol(format!("invalid initialize result: {e}")))?;

        let server_range = result.server_range();
        let Some(protocol_version) = negotiate(versions, &server_range) else {
            return Err(Error::VersionMismatch {
                client: versions.clone(),
                server: server_range,
            });
        };

        dispatcher.notify(methods::INITIALIZED, None).await?;

        Ok(ServerDetails {
            protocol_version,
            server_info: result.server_info,
            capabilities: result.capabilities,
            instructions: result.instructions,
        })
    }

    async fn abort_handshake(&self, dispatcher: &Dispatcher, err: &Error) {
        let inner = &self.inner;
        let reason = format!("handshake failed: {err}");
        if inner
            .state
            .transition(&[SessionState::Handshaking], SessionState::Failed)
            .is_ok()
        {
            *inner.failure.lock() = Some(reason.clone());
            warn!(session = %inner.id, error = %err, "Handshake failed");
        }
        release(dispatcher, &Error::connection_lost(reason)).await;
    }

    /// Close the session and release its transport.
    ///
    /// Outstanding calls resolve with [`Error::SessionClosed`]. Closing a
    /// closed or failed session does nothing.
    ///
    /// ```rust
    /// use tether_client::{Session, SessionState};
    ///
    /// # tokio_test::block_on(async {
    /// let session = Session::builder().build();
    /// session.close().await.unwrap();
    /// assert_eq!(session.state(), SessionState::Closed);
    /// # });
    /// ```
    ///
    /// # Errors
    ///
    /// Currently infallible; transport shutdown failures are logged.
    pub async fn close(&self) -> Result<()> {
        let inner = &self.inner;
        let previous = match inner.state.transition(
            &[
                SessionState::Unconnected,
                SessionState::Handshaking,
                SessionState::Ready,
            ],
            SessionState::Closing,
        ) {
            Ok(previous) => previous,
            Err(state) => {
                debug!(session = %inner.id, state = %state, "Close ignored");
                return Ok(());
            }
        };

        if let Some(dispatcher) = inner.dispatcher.get() {
            release(dispatcher, &Error::SessionClosed).await;
        }
        inner.abort_inflight();

        let _ = inner
            .state
            .transition(&[SessionState::Closing], SessionState::Closed);
        info!(session = %inner.id, from = %previous, "Session closed");
        Ok(())
    }
}

/// Stop the receive loop, fail pending calls, and disconnect the transport.
async fn release(dispatcher: &Dispatcher, reason: &Error) {
    dispatcher.shutdown(reason);
    dispatcher.join().await;
    if let Err(e) = dispatcher.transport().disconnect().await {
        warn!(error = %e, "Transport disconnect failed");
    }
}
