//! Session builder
//!
//! Provides a fluent interface for configuring a session before creation.

use std::sync::Arc;

use tether_protocol::types::{ClientCapabilities, Implementation};
use tether_protocol::{Codec, JsonCodec, VersionRange};

use super::config::SessionConfig;
use super::core::{Session, SessionInner};
use crate::approval::ApprovalGate;
use crate::handlers::{Handlers, RootsHandler, SamplingHandler};

/// Builder for [`Session`].
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use tether_client::{Session, ToolPolicy};
///
/// let session = Session::builder()
///     .with_client_info("my-host", "0.1.0")
///     .with_request_timeout(Duration::from_secs(10))
///     .with_discovery_retries(2)
///     .with_approval_gate(ToolPolicy::new().deny("delete_file"))
///     .build();
/// assert_eq!(session.config().discovery_retries, 2);
/// ```
#[derive(Default)]
pub struct SessionBuilder {
    config: SessionConfig,
    handlers: Handlers,
    gate: Option<Arc<dyn ApprovalGate>>,
    codec: Option<Arc<dyn Codec>>,
}

impl std::fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("config", &self.config)
            .field("handlers", &self.handlers)
            .field("has_approval_gate", &self.gate.is_some())
            .field("codec", &self.codec)
            .finish()
    }
}

impl SessionBuilder {
    /// Builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Name and version announced to the server.
    pub fn with_client_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.config.client_info = Implementation::new(name, version);
        self
    }

    /// Announce these capabilities instead of deriving them from the handlers.
    pub fn with_capabilities(mut self, capabilities: ClientCapabilities) -> Self {
        self.config.capabilities = Some(capabilities);
        self
    }

    /// Protocol revisions this client accepts.
    pub fn with_versions(mut self, versions: VersionRange) -> Self {
        self.config.versions = versions;
        self
    }

    /// Default timeout for every request.
    pub fn with_request_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Budget for the handshake.
    pub fn with_handshake_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.handshake_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Whether to send `notifications/cancelled` for abandoned calls.
    pub fn with_cancellation_propagation(mut self, enabled: bool) -> Self {
        self.config.propagate_cancellation = enabled;
        self
    }

    /// Whether to check tool arguments against their schema before sending.
    pub fn with_argument_validation(mut self, enabled: bool) -> Self {
        self.config.validate_tool_arguments = enabled;
        self
    }

    /// Extra attempts for failed discoveries.
    pub fn with_discovery_retries(mut self, retries: u32) -> Self {
        self.config.discovery_retries = retries;
        self
    }

    /// Pause between discovery attempts.
    pub fn with_retry_delay(mut self, delay: std::time::Duration) -> Self {
        self.config.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Buffer size of the notification and fault channels.
    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.config.notification_capacity = capacity;
        self
    }

    /// Gate consulted before every tool call.
    pub fn with_approval_gate(mut self, gate: impl ApprovalGate + 'static) -> Self {
        self.gate = Some(Arc::new(gate));
        self
    }

    /// Gate consulted before every tool call, already shared.
    pub fn with_shared_approval_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Serve `sampling/createMessage` requests.
    pub fn with_sampling_handler(mut self, handler: Arc<dyn SamplingHandler>) -> Self {
        self.handlers.sampling = Some(handler);
        self
    }

    /// Serve `roots/list` requests.
    pub fn with_roots_handler(mut self, handler: Arc<dyn RootsHandler>) -> Self {
        self.handlers.roots = Some(handler);
        self
    }

    /// Frame codec; JSON by default.
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Create the session in the `Unconnected` state.
    pub fn build(self) -> Session {
        let codec = self.codec.unwrap_or_else(|| Arc::new(JsonCodec::new()));
        Session {
            inner: Arc::new(SessionInner::new(
                self.config,
                codec,
                self.handlers,
                self.gate,
            )),
        }
    }
}
