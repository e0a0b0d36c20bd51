//! Session configuration
//!
//! [`SessionConfig`] is plain data. It derives serde with field defaults, so
//! a host can keep it in whatever config format it already uses; durations
//! are stored in milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_protocol::VersionRange;
use tether_protocol::types::{ClientCapabilities, Implementation};

/// Configuration for one [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name and version announced in `initialize`
    pub client_info: Implementation,

    /// Capabilities announced in `initialize`; derived from the registered
    /// handlers when unset
    pub capabilities: Option<ClientCapabilities>,

    /// Protocol versions this client speaks
    pub versions: VersionRange,

    /// Default per-request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Budget for the whole handshake in milliseconds
    pub handshake_timeout_ms: u64,

    /// Send `notifications/cancelled` when a call times out or is cancelled
    pub propagate_cancellation: bool,

    /// Check tool arguments against `inputSchema` before sending
    pub validate_tool_arguments: bool,

    /// Extra attempts for a failed discovery
    pub discovery_retries: u32,

    /// Pause between discovery attempts in milliseconds
    pub retry_delay_ms: u64,

    /// Buffer of the notification and fault broadcast channels
    pub notification_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_info: Implementation::new("tether", env!("CARGO_PKG_VERSION")),
            capabilities: None,
            versions: VersionRange::default(),
            request_timeout_ms: 30_000,   // 30 seconds
            handshake_timeout_ms: 30_000, // 30 seconds
            propagate_cancellation: true,
            validate_tool_arguments: true,
            discovery_retries: 0,
            retry_delay_ms: 1_000, // 1 second
            notification_capacity: 256,
        }
    }
}

impl SessionConfig {
    /// Default per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Handshake budget.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Pause between discovery attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
