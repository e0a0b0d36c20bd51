//! # Tether Client
//!
//! Client-side session runtime for the Model Context Protocol. A host
//! application uses a [`Session`] to talk to one MCP server over any
//! [`Transport`](tether_transport::Transport).
//!
//! ## Features
//!
//! - Lifecycle state machine with a version-negotiating handshake
//! - Cached tool, resource and prompt listings with paginated discovery and
//!   staleness tracking
//! - Concurrent calls over one connection, each with its own timeout and
//!   cancellation token
//! - An approval gate consulted before every tool call
//! - Answers to server-initiated `sampling/createMessage`, `roots/list` and
//!   `ping` requests
//! - Broadcast channels for server notifications and connection faults
//!
//! ## Architecture
//!
//! ```text
//! Host application
//!        ↓
//! Session (this crate): state, registry, approval gate, handlers
//!        ↓
//! Dispatcher: pending calls, receive loop
//!        ↓
//! Codec (tether-protocol) → Transport (tether-transport)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use serde_json::json;
//! use tether_client::{CallOptions, CapabilityKind, Session, ToolPolicy};
//! use tether_transport::StdioTransport;
//! use tokio::process::Command;
//!
//! # async fn example() -> tether_client::Result<()> {
//! let session = Session::builder()
//!     .with_client_info("my-host", "1.0.0")
//!     .with_approval_gate(ToolPolicy::new().deny_destructive(true))
//!     .build();
//!
//! let transport = StdioTransport::spawn(&mut Command::new("my-mcp-server"))?;
//! session.connect(Box::new(transport)).await?;
//!
//! session.discover_all().await?;
//! for tool in session.tools() {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! match session.call_tool("echo", json!({"text": "hi"}), CallOptions::new()).await {
//!     Ok(outcome) => println!("{}", outcome.text()),
//!     Err(e) => eprintln!("Tool call failed: {e}"),
//! }
//!
//! session.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Notifications
//!
//! ```rust,no_run
//! use tether_client::{ServerNotification, Session};
//!
//! # async fn example(session: Session) {
//! let mut notifications = session.subscribe();
//! while let Ok(notification) = notifications.recv().await {
//!     if let ServerNotification::ListChanged(kind) = notification {
//!         let _ = session.discover(kind).await;
//!     }
//! }
//! # }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

pub mod approval;
pub mod client;
pub mod error;
pub mod handlers;
pub mod notifications;
pub mod registry;

pub use approval::{AllowAll, ApprovalDecision, ApprovalGate, ApprovalRequest, ToolPolicy};
pub use client::{
    CallOptions, ServerDetails, Session, SessionBuilder, SessionConfig, SessionState,
    ToolExecutionError, ToolOutcome,
};
pub use error::{Error, Result};
pub use handlers::{
    HandlerError, HandlerResult, Handlers, RootsHandler, SamplingHandler, ServerRequest,
    StaticRoots,
};
pub use notifications::ServerNotification;
pub use registry::{CapabilityDescriptor, CapabilityKind, CapabilityRegistry, Registries, Snapshot};

pub use tokio_util::sync::CancellationToken;

/// Common imports for host applications.
pub mod prelude {
    pub use crate::{
        AllowAll, ApprovalDecision, ApprovalGate, CallOptions, CancellationToken, CapabilityKind,
        Error, Result, ServerNotification, Session, SessionState, ToolOutcome, ToolPolicy,
    };
    pub use tether_protocol::types::{LogLevel, Prompt, Resource, Tool};
}
