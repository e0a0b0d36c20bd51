//! MCP payload types.
//!
//! # Module Organization
//!
//! - [`capabilities`] - Client/server capability flags
//! - [`content`] - Multi-part content blocks (text, image, audio, resources)
//! - [`initialization`] - Handshake request and result
//! - [`tools`] - Tool descriptors and call results
//! - [`resources`] - Resource descriptors and read results
//! - [`prompts`] - Prompt templates
//! - [`sampling`] - Server-initiated LLM completion requests
//! - [`roots`] - Filesystem roots exposed by the client
//! - [`logging`] - Log levels and server log records
//! - [`notifications`] - Progress, cancellation and resource-update params

pub mod capabilities;
pub mod content;
pub mod initialization;
pub mod logging;
pub mod notifications;
pub mod prompts;
pub mod resources;
pub mod roots;
pub mod sampling;
pub mod tools;

pub use capabilities::*;
pub use content::*;
pub use initialization::*;
pub use logging::*;
pub use notifications::*;
pub use prompts::*;
pub use resources::*;
pub use roots::*;
pub use sampling::*;
pub use tools::*;

use serde::{Deserialize, Serialize};

/// Opaque pagination cursor
pub type Cursor = String;

/// Name and version of an MCP implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Implementation name
    pub name: String,
    /// Implementation display title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Implementation version
    pub version: String,
}

impl Implementation {
    /// Implementation info without a display title.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            version: version.into(),
        }
    }
}

/// Pagination params shared by every `*/list` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatedRequest {
    /// Cursor returned by the previous page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// Message role in sampling and prompt conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Human side
    User,
    /// Model side
    Assistant,
}

/// Result with no payload (`ping`, `resources/subscribe`, `logging/setLevel`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyResult {}
