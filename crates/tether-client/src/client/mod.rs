//! Session core implementation
//!
//! - `core`: the [`Session`] handle, handshake and close
//! - `dispatcher`: pending-call table and receive loop
//! - `state`: lifecycle states and checked transitions
//! - `config`: [`SessionConfig`]
//! - `builder`: [`SessionBuilder`]
//! - `operations`: discovery, tools, resources, prompts, and utilities

pub mod builder;
pub mod config;
pub mod core;
pub(crate) mod dispatcher;
pub mod operations;
pub mod state;

pub use builder::SessionBuilder;
pub use config::SessionConfig;
pub use self::core::{ServerDetails, Session};
pub use dispatcher::CallOptions;
pub use operations::tools::{ToolExecutionError, ToolOutcome};
pub use state::SessionState;
