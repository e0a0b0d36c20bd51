//! Client-initiated MCP operations
//!
//! - `discovery`: list and cache tools, resources and prompts
//! - `tools`: gated, validated tool calls
//! - `resources`: reads and subscriptions
//! - `prompts`: prompt rendering
//! - `connection`: raw invoke/notify, ping, server log level
//!
//! `sampling/createMessage` and `roots/list` travel the other way; see
//! [`crate::handlers`].

pub mod connection;
pub mod discovery;
pub mod prompts;
pub mod resources;
pub mod tools;
