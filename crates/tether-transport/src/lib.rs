//! # Tether Transport
//!
//! The byte-moving layer under a tether session. A transport delivers opaque
//! frames in both directions and owns its connection lifecycle; it knows
//! nothing about JSON-RPC correlation or MCP semantics.
//!
//! This crate defines:
//! - **Trait**: [`Transport`]
//! - **Types**: [`TransportState`], [`TransportType`], [`TransportMessage`]
//! - **Errors**: [`TransportError`], [`TransportResult`]
//! - **Metrics**: [`TransportMetrics`], [`AtomicMetrics`]
//! - **Implementations**: [`MemoryTransport`] and, with the `stdio` feature,
//!   `StdioTransport`
//!
//! ## End of stream
//!
//! [`Transport::receive`] returns `Ok(None)` once the peer has closed the
//! stream. Errors for which [`TransportError::is_fatal`] holds mean the
//! connection is gone; other errors concern a single frame.

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

mod error;
mod memory;
mod message;
mod metrics;
#[cfg(feature = "stdio")]
mod stdio;
mod traits;
mod types;

pub use error::{TransportError, TransportResult};
pub use memory::MemoryTransport;
pub use message::TransportMessage;
pub use metrics::{AtomicMetrics, TransportMetrics};
#[cfg(feature = "stdio")]
#[cfg_attr(docsrs, doc(cfg(feature = "stdio")))]
pub use stdio::StdioTransport;
pub use traits::Transport;
pub use types::{TransportState, TransportType};
