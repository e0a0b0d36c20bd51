//! # Tether Protocol
//!
//! Wire-level building blocks for an MCP client session:
//!
//! - **JSON-RPC 2.0** envelopes with typed correlation ids ([`jsonrpc`])
//! - **MCP payload types** for the handshake, tools, resources, prompts,
//!   sampling, roots and logging ([`types`])
//! - A pluggable **codec** that turns frames into bytes and classifies
//!   inbound bytes as request, response or notification ([`codec`])
//! - **Protocol version** ordering and range negotiation ([`version`])
//!
//! Nothing in this crate performs I/O. Transports live in `tether-transport`
//! and the session runtime in `tether-client`.
//!
//! ```rust
//! use tether_protocol::{Codec, JsonCodec, JsonRpcMessage, JsonRpcRequest, RequestId};
//!
//! let codec = JsonCodec::new();
//! let request = JsonRpcRequest::new("ping", None, RequestId::Number(1));
//! let bytes = codec.encode(&JsonRpcMessage::Request(request)).unwrap();
//! let decoded = codec.decode(&bytes).unwrap();
//! assert!(matches!(decoded, JsonRpcMessage::Request(_)));
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

pub mod codec;
pub mod error;
pub mod jsonrpc;
pub mod methods;
pub mod types;
pub mod version;

pub use codec::{Codec, CodecError, CodecErrorKind, JsonCodec};
pub use error::{ProtocolError, ProtocolResult};
pub use jsonrpc::{
    JsonRpcError, JsonRpcErrorCode, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, JsonRpcResponsePayload, JsonRpcVersion, RequestId, ResponseId,
};
pub use version::{
    KNOWN_PROTOCOL_VERSIONS, LATEST_PROTOCOL_VERSION, ProtocolVersion, VersionRange, negotiate,
};

/// Maximum message size accepted by the bundled transports (16 MiB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
