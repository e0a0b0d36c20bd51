//! Handlers for server-initiated requests
//!
//! MCP is bidirectional: besides answering the client, a server may ask the
//! client to run an LLM completion (`sampling/createMessage`), to list its
//! filesystem roots (`roots/list`), or simply to answer a `ping`. Each inbound
//! request is decoded into the closed [`ServerRequest`] enum and dispatched
//! through the [`Handlers`] table fixed at construction time.
//!
//! ## Error Code Mapping
//!
//! | Outcome | JSON-RPC code |
//! |---------|---------------|
//! | [`HandlerError::UserCancelled`] | `-1` |
//! | [`HandlerError::InvalidInput`] | `-32602` |
//! | [`HandlerError::Timeout`] | `-32801` |
//! | any other handler error | `-32603` |
//! | no handler registered, unknown method | `-32601` |
//!
//! ## Usage
//!
//! ```rust
//! use async_trait::async_trait;
//! use tether_client::handlers::{HandlerResult, SamplingHandler};
//! use tether_protocol::types::{ContentBlock, CreateMessageRequest, CreateMessageResult, Role};
//!
//! #[derive(Debug)]
//! struct CannedModel;
//!
//! #[async_trait]
//! impl SamplingHandler for CannedModel {
//!     async fn create_message(
//!         &self,
//!         _request: CreateMessageRequest,
//!     ) -> HandlerResult<CreateMessageResult> {
//!         Ok(CreateMessageResult {
//!             role: Role::Assistant,
//!             content: ContentBlock::text("hello"),
//!             model: "canned-1".to_string(),
//!             stop_reason: Some("endTurn".to_string()),
//!         })
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tether_protocol::methods;
use tether_protocol::types::{
    ClientCapabilities, CreateMessageRequest, CreateMessageResult, EmptyResult, ListRootsResult,
    Root, RootsCapability, SamplingCapability,
};
use tether_protocol::{JsonRpcError, JsonRpcErrorCode};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors a reverse-call handler can report back to the server.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum HandlerError {
    /// The user declined the request
    #[error("User cancelled the operation")]
    UserCancelled,

    /// The handler gave up waiting
    #[error("Handler operation timed out after {timeout_seconds} seconds")]
    Timeout {
        /// Elapsed budget
        timeout_seconds: u64,
    },

    /// The request parameters were unacceptable
    #[error("Invalid input: {details}")]
    InvalidInput {
        /// What was wrong
        details: String,
    },

    /// Anything else
    #[error("Handler error: {message}")]
    Generic {
        /// Description
        message: String,
    },
}

impl HandlerError {
    /// Shorthand for [`HandlerError::Generic`].
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// JSON-RPC error sent back to the server.
    #[must_use]
    pub fn into_jsonrpc_error(&self) -> JsonRpcError {
        let (code, message) = match self {
            Self::UserCancelled => (-1, "User rejected sampling request".to_string()),
            Self::Timeout { timeout_seconds } => (
                -32801,
                format!("Handler operation timed out after {timeout_seconds} seconds"),
            ),
            Self::InvalidInput { details } => (
                JsonRpcErrorCode::InvalidParams.code(),
                format!("Invalid input: {details}"),
            ),
            Self::Generic { message } => (
                JsonRpcErrorCode::InternalError.code(),
                format!("Handler error: {message}"),
            ),
        };
        JsonRpcError::new(code, message)
    }
}

/// Result type for handler implementations.
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Runs LLM completions on behalf of the server.
#[async_trait]
pub trait SamplingHandler: Send + Sync + std::fmt::Debug {
    /// Produce one completion for the given conversation.
    async fn create_message(
        &self,
        request: CreateMessageRequest,
    ) -> HandlerResult<CreateMessageResult>;
}

/// Reports the filesystem roots the server may operate on.
#[async_trait]
pub trait RootsHandler: Send + Sync + std::fmt::Debug {
    /// Current roots.
    async fn list_roots(&self) -> HandlerResult<Vec<Root>>;
}

/// Fixed list of roots.
#[derive(Debug, Clone, Default)]
pub struct StaticRoots(pub Vec<Root>);

#[async_trait]
impl RootsHandler for StaticRoots {
    async fn list_roots(&self) -> HandlerResult<Vec<Root>> {
        Ok(self.0.clone())
    }
}

/// A request the server sent to this client.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ServerRequest {
    /// `sampling/createMessage`
    CreateMessage(CreateMessageRequest),
    /// `roots/list`
    ListRoots,
    /// `ping`
    Ping,
}

impl ServerRequest {
    /// Decode a request from its method and params.
    ///
    /// # Errors
    ///
    /// `-32601` for methods a client does not serve, `-32602` for params that
    /// do not match the method.
    pub fn parse(method: &str, params: Option<Value>) -> Result<Self, JsonRpcError> {
        match method {
            methods::SAMPLING_CREATE_MESSAGE => {
                let params = params.ok_or_else(|| JsonRpcError::invalid_params("missing params"))?;
                serde_json::from_value(params)
                    .map(Self::CreateMessage)
                    .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))
            }
            methods::ROOTS_LIST => Ok(Self::ListRoots),
            methods::PING => Ok(Self::Ping),
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    /// Method name on the wire.
    pub fn method(&self) -> &'static str {
        match self {
            Self::CreateMessage(_) => methods::SAMPLING_CREATE_MESSAGE,
            Self::ListRoots => methods::ROOTS_LIST,
            Self::Ping => methods::PING,
        }
    }
}

/// Handler table consulted for every [`ServerRequest`].
#[derive(Debug, Clone, Default)]
pub struct Handlers {
    /// Handler for `sampling/createMessage`
    pub sampling: Option<Arc<dyn SamplingHandler>>,
    /// Handler for `roots/list`
    pub roots: Option<Arc<dyn RootsHandler>>,
}

impl Handlers {
    /// Capabilities implied by the registered handlers.
    pub fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            experimental: None,
            roots: self.roots.as_ref().map(|_| RootsCapability {
                list_changed: Some(false),
            }),
            sampling: self.sampling.as_ref().map(|_| SamplingCapability {}),
        }
    }

    /// Serve one request, producing the result or the error to send back.
    pub async fn dispatch(&self, request: ServerRequest) -> Result<Value, JsonRpcError> {
        let method = request.method();
        let outcome = match request {
            ServerRequest::CreateMessage(params) => {
                let Some(handler) = &self.sampling else {
                    debug!("No sampling handler registered, rejecting {method}");
                    return Err(unsupported("Sampling"));
                };
                to_value(handler.create_message(params).await)
            }
            ServerRequest::ListRoots => {
                let Some(handler) = &self.roots else {
                    debug!("No roots handler registered, rejecting {method}");
                    return Err(unsupported("Roots"));
                };
                to_value(
                    handler
                        .list_roots()
                        .await
                        .map(|roots| ListRootsResult { roots }),
                )
            }
            ServerRequest::Ping => to_value(Ok(EmptyResult {})),
        };

        outcome.map_err(|e| {
            warn!(method, error = %e, "Reverse-call handler failed");
            e.into_jsonrpc_error()
        })
    }
}

fn unsupported(capability: &str) -> JsonRpcError {
    JsonRpcError::new(
        JsonRpcErrorCode::MethodNotFound.code(),
        format!("{capability} not supported"),
    )
}

fn to_value<T: serde::Serialize>(result: HandlerResult<T>) -> HandlerResult<Value> {
    result.and_then(|value| {
        serde_json::to_value(value).map_err(|e| HandlerError::generic(e.to_string()))
    })
}
