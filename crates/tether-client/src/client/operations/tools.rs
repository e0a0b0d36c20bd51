//! Tool calls
//!
//! A tool call passes three local checks before anything reaches the
//! transport: the tool must be cached, its arguments must match the cached
//! input schema, and the approval gate must allow it.

use serde_json::Value;
use tether_protocol::methods;
use tether_protocol::types::{CallToolRequest, CallToolResult, ContentBlock, Tool};
use tracing::{debug, info, warn};

use crate::approval::ApprovalRequest;
use crate::client::core::Session;
use crate::client::dispatcher::CallOptions;
use crate::error::{Error, Result};
use crate::registry::CapabilityKind;

/// A tool ran and reported failure (`isError: true`).
///
/// This is an ordinary outcome, not an [`Error`]: the call itself succeeded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Tool {tool} failed: {message}")]
pub struct ToolExecutionError {
    /// Tool that failed
    pub tool: String,
    /// Text content of the result, joined
    pub message: String,
    /// Full result content
    pub content: Vec<ContentBlock>,
    /// Structured content, if the tool produced any
    pub structured_content: Option<Value>,
}

impl ToolExecutionError {
    fn from_result(tool: &str, result: CallToolResult) -> Self {
        Self {
            tool: tool.to_string(),
            message: result.text(),
            content: result.content,
            structured_content: result.structured_content,
        }
    }
}

/// Result of [`Session::call_tool`].
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// The tool ran and succeeded
    Completed(CallToolResult),
    /// The tool ran and reported failure
    Failed(ToolExecutionError),
}

impl ToolOutcome {
    /// Whether the tool succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Text content of either variant.
    pub fn text(&self) -> String {
        match self {
            Self::Completed(result) => result.text(),
            Self::Failed(failure) => failure.message.clone(),
        }
    }

    /// Convert tool-level failure into `Err`.
    pub fn into_result(self) -> std::result::Result<CallToolResult, ToolExecutionError> {
        match self {
            Self::Completed(result) => Ok(result),
            Self::Failed(failure) => Err(failure),
        }
    }
}

impl Session {
    /// Call a cached tool.
    ///
    /// `arguments` must be a JSON object, or `null` for no arguments. Nothing
    /// is sent unless the tool is cached, the arguments satisfy its input
    /// schema (when validation is enabled), and the approval gate allows the
    /// call.
    ///
    /// # Errors
    ///
    /// - [`Error::NotReady`] or [`Error::SessionClosed`] outside `Ready`
    /// - [`Error::UnknownCapability`] if the tool is not cached; call
    ///   [`discover`](Session::discover) first
    /// - [`Error::InvalidArguments`] if the arguments are not an object or do
    ///   not satisfy the schema
    /// - [`Error::Denied`] if the approval gate refused
    /// - [`Error::Timeout`], [`Error::Cancelled`], [`Error::Server`] or
    ///   [`Error::ConnectionLost`] from the call itself
    /// - [`Error::ProtocolError`] if the result cannot be decoded
    ///
    /// A result with `isError: true` is returned as [`ToolOutcome::Failed`].
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        options: CallOptions,
    ) -> Result<ToolOutcome> {
        let dispatcher = self.inner.ensure_ready()?;

        let tool = self
            .inner
            .registries
            .tools
            .get(name)
            .ok_or_else(|| Error::UnknownCapability {
                kind: CapabilityKind::Tools,
                name: name.to_string(),
            })?;

        let arguments = match arguments {
            Value::Null => None,
            Value::Object(map) => Some(Value::Object(map)),
            other => {
                return Err(Error::InvalidArguments {
                    name: name.to_string(),
                    reason: format!("expected an object, got {}", json_type(&other)),
                });
            }
        };

        let empty = Value::Object(serde_json::Map::new());
        let checked = arguments.as_ref().unwrap_or(&empty);

        if self.inner.config.validate_tool_arguments {
            validate_arguments(&tool, checked)?;
        }

        if let Some(gate) = &self.inner.gate {
            let decision = gate.decide(&ApprovalRequest {
                tool_name: name,
                arguments: checked,
                tool: &tool,
            });
            if !decision.is_allowed() {
                let reason = decision.denial_reason().map(str::to_string);
                info!(session = %self.inner.id, tool = %name, reason = ?reason, "Tool call denied");
                return Err(Error::Denied {
                    tool: name.to_string(),
                    reason,
                });
            }
        }

        let params = serde_json::to_value(CallToolRequest {
            name: name.to_string(),
            arguments,
        })
        .map_err(|e| Error::protocol(format!("cannot encode {} params: {e}", methods::TOOLS_CALL)))?;

        debug!(session = %self.inner.id, tool = %name, "Calling tool");
        let value = dispatcher
            .request(methods::TOOLS_CALL, Some(params), &options)
            .await?;
        let result: CallToolResult = serde_json::from_value(value)
            .map_err(|e| Error::protocol(format!("invalid {} result: {e}", methods::TOOLS_CALL)))?;

        if result.is_error() {
            debug!(tool = %name, "Tool reported failure");
            return Ok(ToolOutcome::Failed(ToolExecutionError::from_result(
                name, result,
            )));
        }
        Ok(ToolOutcome::Completed(result))
    }
}

/// Check `arguments` against the tool's input schema.
fn validate_arguments(tool: &Tool, arguments: &Value) -> Result<()> {
    let validator = match jsonschema::validator_for(&tool.input_schema) {
        Ok(validator) => validator,
        Err(e) => {
            warn!(tool = %tool.name, error = %e, "Skipping validation, input schema is invalid");
            return Ok(());
        }
    };

    let errors: Vec<String> = validator
        .iter_errors(arguments)
        .map(|e| e.to_string())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidArguments {
            name: tool.name.clone(),
            reason: errors.join("; "),
        })
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
