//! Tool descriptors and invocation payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Cursor;
use super::content::ContentBlock;

/// Behavioural hints a server attaches to a tool.
///
/// These are hints from the server and carry no guarantee; approval policies
/// that consult them should treat them as advisory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolAnnotations {
    /// Display title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// The tool does not modify its environment
    #[serde(rename = "readOnlyHint", default, skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,
    /// The tool may perform destructive updates
    #[serde(rename = "destructiveHint", default, skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
    /// Repeating the call with the same arguments has no additional effect
    #[serde(rename = "idempotentHint", default, skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,
    /// The tool interacts with entities outside the server
    #[serde(rename = "openWorldHint", default, skip_serializing_if = "Option::is_none")]
    pub open_world_hint: Option<bool>,
}

/// A tool the server exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Unique tool name
    pub name: String,
    /// Display title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the arguments object
    #[serde(rename = "inputSchema", default = "default_input_schema")]
    pub input_schema: Value,
    /// JSON Schema for `structuredContent`
    #[serde(rename = "outputSchema", default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Behavioural hints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
}

fn default_input_schema() -> Value {
    serde_json::json!({ "type": "object" })
}

impl Tool {
    /// Whether the server marked this tool as potentially destructive.
    ///
    /// MCP defaults `destructiveHint` to true unless the tool is read-only.
    pub fn is_destructive(&self) -> bool {
        match &self.annotations {
            Some(a) if a.read_only_hint == Some(true) => false,
            Some(a) => a.destructive_hint.unwrap_or(true),
            None => true,
        }
    }
}

/// Result of `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// One page of tools
    pub tools: Vec<Tool>,
    /// Cursor for the next page
    #[serde(rename = "nextCursor", default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// Params of `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolRequest {
    /// Tool name
    pub name: String,
    /// Arguments object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Result of `tools/call`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    /// Unstructured result content
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    /// Structured result matching the tool's output schema
    #[serde(rename = "structuredContent", default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    /// Set when the tool ran and reported failure
    #[serde(rename = "isError", default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    /// Whether the server flagged this result as a tool-level failure.
    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }

    /// All text blocks joined with newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_tool_defaults_missing_schema() {
        let tool: Tool = serde_json::from_value(json!({"name": "echo"})).unwrap();
        assert_eq!(tool.input_schema, json!({"type": "object"}));
        assert!(tool.is_destructive());
    }

    #[test]
    fn test_read_only_tool_is_not_destructive() {
        let tool: Tool = serde_json::from_value(json!({
            "name": "stat",
            "inputSchema": {"type": "object"},
            "annotations": {"readOnlyHint": true}
        }))
        .unwrap();
        assert!(!tool.is_destructive());
    }

    #[test]
    fn test_call_result_error_flag_and_text() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "disk full"}, {"type": "text", "text": "retry later"}],
            "isError": true
        }))
        .unwrap();
        assert!(result.is_error());
        assert_eq!(result.text(), "disk full\nretry later");
    }
}
