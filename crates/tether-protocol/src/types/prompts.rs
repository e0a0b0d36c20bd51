//! Prompt templates.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::content::ContentBlock;
use super::{Cursor, Role};

/// A prompt template the server exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Unique prompt name
    pub name: String,
    /// Display title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered argument list
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

impl Prompt {
    /// Names of required arguments missing from `provided`.
    pub fn missing_arguments<'a>(
        &'a self,
        provided: Option<&HashMap<String, String>>,
    ) -> Vec<&'a str> {
        self.arguments
            .iter()
            .filter(|arg| arg.required)
            .filter(|arg| provided.is_none_or(|p| !p.contains_key(&arg.name)))
            .map(|arg| arg.name.as_str())
            .collect()
    }
}

/// One declared prompt argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptArgument {
    /// Argument name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the argument must be supplied
    #[serde(default)]
    pub required: bool,
}

/// Result of `prompts/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPromptsResult {
    /// One page of prompts
    pub prompts: Vec<Prompt>,
    /// Cursor for the next page
    #[serde(rename = "nextCursor", default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// Params of `prompts/get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetPromptRequest {
    /// Prompt name
    pub name: String,
    /// Template arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<HashMap<String, String>>,
}

/// Result of `prompts/get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetPromptResult {
    /// Rendered description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Rendered conversation
    pub messages: Vec<PromptMessage>,
}

/// One rendered prompt message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Speaker
    pub role: Role,
    /// Message content
    pub content: ContentBlock,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_missing_required_arguments() {
        let prompt: Prompt = serde_json::from_value(json!({
            "name": "review",
            "arguments": [
                {"name": "code", "required": true},
                {"name": "style"},
                {"name": "language", "required": true}
            ]
        }))
        .unwrap();

        assert_eq!(prompt.missing_arguments(None), vec!["code", "language"]);

        let provided = HashMap::from([("code".to_string(), "fn main() {}".to_string())]);
        assert_eq!(prompt.missing_arguments(Some(&provided)), vec!["language"]);
    }
}
