//! Filesystem roots exposed by the client (`roots/list`).

use serde::{Deserialize, Serialize};

/// A filesystem boundary the server may operate within.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    /// Root URI (`file://` scheme)
    pub uri: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Result of `roots/list`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRootsResult {
    /// Exposed roots
    pub roots: Vec<Root>,
}
