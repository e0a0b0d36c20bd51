//! Approval gate for tool calls.
//!
//! A gate runs synchronously after the tool has been resolved and its
//! arguments validated, and before anything is sent. Denials never reach the
//! transport. Resource reads and prompt renders are not gated.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_protocol::types::Tool;

/// Outcome of an approval check.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Let the call through
    #[default]
    Allow,
    /// Refuse without explanation
    Deny,
    /// Refuse with a reason surfaced to the caller
    DenyWithReason(Arc<str>),
}

impl ApprovalDecision {
    /// Refuse with a reason.
    pub fn deny_with_reason(reason: impl AsRef<str>) -> Self {
        Self::DenyWithReason(Arc::from(reason.as_ref()))
    }

    /// Whether the call may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Reason attached to a denial.
    pub fn denial_reason(&self) -> Option<&str> {
        match self {
            Self::DenyWithReason(reason) => Some(reason),
            Self::Deny | Self::Allow => None,
        }
    }
}

/// What the gate sees for one pending tool call.
#[derive(Debug, Clone, Copy)]
pub struct ApprovalRequest<'a> {
    /// Tool being called
    pub tool_name: &'a str,
    /// Arguments as they will be sent
    pub arguments: &'a Value,
    /// Cached descriptor, for annotation-aware policies
    pub tool: &'a Tool,
}

/// Decides whether a tool call may proceed.
///
/// Implemented for closures, so a one-off policy can be passed directly:
///
/// ```rust
/// use tether_client::{ApprovalDecision, ApprovalRequest, Session};
///
/// let session = Session::builder()
///     .with_approval_gate(|request: &ApprovalRequest<'_>| {
///         if request.tool_name.starts_with("delete") {
///             ApprovalDecision::deny_with_reason("deletions need review")
///         } else {
///             ApprovalDecision::Allow
///         }
///     })
///     .build();
/// # drop(session);
/// ```
pub trait ApprovalGate: Send + Sync {
    /// Decide on one call. Must not block.
    fn decide(&self, request: &ApprovalRequest<'_>) -> ApprovalDecision;
}

impl<F> ApprovalGate for F
where
    F: Fn(&ApprovalRequest<'_>) -> ApprovalDecision + Send + Sync,
{
    fn decide(&self, request: &ApprovalRequest<'_>) -> ApprovalDecision {
        self(request)
    }
}

/// Gate that approves every call. Equivalent to configuring none.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ApprovalGate for AllowAll {
    fn decide(&self, _request: &ApprovalRequest<'_>) -> ApprovalDecision {
        ApprovalDecision::Allow
    }
}

/// Name-based policy with an optional annotation rule.
///
/// Evaluation order: explicit deny, explicit allow, destructive hint, default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPolicy {
    /// Tools always refused
    pub deny: HashSet<String>,
    /// Tools always approved
    pub allow: HashSet<String>,
    /// Refuse tools whose annotations say they are destructive
    pub deny_destructive: bool,
    /// Decision for everything else
    pub default: ApprovalDecision,
}

impl ToolPolicy {
    /// Policy that allows everything not listed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse a tool by name.
    #[must_use]
    pub fn deny(mut self, tool: impl Into<String>) -> Self {
        self.deny.insert(tool.into());
        self
    }

    /// Approve a tool by name, overriding the default.
    #[must_use]
    pub fn allow(mut self, tool: impl Into<String>) -> Self {
        self.allow.insert(tool.into());
        self
    }

    /// Refuse tools annotated with `destructiveHint`.
    #[must_use]
    pub fn deny_destructive(mut self, enabled: bool) -> Self {
        self.deny_destructive = enabled;
        self
    }

    /// Decision for tools not listed.
    #[must_use]
    pub fn with_default(mut self, decision: ApprovalDecision) -> Self {
        self.default = decision;
        self
    }
}

impl ApprovalGate for ToolPolicy {
    fn decide(&self, request: &ApprovalRequest<'_>) -> ApprovalDecision {
        if self.deny.contains(request.tool_name) {
            return ApprovalDecision::deny_with_reason(format!(
                "tool '{}' is on the deny list",
                request.tool_name
            ));
        }
        if self.allow.contains(request.tool_name) {
            return ApprovalDecision::Allow;
        }
        if self.deny_destructive && request.tool.is_destructive() {
            return ApprovalDecision::deny_with_reason(format!(
                "tool '{}' is marked destructive",
                request.tool_name
            ));
        }
        self.default.clone()
    }
}
