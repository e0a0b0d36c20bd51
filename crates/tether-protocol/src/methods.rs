//! MCP method names.

/// Handshake request
pub const INITIALIZE: &str = "initialize";
/// Handshake completion notification
pub const INITIALIZED: &str = "notifications/initialized";
/// Liveness check (both directions)
pub const PING: &str = "ping";

/// List tools (paginated)
pub const TOOLS_LIST: &str = "tools/list";
/// Invoke a tool
pub const TOOLS_CALL: &str = "tools/call";
/// List resources (paginated)
pub const RESOURCES_LIST: &str = "resources/list";
/// Read a resource
pub const RESOURCES_READ: &str = "resources/read";
/// Subscribe to resource updates
pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
/// Cancel a resource subscription
pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";
/// List prompts (paginated)
pub const PROMPTS_LIST: &str = "prompts/list";
/// Render a prompt
pub const PROMPTS_GET: &str = "prompts/get";
/// Adjust server log verbosity
pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";

/// Server asks the client for an LLM completion
pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";
/// Server asks the client for its filesystem roots
pub const ROOTS_LIST: &str = "roots/list";

/// Request cancellation (both directions)
pub const CANCELLED: &str = "notifications/cancelled";
/// Progress update for a long-running request
pub const PROGRESS: &str = "notifications/progress";
/// Server log record
pub const MESSAGE: &str = "notifications/message";
/// Subscribed resource changed
pub const RESOURCE_UPDATED: &str = "notifications/resources/updated";
/// Tool list changed
pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
/// Resource list changed
pub const RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
/// Prompt list changed
pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
/// Client roots changed
pub const ROOTS_LIST_CHANGED: &str = "notifications/roots/list_changed";
