//! Capability registry
//!
//! Caches the tools, resources and prompts a server declared. Each kind is a
//! [`CapabilityRegistry`] holding an immutable [`Snapshot`] behind an
//! [`ArcSwap`]: a refresh builds the complete new snapshot off to the side and
//! publishes it with one pointer swap, so readers never observe a half-built
//! listing.
//!
//! The registry never refreshes itself. A `list_changed` notification only
//! marks the kind stale; the host decides when to call
//! [`Session::discover`](crate::Session::discover) again.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tether_protocol::methods;
use tether_protocol::types::{
    Cursor, ListPromptsResult, ListResourcesResult, ListToolsResult, Prompt, Resource, Tool,
};

/// The three capability kinds a server can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    /// Executable tools
    Tools,
    /// Readable resources
    Resources,
    /// Prompt templates
    Prompts,
}

impl CapabilityKind {
    /// All kinds, in discovery order.
    pub const ALL: [Self; 3] = [Self::Tools, Self::Resources, Self::Prompts];

    /// Method that lists this kind.
    pub fn list_method(self) -> &'static str {
        match self {
            Self::Tools => methods::TOOLS_LIST,
            Self::Resources => methods::RESOURCES_LIST,
            Self::Prompts => methods::PROMPTS_LIST,
        }
    }

    /// Kind announced by a `notifications/*/list_changed` method, if any.
    pub fn from_list_changed(method: &str) -> Option<Self> {
        match method {
            methods::TOOLS_LIST_CHANGED => Some(Self::Tools),
            methods::RESOURCES_LIST_CHANGED => Some(Self::Resources),
            methods::PROMPTS_LIST_CHANGED => Some(Self::Prompts),
            _ => None,
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Tools => "tools",
            Self::Resources => "resources",
            Self::Prompts => "prompts",
        })
    }
}

/// A cacheable capability descriptor.
pub trait Descriptor: Clone + Send + Sync + fmt::Debug + 'static {
    /// Kind this descriptor belongs to.
    const KIND: CapabilityKind;

    /// One page of a list response.
    type Page: DeserializeOwned + Send;

    /// Unique key within the kind.
    fn key(&self) -> &str;

    /// Whether a lookup for `name` should return this descriptor.
    fn matches(&self, name: &str) -> bool {
        self.key() == name
    }

    /// Split a page into its items and the cursor of the next page.
    fn split_page(page: Self::Page) -> (Vec<Self>, Option<Cursor>);

    /// Wrap into the kind-erased descriptor.
    fn erase(entry: Arc<Self>) -> CapabilityDescriptor;
}

impl Descriptor for Tool {
    const KIND: CapabilityKind = CapabilityKind::Tools;
    type Page = ListToolsResult;

    fn key(&self) -> &str {
        &self.name
    }

    fn split_page(page: Self::Page) -> (Vec<Self>, Option<Cursor>) {
        (page.tools, page.next_cursor)
    }

    fn erase(entry: Arc<Self>) -> CapabilityDescriptor {
        CapabilityDescriptor::Tool(entry)
    }
}

impl Descriptor for Resource {
    const KIND: CapabilityKind = CapabilityKind::Resources;
    type Page = ListResourcesResult;

    // Resources are unique by uri; names are display labels.
    fn key(&self) -> &str {
        &self.uri
    }

    fn matches(&self, name: &str) -> bool {
        self.uri == name || self.name == name
    }

    fn split_page(page: Self::Page) -> (Vec<Self>, Option<Cursor>) {
        (page.resources, page.next_cursor)
    }

    fn erase(entry: Arc<Self>) -> CapabilityDescriptor {
        CapabilityDescriptor::Resource(entry)
    }
}

impl Descriptor for Prompt {
    const KIND: CapabilityKind = CapabilityKind::Prompts;
    type Page = ListPromptsResult;

    fn key(&self) -> &str {
        &self.name
    }

    fn split_page(page: Self::Page) -> (Vec<Self>, Option<Cursor>) {
        (page.prompts, page.next_cursor)
    }

    fn erase(entry: Arc<Self>) -> CapabilityDescriptor {
        CapabilityDescriptor::Prompt(entry)
    }
}

/// A cached descriptor of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityDescriptor {
    /// A tool
    Tool(Arc<Tool>),
    /// A resource
    Resource(Arc<Resource>),
    /// A prompt
    Prompt(Arc<Prompt>),
}

impl CapabilityDescriptor {
    /// Kind of the descriptor.
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Self::Tool(_) => CapabilityKind::Tools,
            Self::Resource(_) => CapabilityKind::Resources,
            Self::Prompt(_) => CapabilityKind::Prompts,
        }
    }

    /// Registry key: tool or prompt name, resource uri.
    pub fn key(&self) -> &str {
        match self {
            Self::Tool(t) => t.key(),
            Self::Resource(r) => r.key(),
            Self::Prompt(p) => p.key(),
        }
    }

    /// Human-facing description, if declared.
    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Tool(t) => t.description.as_deref(),
            Self::Resource(r) => r.description.as_deref(),
            Self::Prompt(p) => p.description.as_deref(),
        }
    }

    /// The tool, if this is one.
    pub fn as_tool(&self) -> Option<&Arc<Tool>> {
        match self {
            Self::Tool(t) => Some(t),
            _ => None,
        }
    }

    /// The resource, if this is one.
    pub fn as_resource(&self) -> Option<&Arc<Resource>> {
        match self {
            Self::Resource(r) => Some(r),
            _ => None,
        }
    }

    /// The prompt, if this is one.
    pub fn as_prompt(&self) -> Option<&Arc<Prompt>> {
        match self {
            Self::Prompt(p) => Some(p),
            _ => None,
        }
    }
}

/// Immutable listing of one capability kind.
#[derive(Debug)]
pub struct Snapshot<D> {
    entries: HashMap<String, Arc<D>>,
    fetched_at: Option<DateTime<Utc>>,
    generation: u64,
}

impl<D: Descriptor> Snapshot<D> {
    fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            fetched_at: None,
            generation: 0,
        }
    }

    /// Find a descriptor by key, then by [`Descriptor::matches`].
    pub fn get(&self, name: &str) -> Option<Arc<D>> {
        self.entries
            .get(name)
            .or_else(|| self.entries.values().find(|entry| entry.matches(name)))
            .cloned()
    }

    /// Descriptors sorted by key.
    pub fn list(&self) -> Vec<Arc<D>> {
        let mut entries: Vec<_> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.key().cmp(b.key()));
        entries
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot holds no descriptors.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// When the listing was fetched; `None` before the first discovery.
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    /// Number of successful discoveries that produced this snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Cache for one capability kind.
#[derive(Debug)]
pub struct CapabilityRegistry<D> {
    snapshot: ArcSwap<Snapshot<D>>,
    // `list_changed` notifications seen, and how many of them the current
    // snapshot already reflects. Stale while the two differ.
    changes: AtomicU64,
    covered: AtomicU64,
    // Serializes refreshes of this kind so generations stay ordered.
    refresh: tokio::sync::Mutex<()>,
}

impl<D: Descriptor> Default for CapabilityRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Descriptor> CapabilityRegistry<D> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::empty()),
            changes: AtomicU64::new(0),
            covered: AtomicU64::new(0),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    /// Current snapshot. Stays consistent even if a refresh lands meanwhile.
    pub fn snapshot(&self) -> Arc<Snapshot<D>> {
        self.snapshot.load_full()
    }

    /// Look up a descriptor in the current snapshot.
    pub fn get(&self, name: &str) -> Option<Arc<D>> {
        self.snapshot.load().get(name)
    }

    /// Descriptors of the current snapshot, sorted by key.
    pub fn list(&self) -> Vec<Arc<D>> {
        self.snapshot.load().list()
    }

    /// Publish a complete listing, replacing the previous one.
    ///
    /// Duplicate keys keep the last occurrence. Clears the stale flag.
    pub fn replace(&self, items: Vec<D>) -> usize {
        self.replace_as_of(items, self.change_mark())
    }

    /// Current change count, taken before fetching a listing.
    pub fn change_mark(&self) -> u64 {
        self.changes.load(Ordering::Acquire)
    }

    /// Publish a listing fetched after `mark` was taken.
    ///
    /// Changes announced after `mark` keep the registry stale.
    pub fn replace_as_of(&self, items: Vec<D>, mark: u64) -> usize {
        let entries: HashMap<String, Arc<D>> = items
            .into_iter()
            .map(|item| (item.key().to_string(), Arc::new(item)))
            .collect();
        let count = entries.len();
        let generation = self.snapshot.load().generation + 1;

        self.snapshot.store(Arc::new(Snapshot {
            entries,
            fetched_at: Some(Utc::now()),
            generation,
        }));
        self.covered.fetch_max(mark, Ordering::AcqRel);
        count
    }

    /// Mark the listing as outdated without touching it.
    pub fn mark_stale(&self) {
        self.changes.fetch_add(1, Ordering::AcqRel);
    }

    /// Whether the server announced a change since the last refresh.
    pub fn is_stale(&self) -> bool {
        self.covered.load(Ordering::Acquire) < self.changes.load(Ordering::Acquire)
    }

    pub(crate) async fn lock_refresh(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.refresh.lock().await
    }
}

/// The registries of all three kinds.
#[derive(Debug, Default)]
pub struct Registries {
    /// Tools, keyed by name
    pub tools: CapabilityRegistry<Tool>,
    /// Resources, keyed by uri
    pub resources: CapabilityRegistry<Resource>,
    /// Prompts, keyed by name
    pub prompts: CapabilityRegistry<Prompt>,
}

impl Registries {
    /// Kind-erased lookup.
    pub fn lookup(&self, kind: CapabilityKind, name: &str) -> Option<CapabilityDescriptor> {
        match kind {
            CapabilityKind::Tools => self.tools.get(name).map(Tool::erase),
            CapabilityKind::Resources => self.resources.get(name).map(Resource::erase),
            CapabilityKind::Prompts => self.prompts.get(name).map(Prompt::erase),
        }
    }

    /// Kind-erased listing, sorted by key.
    pub fn list(&self, kind: CapabilityKind) -> Vec<CapabilityDescriptor> {
        match kind {
            CapabilityKind::Tools => self.tools.list().into_iter().map(Tool::erase).collect(),
            CapabilityKind::Resources => self
                .resources
                .list()
                .into_iter()
                .map(Resource::erase)
                .collect(),
            CapabilityKind::Prompts => self.prompts.list().into_iter().map(Prompt::erase).collect(),
        }
    }

    /// Mark one kind stale.
    pub fn mark_stale(&self, kind: CapabilityKind) {
        match kind {
            CapabilityKind::Tools => self.tools.mark_stale(),
            CapabilityKind::Resources => self.resources.mark_stale(),
            CapabilityKind::Prompts => self.prompts.mark_stale(),
        }
    }

    /// Stale flag of one kind.
    pub fn is_stale(&self, kind: CapabilityKind) -> bool {
        match kind {
            CapabilityKind::Tools => self.tools.is_stale(),
            CapabilityKind::Resources => self.resources.is_stale(),
            CapabilityKind::Prompts => self.prompts.is_stale(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tool(name: &str, description: &str) -> Tool {
        serde_json::from_value(json!({
            "name": name,
            "description": description,
            "inputSchema": {"type": "object"}
        }))
        .unwrap()
    }

    fn resource(uri: &str, name: &str) -> Resource {
        serde_json::from_value(json!({"uri": uri, "name": name})).unwrap()
    }

    #[test]
    fn test_replace_swaps_whole_snapshot() {
        let registry = CapabilityRegistry::<Tool>::new();
        assert!(registry.snapshot().fetched_at().is_none());

        assert_eq!(registry.replace(vec![tool("a", "v1"), tool("b", "v1")]), 2);
        let before = registry.snapshot();

        registry.replace(vec![tool("c", "v2")]);
        let after = registry.snapshot();

        // A held snapshot is unaffected by later refreshes.
        assert_eq!(before.len(), 2);
        assert!(before.get("a").is_some());
        assert_eq!(after.len(), 1);
        assert!(registry.get("a").is_none());
        assert_eq!(after.generation(), before.generation() + 1);
    }

    #[test]
    fn test_list_is_sorted_by_key() {
        let registry = CapabilityRegistry::<Tool>::new();
        registry.replace(vec![tool("zeta", ""), tool("alpha", ""), tool("mid", "")]);
        let names: Vec<_> = registry.list().iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_duplicate_keys_keep_last() {
        let registry = CapabilityRegistry::<Tool>::new();
        assert_eq!(registry.replace(vec![tool("a", "first"), tool("a", "second")]), 1);
        assert_eq!(registry.get("a").unwrap().description.as_deref(), Some("second"));
    }

    #[test]
    fn test_resources_resolve_by_uri_or_name() {
        let registry = CapabilityRegistry::<Resource>::new();
        registry.replace(vec![resource("file:///readme.md", "readme")]);
        assert!(registry.get("file:///readme.md").is_some());
        assert!(registry.get("readme").is_some());
        assert!(registry.get("other").is_none());
    }

    #[test]
    fn test_stale_flag_cleared_by_replace() {
        let registries = Registries::default();
        registries.mark_stale(CapabilityKind::Prompts);
        assert!(registries.is_stale(CapabilityKind::Prompts));
        assert!(!registries.is_stale(CapabilityKind::Tools));

        registries.prompts.replace(Vec::new());
        assert!(!registries.is_stale(CapabilityKind::Prompts));
    }

    #[test]
    fn test_change_during_fetch_keeps_stale() {
        let registry = CapabilityRegistry::<Tool>::new();
        registry.mark_stale();
        let mark = registry.change_mark();

        // Announced while the listing was in flight.
        registry.mark_stale();
        registry.replace_as_of(vec![tool("a", "")], mark);
        assert!(registry.is_stale());
        assert!(registry.get("a").is_some());

        let mark = registry.change_mark();
        registry.replace_as_of(vec![tool("a", "")], mark);
        assert!(!registry.is_stale());
    }

    #[test]
    fn test_kind_from_list_changed() {
        assert_eq!(
            CapabilityKind::from_list_changed("notifications/tools/list_changed"),
            Some(CapabilityKind::Tools)
        );
        assert_eq!(CapabilityKind::from_list_changed("notifications/message"), None);
        assert_eq!(CapabilityKind::Resources.list_method(), "resources/list");
    }

    #[test]
    fn test_erased_lookup() {
        let registries = Registries::default();
        registries.tools.replace(vec![tool("echo", "Echo input")]);
        let found = registries.lookup(CapabilityKind::Tools, "echo").unwrap();
        assert_eq!(found.kind(), CapabilityKind::Tools);
        assert_eq!(found.key(), "echo");
        assert_eq!(found.description(), Some("Echo input"));
        assert!(found.as_tool().is_some());
        assert!(registries.lookup(CapabilityKind::Prompts, "echo").is_none());
    }
}
