//! Capability discovery and cache reads
//!
//! Discovery walks every page of a `*/list` method and publishes the result
//! as one snapshot. Cache reads never touch the network and never refresh.

use std::collections::HashSet;
use std::sync::Arc;

use tether_protocol::types::{PaginatedRequest, Prompt, Resource, ServerCapabilities, Tool};
use tracing::{debug, warn};

use crate::client::core::Session;
use crate::client::dispatcher::{CallOptions, Dispatcher};
use crate::error::{Error, Result};
use crate::registry::{
    CapabilityDescriptor, CapabilityKind, CapabilityRegistry, Descriptor, Registries,
};

impl Session {
    /// Fetch the complete listing of `kind` and replace the cached snapshot.
    ///
    /// Follows `nextCursor` until the server stops returning one. Readers
    /// see either the old listing or the new one, never a mix. Clears the
    /// stale flag. Returns the number of cached descriptors.
    ///
    /// # Errors
    ///
    /// - [`Error::NotReady`], [`Error::SessionClosed`] or
    ///   [`Error::ConnectionLost`] if the session is not `Ready`
    /// - [`Error::DiscoveryFailed`] if listing failed after all retries; the
    ///   previous snapshot is kept
    pub async fn discover(&self, kind: CapabilityKind) -> Result<usize> {
        let registries = &self.inner.registries;
        match kind {
            CapabilityKind::Tools => self.discover_into(&registries.tools).await,
            CapabilityKind::Resources => self.discover_into(&registries.resources).await,
            CapabilityKind::Prompts => self.discover_into(&registries.prompts).await,
        }
    }

    /// Discover every kind the server declared, concurrently.
    ///
    /// Returns the total number of cached descriptors.
    ///
    /// # Errors
    ///
    /// The first failure among the kinds; the others still complete.
    pub async fn discover_all(&self) -> Result<usize> {
        self.inner.ensure_ready()?;
        let declared: Vec<CapabilityKind> = self
            .server_capabilities()
            .map(declared_kinds)
            .unwrap_or_default();

        let results =
            futures::future::join_all(declared.iter().map(|kind| self.discover(*kind))).await;

        let mut total = 0;
        for result in results {
            total += result?;
        }
        Ok(total)
    }

    async fn discover_into<D: Descriptor>(&self, registry: &CapabilityRegistry<D>) -> Result<usize> {
        let dispatcher = self.inner.ensure_ready()?;
        let _refresh = registry.lock_refresh().await;

        let config = &self.inner.config;
        let attempts = config.discovery_retries.saturating_add(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mark = registry.change_mark();
            match fetch_all::<D>(&dispatcher).await {
                Ok(items) => {
                    let count = registry.replace_as_of(items, mark);
                    debug!(kind = %D::KIND, count, "Discovered capabilities");
                    return Ok(count);
                }
                Err(e) if attempt < attempts && !ends_session(&e) => {
                    warn!(kind = %D::KIND, attempt, error = %e, "Discovery failed, retrying");
                    tokio::time::sleep(config.retry_delay()).await;
                }
                Err(e) => {
                    warn!(kind = %D::KIND, error = %e, "Discovery failed");
                    return Err(Error::DiscoveryFailed {
                        kind: D::KIND,
                        source: Box::new(e),
                    });
                }
            }
        }
    }

    /// Cached descriptor by name (resources: by uri, then by name).
    ///
    /// # Errors
    ///
    /// [`Error::UnknownCapability`] if the snapshot has no such entry.
    pub fn lookup(&self, kind: CapabilityKind, name: &str) -> Result<CapabilityDescriptor> {
        self.inner
            .registries
            .lookup(kind, name)
            .ok_or_else(|| Error::UnknownCapability {
                kind,
                name: name.to_string(),
            })
    }

    /// Cached descriptors of `kind`, sorted by key.
    pub fn list_cached(&self, kind: CapabilityKind) -> Vec<CapabilityDescriptor> {
        self.inner.registries.list(kind)
    }

    /// Whether the server announced a change to `kind` since the last
    /// successful discovery.
    pub fn is_stale(&self, kind: CapabilityKind) -> bool {
        self.inner.registries.is_stale(kind)
    }

    /// Cached tools.
    pub fn tools(&self) -> Vec<Arc<Tool>> {
        self.inner.registries.tools.list()
    }

    /// Cached resources.
    pub fn resources(&self) -> Vec<Arc<Resource>> {
        self.inner.registries.resources.list()
    }

    /// Cached prompts.
    pub fn prompts(&self) -> Vec<Arc<Prompt>> {
        self.inner.registries.prompts.list()
    }

    /// All three registries, for snapshot-level access.
    pub fn registries(&self) -> &Registries {
        &self.inner.registries
    }
}

fn declared_kinds(capabilities: &ServerCapabilities) -> Vec<CapabilityKind> {
    let mut kinds = Vec::with_capacity(3);
    if capabilities.tools.is_some() {
        kinds.push(CapabilityKind::Tools);
    }
    if capabilities.resources.is_some() {
        kinds.push(CapabilityKind::Resources);
    }
    if capabilities.prompts.is_some() {
        kinds.push(CapabilityKind::Prompts);
    }
    kinds
}

fn ends_session(error: &Error) -> bool {
    matches!(error, Error::SessionClosed | Error::ConnectionLost { .. })
}

async fn fetch_all<D: Descriptor>(dispatcher: &Dispatcher) -> Result<Vec<D>> {
    let method = D::KIND.list_method();
    let mut items = Vec::new();
    let mut cursor = None;
    let mut seen = HashSet::new();

    loop {
        let params = match cursor.take() {
            Some(cursor) => Some(
                serde_json::to_value(PaginatedRequest {
                    cursor: Some(cursor),
                })
                .map_err(|e| Error::protocol(e.to_string()))?,
            ),
            None => None,
        };
        let value = dispatcher.request(method, params, &CallOptions::new()).await?;
        let page: D::Page = serde_json::from_value(value)
            .map_err(|e| Error::protocol(format!("invalid {method} result: {e}")))?;

        let (mut batch, next) = D::split_page(page);
        items.append(&mut batch);

        match next {
            Some(next) if !next.is_empty() => {
                if !seen.insert(next.clone()) {
                    return Err(Error::protocol(format!(
                        "{method} repeated pagination cursor {next:?}"
                    )));
                }
                debug!(method, cursor = %next, "Fetching next page");
                cursor = Some(next);
            }
            _ => return Ok(items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tether_protocol::types::{PromptsCapability, ToolsCapability};

    #[test]
    fn test_declared_kinds() {
        let capabilities = ServerCapabilities {
            tools: Some(ToolsCapability::default()),
            prompts: Some(PromptsCapability::default()),
            ..Default::default()
        };
        assert_eq!(
            declared_kinds(&capabilities),
            vec![CapabilityKind::Tools, CapabilityKind::Prompts]
        );
        assert!(declared_kinds(&ServerCapabilities::default()).is_empty());
    }

    #[tokio::test]
    async fn test_cache_reads_work_before_connect() {
        let session = Session::builder().build();
        assert!(session.list_cached(CapabilityKind::Tools).is_empty());
        assert!(matches!(
            session.lookup(CapabilityKind::Tools, "echo"),
            Err(Error::UnknownCapability { .. })
        ));
        assert!(matches!(
            session.discover(CapabilityKind::Tools).await,
            Err(Error::NotReady { .. })
        ));
    }
}
