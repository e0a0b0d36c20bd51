//! Resource reads and subscriptions

use serde::de::DeserializeOwned;
use tether_protocol::methods;
use tether_protocol::types::{EmptyResult, ReadResourceResult, ResourceUriParams};
use tracing::debug;

use crate::client::core::Session;
use crate::client::dispatcher::CallOptions;
use crate::error::{Error, Result};

impl Session {
    /// Read a resource by uri.
    ///
    /// Resource reads are not gated and need not be cached first.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArguments`] for an empty uri, otherwise the errors of
    /// [`invoke`](Session::invoke).
    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        self.resource_request(methods::RESOURCES_READ, uri).await
    }

    /// Ask the server to send `notifications/resources/updated` for `uri`.
    ///
    /// # Errors
    ///
    /// [`Error::Unsupported`] unless the server declared `resources.subscribe`.
    pub async fn subscribe_resource(&self, uri: &str) -> Result<()> {
        self.require_subscriptions()?;
        let _: EmptyResult = self
            .resource_request(methods::RESOURCES_SUBSCRIBE, uri)
            .await?;
        debug!(uri, "Subscribed to resource");
        Ok(())
    }

    /// Stop updates for `uri`.
    ///
    /// # Errors
    ///
    /// [`Error::Unsupported`] unless the server declared `resources.subscribe`.
    pub async fn unsubscribe_resource(&self, uri: &str) -> Result<()> {
        self.require_subscriptions()?;
        let _: EmptyResult = self
            .resource_request(methods::RESOURCES_UNSUBSCRIBE, uri)
            .await?;
        debug!(uri, "Unsubscribed from resource");
        Ok(())
    }

    fn require_subscriptions(&self) -> Result<()> {
        self.inner.ensure_ready()?;
        let supported = self
            .server_capabilities()
            .is_some_and(|c| c.supports_resource_subscriptions());
        if supported {
            Ok(())
        } else {
            Err(Error::Unsupported {
                capability: "resources.subscribe".to_string(),
            })
        }
    }

    async fn resource_request<R: DeserializeOwned>(&self, method: &str, uri: &str) -> Result<R> {
        let dispatcher = self.inner.ensure_ready()?;
        if uri.is_empty() {
            return Err(Error::InvalidArguments {
                name: method.to_string(),
                reason: "uri must not be empty".to_string(),
            });
        }

        let params = serde_json::to_value(ResourceUriParams {
            uri: uri.to_string(),
        })
        .map_err(|e| Error::protocol(format!("cannot encode {method} params: {e}")))?;
        let value = dispatcher
            .request(method, Some(params), &CallOptions::new())
            .await?;
        serde_json::from_value(value)
            .map_err(|e| Error::protocol(format!("invalid {method} result: {e}")))
    }
}
