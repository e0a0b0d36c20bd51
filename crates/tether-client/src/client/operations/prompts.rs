//! Prompt rendering

use std::collections::HashMap;

use tether_protocol::methods;
use tether_protocol::types::{GetPromptRequest, GetPromptResult};

use crate::client::core::Session;
use crate::client::dispatcher::CallOptions;
use crate::error::{Error, Result};
use crate::registry::CapabilityKind;

impl Session {
    /// Render a cached prompt with the given arguments.
    ///
    /// Every argument the cached descriptor marks as required must be
    /// present; otherwise nothing is sent.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownCapability`] if the prompt is not cached
    /// - [`Error::InvalidArguments`] naming the missing required arguments
    /// - the errors of [`invoke`](Session::invoke)
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>,
    ) -> Result<GetPromptResult> {
        let dispatcher = self.inner.ensure_ready()?;
        let prompt = self
            .inner
            .registries
            .prompts
            .get(name)
            .ok_or_else(|| Error::UnknownCapability {
                kind: CapabilityKind::Prompts,
                name: name.to_string(),
            })?;

        let missing = prompt.missing_arguments(arguments.as_ref());
        if !missing.is_empty() {
            return Err(Error::InvalidArguments {
                name: name.to_string(),
                reason: format!("missing required arguments: {}", missing.join(", ")),
            });
        }

        let params = serde_json::to_value(GetPromptRequest {
            name: name.to_string(),
            arguments,
        })
        .map_err(|e| Error::protocol(format!("cannot encode {} params: {e}", methods::PROMPTS_GET)))?;
        let value = dispatcher
            .request(methods::PROMPTS_GET, Some(params), &CallOptions::new())
            .await?;
        serde_json::from_value(value)
            .map_err(|e| Error::protocol(format!("invalid {} result: {e}", methods::PROMPTS_GET)))
    }
}
