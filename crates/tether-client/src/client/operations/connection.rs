//! Raw calls and connection-level operations
//!
//! [`Session::invoke`] and [`Session::notify`] are the escape hatch for
//! methods this crate has no typed wrapper for. They skip the registry and
//! the approval gate.

use serde_json::Value;
use tether_protocol::methods;
use tether_protocol::types::{EmptyResult, LogLevel, SetLevelRequest};
use tracing::debug;

use crate::client::core::Session;
use crate::client::dispatcher::CallOptions;
use crate::error::{Error, Result};

impl Session {
    /// Send a request and wait for its result.
    ///
    /// The call resolves with the first of: the matching response, the
    /// timeout (`options.timeout`, else the configured default), the
    /// cancellation token, or the end of the session. An abandoned call
    /// sends `notifications/cancelled` when propagation is enabled, and a
    /// response arriving after that is dropped.
    ///
    /// # Errors
    ///
    /// - [`Error::NotReady`], [`Error::SessionClosed`] or
    ///   [`Error::ConnectionLost`] depending on the session state
    /// - [`Error::Server`] for a JSON-RPC error response
    /// - [`Error::Timeout`] or [`Error::Cancelled`]
    /// - [`Error::Transport`] if the request could not be sent
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use std::time::Duration;
    /// # use tether_client::{CallOptions, CancellationToken, Session};
    /// # async fn example(session: Session) -> tether_client::Result<()> {
    /// let cancel = CancellationToken::new();
    /// let options = CallOptions::new()
    ///     .with_timeout(Duration::from_secs(5))
    ///     .with_cancel(cancel.clone());
    /// let value = session.invoke("completion/complete", None, options).await?;
    /// println!("{value}");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn invoke(
        &self,
        method: &str,
        params: Option<Value>,
        options: CallOptions,
    ) -> Result<Value> {
        let dispatcher = self.inner.ensure_ready()?;
        dispatcher.request(method, params, &options).await
    }

    /// Send a notification. Nothing waits for an answer.
    ///
    /// # Errors
    ///
    /// The session state errors of [`invoke`](Session::invoke), or
    /// [`Error::Transport`] if the frame could not be sent.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let dispatcher = self.inner.ensure_ready()?;
        dispatcher.notify(method, params).await
    }

    /// Check that the server is responsive.
    pub async fn ping(&self) -> Result<()> {
        let value = self.invoke(methods::PING, None, CallOptions::new()).await?;
        let _: EmptyResult = serde_json::from_value(value)
            .map_err(|e| Error::protocol(format!("invalid ping result: {e}")))?;
        Ok(())
    }

    /// Set the minimum severity of `notifications/message` the server sends.
    ///
    /// # Errors
    ///
    /// [`Error::Unsupported`] unless the server declared `logging`.
    pub async fn set_log_level(&self, level: LogLevel) -> Result<()> {
        self.inner.ensure_ready()?;
        if !self
            .server_capabilities()
            .is_some_and(|c| c.logging.is_some())
        {
            return Err(Error::Unsupported {
                capability: "logging".to_string(),
            });
        }

        let params = serde_json::to_value(SetLevelRequest { level })
            .map_err(|e| Error::protocol(e.to_string()))?;
        self.invoke(methods::LOGGING_SET_LEVEL, Some(params), CallOptions::new())
            .await?;
        debug!(session = %self.inner.id, level = %level, "Server log level set");
        Ok(())
    }
}
