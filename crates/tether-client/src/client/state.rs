//! Session lifecycle state.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

/// Lifecycle state of a [`Session`](crate::Session).
///
/// ```text
/// Unconnected ──connect──▶ Handshaking ──▶ Ready ──close──▶ Closing ──▶ Closed
///                               │            │
///                               └──failure───┴──────▶ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created, no transport attached
    Unconnected,
    /// `initialize` sent, waiting for the server
    Handshaking,
    /// Handshake complete; operations allowed
    Ready,
    /// `close` in progress
    Closing,
    /// Closed by the host
    Closed,
    /// Handshake or transport failure; terminal
    Failed,
}

impl SessionState {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unconnected => "unconnected",
            Self::Handshaking => "handshaking",
            Self::Ready => "ready",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Watch-backed state cell with checked transitions.
#[derive(Debug)]
pub(crate) struct StateCell {
    tx: watch::Sender<SessionState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::Unconnected);
        Self { tx }
    }

    pub(crate) fn get(&self) -> SessionState {
        *self.tx.borrow()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Move to `to` if the current state is one of `from`.
    ///
    /// Returns the previous state, or the current one on refusal.
    pub(crate) fn transition(
        &self,
        from: &[SessionState],
        to: SessionState,
    ) -> Result<SessionState, SessionState> {
        let mut outcome = Err(SessionState::Unconnected);
        self.tx.send_if_modified(|state| {
            if from.contains(state) {
                outcome = Ok(*state);
                if *state != to {
                    debug!("Session state: {} -> {}", state, to);
                    *state = to;
                    return true;
                }
            } else {
                outcome = Err(*state);
            }
            false
        });
        outcome
    }
}
