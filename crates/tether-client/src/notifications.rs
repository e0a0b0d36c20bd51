//! Notifications pushed by the server.

use serde_json::Value;
use tether_protocol::JsonRpcNotification;
use tether_protocol::methods;
use tether_protocol::types::{
    CancelledNotification, LoggingMessageNotification, ProgressNotification,
    ResourceUpdatedNotification,
};
use tracing::warn;

use crate::registry::CapabilityKind;

/// A server notification, decoded.
///
/// Delivered to every [`Session::subscribe`](crate::Session::subscribe)
/// receiver in arrival order. Known methods with malformed params are
/// delivered as [`ServerNotification::Other`].
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ServerNotification {
    /// The listing of a capability kind changed; the kind is now stale
    ListChanged(CapabilityKind),
    /// A server log record
    LogMessage(LoggingMessageNotification),
    /// Progress on a long-running request
    Progress(ProgressNotification),
    /// A subscribed resource changed
    ResourceUpdated(ResourceUpdatedNotification),
    /// The server abandoned a request it had sent
    Cancelled(CancelledNotification),
    /// Anything else
    Other {
        /// Notification method
        method: String,
        /// Raw params
        params: Option<Value>,
    },
}

impl ServerNotification {
    /// Method name this notification arrived with.
    pub fn method(&self) -> &str {
        match self {
            Self::ListChanged(CapabilityKind::Tools) => methods::TOOLS_LIST_CHANGED,
            Self::ListChanged(CapabilityKind::Resources) => methods::RESOURCES_LIST_CHANGED,
            Self::ListChanged(CapabilityKind::Prompts) => methods::PROMPTS_LIST_CHANGED,
            Self::LogMessage(_) => methods::MESSAGE,
            Self::Progress(_) => methods::PROGRESS,
            Self::ResourceUpdated(_) => methods::RESOURCE_UPDATED,
            Self::Cancelled(_) => methods::CANCELLED,
            Self::Other { method, .. } => method,
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    notification: &JsonRpcNotification,
    wrap: fn(T) -> ServerNotification,
) -> Option<ServerNotification> {
    let params = notification.params.clone().unwrap_or(Value::Null);
    match serde_json::from_value(params) {
        Ok(payload) => Some(wrap(payload)),
        Err(e) => {
            warn!(method = %notification.method, error = %e, "Malformed notification params");
            None
        }
    }
}

impl From<JsonRpcNotification> for ServerNotification {
    fn from(notification: JsonRpcNotification) -> Self {
        if let Some(kind) = CapabilityKind::from_list_changed(&notification.method) {
            return Self::ListChanged(kind);
        }

        let decoded = match notification.method.as_str() {
            methods::MESSAGE => decode(&notification, Self::LogMessage),
            methods::PROGRESS => decode(&notification, Self::Progress),
            methods::RESOURCE_UPDATED => decode(&notification, Self::ResourceUpdated),
            methods::CANCELLED => decode(&notification, Self::Cancelled),
            _ => None,
        };

        decoded.unwrap_or(Self::Other {
            method: notification.method,
            params: notification.params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tether_protocol::RequestId;
    use tether_protocol::types::LogLevel;

    fn note(method: &str, params: Option<Value>) -> ServerNotification {
        JsonRpcNotification::new(method, params).into()
    }

    #[test]
    fn test_known_notifications_decode() {
        assert_eq!(
            note("notifications/resources/list_changed", None),
            ServerNotification::ListChanged(CapabilityKind::Resources)
        );

        match note(
            "notifications/message",
            Some(json!({"level": "warning", "logger": "db", "data": "slow query"})),
        ) {
            ServerNotification::LogMessage(log) => {
                assert_eq!(log.level, LogLevel::Warning);
                assert_eq!(log.logger.as_deref(), Some("db"));
            }
            other => panic!("unexpected {other:?}"),
        }

        match note(
            "notifications/cancelled",
            Some(json!({"requestId": "s-1", "reason": "gone"})),
        ) {
            ServerNotification::Cancelled(c) => {
                assert_eq!(c.request_id, RequestId::from("s-1"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_or_malformed_become_other() {
        let custom = note("notifications/custom", Some(json!({"x": 1})));
        assert_eq!(custom.method(), "notifications/custom");
        assert!(matches!(custom, ServerNotification::Other { .. }));

        let broken = note("notifications/progress", Some(json!({"progress": "lots"})));
        assert!(matches!(broken, ServerNotification::Other { ref method, .. } if method == "notifications/progress"));
    }
}
