//! Requests and notifications initiated by the server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{connect, connect_with, full_capabilities, init_result};
use pretty_assertions::assert_eq;
use serde_json::json;
use tether_client::{
    HandlerError, HandlerResult, SamplingHandler, ServerNotification, Session, StaticRoots,
};
use tether_protocol::types::{
    ContentBlock, CreateMessageRequest, CreateMessageResult, LogLevel, Role, Root,
};
use tokio::sync::Notify;

#[derive(Debug)]
struct CannedModel;

#[async_trait]
impl SamplingHandler for CannedModel {
    async fn create_message(
        &self,
        request: CreateMessageRequest,
    ) -> HandlerResult<CreateMessageResult> {
        if request.max_tokens == 0 {
            return Err(HandlerError::UserCancelled);
        }
        let prompt = request
            .messages
            .first()
            .and_then(|m| m.content.as_text())
            .unwrap_or_default()
            .to_string();
        Ok(CreateMessageResult {
            role: Role::Assistant,
            content: ContentBlock::text(format!("echo: {prompt}")),
            model: "canned-1".to_string(),
            stop_reason: Some("endTurn".to_string()),
        })
    }
}

/// Never finishes until released; records that it was dropped.
#[derive(Debug, Default)]
struct StuckModel {
    dropped: Arc<Notify>,
}

struct DropSignal(Arc<Notify>);

impl Drop for DropSignal {
    fn drop(&mut self) {
        self.0.notify_one();
    }
}

#[async_trait]
impl SamplingHandler for StuckModel {
    async fn create_message(
        &self,
        _request: CreateMessageRequest,
    ) -> HandlerResult<CreateMessageResult> {
        let _signal = DropSignal(Arc::clone(&self.dropped));
        std::future::pending::<()>().await;
        Err(HandlerError::generic("unreachable"))
    }
}

fn sampling_params(text: &str, max_tokens: u32) -> serde_json::Value {
    json!({
        "messages": [{"role": "user", "content": {"type": "text", "text": text}}],
        "maxTokens": max_tokens
    })
}

#[tokio::test]
async fn test_sampling_request_reaches_handler() {
    let c = connect_with(
        Session::builder().with_sampling_handler(Arc::new(CannedModel)),
        init_result(full_capabilities()),
    )
    .await;

    c.server
        .request(json!("s-1"), "sampling/createMessage", Some(sampling_params("hi", 64)))
        .await;
    let response = c.server.next().await;
    assert_eq!(response["id"], "s-1");
    assert_eq!(response["result"]["model"], "canned-1");
    assert_eq!(response["result"]["content"]["text"], "echo: hi");
    assert_eq!(response["result"]["role"], "assistant");
}

#[tokio::test]
async fn test_handler_rejection_maps_to_error_code() {
    let c = connect_with(
        Session::builder().with_sampling_handler(Arc::new(CannedModel)),
        init_result(full_capabilities()),
    )
    .await;

    c.server
        .request(json!(7), "sampling/createMessage", Some(sampling_params("hi", 0)))
        .await;
    let response = c.server.next().await;
    assert_eq!(response["id"], 7);
    assert_eq!(response["error"]["code"], -1);
}

#[tokio::test]
async fn test_sampling_without_handler_is_method_not_found() {
    let c = connect().await;
    c.server
        .request(json!(1), "sampling/createMessage", Some(sampling_params("hi", 64)))
        .await;
    let response = c.server.next().await;
    assert_eq!(response["id"], 1);
    assert_eq!(response["error"]["code"], -32601);
}

#[tokio::test]
async fn test_invalid_sampling_params_are_rejected() {
    let c = connect_with(
        Session::builder().with_sampling_handler(Arc::new(CannedModel)),
        init_result(full_capabilities()),
    )
    .await;
    c.server
        .request(json!(2), "sampling/createMessage", Some(json!({"messages": "nope"})))
        .await;
    let response = c.server.next().await;
    assert_eq!(response["error"]["code"], -32602);
}

#[tokio::test]
async fn test_unknown_server_method_is_method_not_found() {
    let c = connect().await;
    c.server.request(json!(3), "elicitation/create", None).await;
    let response = c.server.next().await;
    assert_eq!(response["id"], 3);
    assert_eq!(response["error"]["code"], -32601);
}

#[tokio::test]
async fn test_roots_and_ping() {
    let roots = StaticRoots(vec![Root {
        uri: "file:///workspace".to_string(),
        name: Some("workspace".to_string()),
    }]);
    let c = connect_with(
        Session::builder().with_roots_handler(Arc::new(roots)),
        init_result(full_capabilities()),
    )
    .await;

    c.server.request(json!(10), "roots/list", None).await;
    let response = c.server.next().await;
    assert_eq!(response["result"]["roots"][0]["uri"], "file:///workspace");

    c.server.request(json!(11), "ping", None).await;
    let response = c.server.next().await;
    assert_eq!(response["id"], 11);
    assert_eq!(response["result"], json!({}));
}

#[tokio::test]
async fn test_malformed_server_request_gets_invalid_request() {
    let c = connect().await;
    c.server
        .send(json!({"jsonrpc": "1.0", "id": 9, "method": "ping"}))
        .await;
    let response = c.server.next().await;
    assert_eq!(response["id"], 9);
    assert_eq!(response["error"]["code"], -32600);
}

#[tokio::test]
async fn test_server_cancellation_aborts_handler() {
    let model = StuckModel::default();
    let dropped = Arc::clone(&model.dropped);
    let c = connect_with(
        Session::builder().with_sampling_handler(Arc::new(model)),
        init_result(full_capabilities()),
    )
    .await;

    c.server
        .request(json!("s-9"), "sampling/createMessage", Some(sampling_params("hi", 64)))
        .await;
    // Give the handler a chance to start.
    tokio::time::sleep(Duration::from_millis(20)).await;
    c.server
        .notify(
            "notifications/cancelled",
            Some(json!({"requestId": "s-9", "reason": "user navigated away"})),
        )
        .await;

    tokio::time::timeout(Duration::from_secs(5), dropped.notified())
        .await
        .expect("handler was not aborted");
    // No answer for a cancelled request.
    assert!(c.server.is_silent_for(Duration::from_millis(100)).await);
}

#[tokio::test]
async fn test_notifications_are_broadcast_in_order() {
    let c = connect().await;
    let mut first = c.session.subscribe();
    let mut second = c.session.subscribe();

    c.server
        .notify(
            "notifications/message",
            Some(json!({"level": "error", "data": "disk almost full"})),
        )
        .await;
    c.server
        .notify(
            "notifications/resources/updated",
            Some(json!({"uri": "file:///a"})),
        )
        .await;
    c.server
        .notify("notifications/custom", Some(json!({"k": 1})))
        .await;

    for receiver in [&mut first, &mut second] {
        let mut methods = Vec::new();
        for _ in 0..3 {
            let notification = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
                .await
                .unwrap()
                .unwrap();
            if let ServerNotification::LogMessage(log) = &notification {
                assert_eq!(log.level, LogLevel::Error);
            }
            methods.push(notification.method().to_string());
        }
        assert_eq!(
            methods,
            vec![
                "notifications/message",
                "notifications/resources/updated",
                "notifications/custom"
            ]
        );
    }
}
