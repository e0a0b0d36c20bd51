//! Scripted MCP server for session tests.
//!
//! [`MockServer`] owns the server end of a [`MemoryTransport`] pair and lets a
//! test read the client's frames and answer them by hand.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tether_client::{Session, SessionBuilder};
use tether_transport::{AtomicMetrics, MemoryTransport, Transport, TransportMessage};

/// How long a test waits for a frame before failing.
pub const FRAME_WAIT: Duration = Duration::from_secs(5);

pub struct MockServer {
    transport: MemoryTransport,
}

impl MockServer {
    pub async fn new(transport: MemoryTransport) -> Self {
        transport.connect().await.unwrap();
        Self { transport }
    }

    /// Next frame from the client, or `None` if it closed the stream.
    pub async fn try_next(&self) -> Option<Value> {
        let message = tokio::time::timeout(FRAME_WAIT, self.transport.receive())
            .await
            .expect("timed out waiting for a client frame")
            .unwrap()?;
        Some(serde_json::from_slice(&message.payload).unwrap())
    }

    /// Next frame from the client.
    pub async fn next(&self) -> Value {
        self.try_next().await.expect("client closed the stream")
    }

    /// Next request, skipping notifications.
    pub async fn next_request(&self) -> Value {
        loop {
            let frame = self.next().await;
            if frame.get("id").is_some() {
                return frame;
            }
        }
    }

    /// Next request, which must have `method`.
    pub async fn expect_request(&self, method: &str) -> Value {
        let frame = self.next_request().await;
        assert_eq!(frame["method"], method, "unexpected frame {frame}");
        frame
    }

    /// Whether a frame arrives within `wait`.
    pub async fn is_silent_for(&self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.transport.receive())
            .await
            .is_err()
    }

    pub async fn send(&self, frame: Value) {
        self.transport
            .send(TransportMessage::new(serde_json::to_vec(&frame).unwrap()))
            .await
            .unwrap();
    }

    pub async fn send_raw(&self, bytes: &'static [u8]) {
        self.transport
            .send(TransportMessage::new(bytes))
            .await
            .unwrap();
    }

    pub async fn respond(&self, id: &Value, result: Value) {
        self.send(json!({"jsonrpc": "2.0", "id": id, "result": result}))
            .await;
    }

    pub async fn respond_error(&self, id: &Value, code: i32, message: &str) {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code, "message": message}
        }))
        .await;
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) {
        let mut frame = json!({"jsonrpc": "2.0", "method": method});
        if let Some(params) = params {
            frame["params"] = params;
        }
        self.send(frame).await;
    }

    pub async fn request(&self, id: Value, method: &str, params: Option<Value>) {
        let mut frame = json!({"jsonrpc": "2.0", "id": id, "method": method});
        if let Some(params) = params {
            frame["params"] = params;
        }
        self.send(frame).await;
    }

    /// Answer `initialize` with `result` and wait for `notifications/initialized`.
    pub async fn handshake(&self, result: Value) -> Value {
        let init = self.expect_request("initialize").await;
        self.respond(&init["id"], result).await;
        let initialized = self.next().await;
        assert_eq!(initialized["method"], "notifications/initialized");
        init
    }

    /// Drop the server end, which ends the client's stream.
    pub async fn hang_up(&self) {
        self.transport.disconnect().await.unwrap();
    }
}

/// `initialize` result declaring `capabilities`, with a single supported version.
pub fn init_result(capabilities: Value) -> Value {
    json!({
        "protocolVersion": "2025-06-18",
        "capabilities": capabilities,
        "serverInfo": {"name": "mock-server", "version": "0.0.1"}
    })
}

/// Capabilities declaring every feature.
pub fn full_capabilities() -> Value {
    json!({
        "tools": {"listChanged": true},
        "resources": {"subscribe": true, "listChanged": true},
        "prompts": {"listChanged": true},
        "logging": {}
    })
}

pub struct Connected {
    pub session: Session,
    pub server: Arc<MockServer>,
    /// Counters of the client's end of the pair.
    pub client_metrics: Arc<AtomicMetrics>,
}

impl Connected {
    pub fn bytes_sent(&self) -> u64 {
        self.client_metrics.snapshot().bytes_sent
    }

    /// Answer the next `tools/list` with `tools` and wait for discovery.
    pub async fn discover_tools(&self, tools: Value) {
        let session = self.session.clone();
        let discovery = tokio::spawn(async move {
            session
                .discover(tether_client::CapabilityKind::Tools)
                .await
        });
        let list = self.server.expect_request("tools/list").await;
        self.server.respond(&list["id"], json!({"tools": tools})).await;
        discovery.await.unwrap().unwrap();
    }
}

/// Build a session from `builder`, connect it to a fresh mock server, and
/// complete the handshake with `init`.
pub async fn connect_with(builder: SessionBuilder, init: Value) -> Connected {
    let (client, server) = MemoryTransport::pair();
    let client_metrics = client.metrics_handle();
    let server = Arc::new(MockServer::new(server).await);
    let session = builder.build();

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect(Box::new(client)).await })
    };
    server.handshake(init).await;
    connecting.await.unwrap().unwrap();

    Connected {
        session,
        server,
        client_metrics,
    }
}

/// Connected session with default settings and every capability declared.
pub async fn connect() -> Connected {
    connect_with(Session::builder(), init_result(full_capabilities())).await
}

/// Tool descriptor with a single required string property `text`.
pub fn echo_tool() -> Value {
    json!({
        "name": "echo",
        "description": "Echo the input",
        "inputSchema": {
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        },
        "annotations": {"readOnlyHint": true}
    })
}

pub fn tool(name: &str) -> Value {
    json!({"name": name, "inputSchema": {"type": "object"}})
}
