//! Session lifecycle: handshake, version negotiation, close and connection loss.

mod common;

use std::time::Duration;

use async_trait::async_trait;
use common::{MockServer, connect, connect_with, full_capabilities, init_result};
use pretty_assertions::assert_eq;
use serde_json::json;
use tether_client::{CallOptions, CapabilityKind, Error, Session, SessionState};
use tether_protocol::{ProtocolVersion, VersionRange};
use tether_transport::{
    MemoryTransport, Transport, TransportMessage, TransportMetrics, TransportResult,
    TransportState, TransportType,
};

#[tokio::test]
async fn test_operations_before_connect_are_not_ready() {
    let session = Session::builder().build();
    assert_eq!(session.state(), SessionState::Unconnected);

    let err = session
        .invoke("ping", None, CallOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::NotReady {
            state: SessionState::Unconnected
        }
    ));
    assert!(matches!(
        session.call_tool("echo", json!({}), CallOptions::new()).await,
        Err(Error::NotReady { .. })
    ));
    assert!(matches!(
        session.read_resource("file:///a").await,
        Err(Error::NotReady { .. })
    ));
}

#[tokio::test]
async fn test_handshake_reaches_ready_and_records_server() {
    let c = connect().await;
    assert_eq!(c.session.state(), SessionState::Ready);
    assert_eq!(c.session.server_info().unwrap().name, "mock-server");
    assert_eq!(
        c.session.negotiated_version().unwrap().as_str(),
        "2025-06-18"
    );
    assert!(
        c.session
            .server_capabilities()
            .unwrap()
            .supports_resource_subscriptions()
    );
}

#[tokio::test]
async fn test_initialize_announces_client_range_and_handlers() {
    let (client, server) = MemoryTransport::pair();
    let server = MockServer::new(server).await;
    let session = Session::builder()
        .with_client_info("host-app", "2.0.0")
        .with_versions(VersionRange::parse("1", "3").unwrap())
        .with_roots_handler(std::sync::Arc::new(tether_client::StaticRoots::default()))
        .build();

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect(Box::new(client)).await })
    };
    let init = server
        .handshake(json!({
            "protocolVersion": "3",
            "capabilities": {},
            "serverInfo": {"name": "s", "version": "1"}
        }))
        .await;
    connecting.await.unwrap().unwrap();

    let params = &init["params"];
    assert_eq!(params["protocolVersion"], "3");
    assert_eq!(params["supportedVersions"], json!({"min": "1", "max": "3"}));
    assert_eq!(params["clientInfo"]["name"], "host-app");
    assert!(params["capabilities"]["roots"].is_object());
    assert!(params["capabilities"].get("sampling").is_none());
}

#[tokio::test]
async fn test_overlapping_ranges_negotiate_highest_common() {
    let c = connect_with(
        Session::builder().with_versions(VersionRange::parse("1", "3").unwrap()),
        json!({
            "protocolVersion": "5",
            "supportedVersions": {"min": "2", "max": "5"},
            "capabilities": {},
            "serverInfo": {"name": "s", "version": "1"}
        }),
    )
    .await;
    assert_eq!(
        c.session.negotiated_version(),
        Some(&ProtocolVersion::parse("3").unwrap())
    );
}

#[tokio::test]
async fn test_disjoint_ranges_fail_with_version_mismatch() {
    let (client, server) = MemoryTransport::pair();
    let server = MockServer::new(server).await;
    let session = Session::builder()
        .with_versions(VersionRange::parse("1", "2").unwrap())
        .build();

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect(Box::new(client)).await })
    };
    let init = server.expect_request("initialize").await;
    server
        .respond(
            &init["id"],
            json!({
                "protocolVersion": "4",
                "supportedVersions": {"min": "3", "max": "4"},
                "capabilities": {},
                "serverInfo": {"name": "s", "version": "1"}
            }),
        )
        .await;

    match connecting.await.unwrap() {
        Err(Error::VersionMismatch { client, server }) => {
            assert_eq!(client, VersionRange::parse("1", "2").unwrap());
            assert_eq!(server, VersionRange::parse("3", "4").unwrap());
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Failed);
    assert!(matches!(
        session.invoke("ping", None, CallOptions::new()).await,
        Err(Error::ConnectionLost { .. })
    ));
    // The transport was released.
    assert!(server.try_next().await.is_none());
}

#[tokio::test]
async fn test_handshake_timeout_fails_session() {
    let (client, server) = MemoryTransport::pair();
    let server = MockServer::new(server).await;
    let session = Session::builder()
        .with_handshake_timeout(Duration::from_millis(50))
        .build();

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect(Box::new(client)).await })
    };
    server.expect_request("initialize").await;

    let err = connecting.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Timeout { ref method, .. } if method == "initialize"));
    assert_eq!(session.state(), SessionState::Failed);
}

/// Memory transport whose `connect` takes `delay`.
#[derive(Debug)]
struct SlowConnect {
    inner: MemoryTransport,
    delay: Duration,
}

#[async_trait]
impl Transport for SlowConnect {
    fn transport_type(&self) -> TransportType {
        self.inner.transport_type()
    }

    async fn state(&self) -> TransportState {
        self.inner.state().await
    }

    async fn connect(&self) -> TransportResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.connect().await
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.inner.disconnect().await
    }

    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        self.inner.send(message).await
    }

    async fn receive(&self) -> TransportResult<Option<TransportMessage>> {
        self.inner.receive().await
    }

    async fn metrics(&self) -> TransportMetrics {
        self.inner.metrics().await
    }
}

#[tokio::test]
async fn test_close_while_transport_connects_abandons_handshake() {
    let (client, server) = MemoryTransport::pair();
    let client_metrics = client.metrics_handle();
    let server = MockServer::new(server).await;
    let session = Session::builder().build();

    let connecting = {
        let session = session.clone();
        let transport = SlowConnect {
            inner: client,
            delay: Duration::from_millis(100),
        };
        tokio::spawn(async move { session.connect(Box::new(transport)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    session.close().await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);

    let outcome = tokio::time::timeout(Duration::from_secs(2), connecting)
        .await
        .expect("connect kept running after close")
        .unwrap();
    assert!(matches!(outcome, Err(Error::SessionClosed)));
    assert_eq!(session.state(), SessionState::Closed);

    // No initialize went out and the transport was released.
    assert_eq!(client_metrics.snapshot().bytes_sent, 0);
    assert!(server.try_next().await.is_none());
}

#[tokio::test]
async fn test_close_during_handshake_wait() {
    let (client, server) = MemoryTransport::pair();
    let server = MockServer::new(server).await;
    let session = Session::builder().build();

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect(Box::new(client)).await })
    };
    server.expect_request("initialize").await;
    session.close().await.unwrap();

    assert!(matches!(connecting.await.unwrap(), Err(Error::SessionClosed)));
    assert_eq!(session.state(), SessionState::Closed);
    assert!(server.try_next().await.is_none());
}

#[tokio::test]
async fn test_connect_twice_is_invalid() {
    let c = connect().await;
    let (again, _peer) = MemoryTransport::pair();
    assert!(matches!(
        c.session.connect(Box::new(again)).await,
        Err(Error::InvalidState {
            operation: "connect",
            state: SessionState::Ready
        })
    ));
    assert_eq!(c.session.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_close_fails_pending_and_rejects_later_calls() {
    let c = connect().await;
    let pending = {
        let session = c.session.clone();
        tokio::spawn(async move { session.invoke("slow/op", None, CallOptions::new()).await })
    };
    c.server.expect_request("slow/op").await;

    c.session.close().await.unwrap();
    assert_eq!(c.session.state(), SessionState::Closed);
    assert!(matches!(pending.await.unwrap(), Err(Error::SessionClosed)));

    assert!(matches!(
        c.session.invoke("ping", None, CallOptions::new()).await,
        Err(Error::SessionClosed)
    ));
    assert!(matches!(
        c.session.discover(CapabilityKind::Tools).await,
        Err(Error::SessionClosed)
    ));

    // Idempotent.
    c.session.close().await.unwrap();
    assert_eq!(c.session.state(), SessionState::Closed);
    assert!(c.server.try_next().await.is_none());
}

#[tokio::test]
async fn test_close_before_connect() {
    let session = Session::builder().build();
    session.close().await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);

    let (client, _server) = MemoryTransport::pair();
    assert!(matches!(
        session.connect(Box::new(client)).await,
        Err(Error::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_peer_hang_up_fails_session() {
    let c = connect().await;
    let mut faults = c.session.faults();
    let mut states = c.session.watch_state();

    let pending = {
        let session = c.session.clone();
        tokio::spawn(async move { session.invoke("slow/op", None, CallOptions::new()).await })
    };
    c.server.expect_request("slow/op").await;
    c.server.hang_up().await;

    assert!(matches!(
        pending.await.unwrap(),
        Err(Error::ConnectionLost { .. })
    ));
    let failed = states
        .wait_for(|state| *state == SessionState::Failed)
        .await
        .map(|state| *state);
    assert_eq!(failed.unwrap(), SessionState::Failed);

    let fault = tokio::time::timeout(Duration::from_secs(5), faults.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(fault, Error::ConnectionLost { .. }));

    assert!(matches!(
        c.session.invoke("ping", None, CallOptions::new()).await,
        Err(Error::ConnectionLost { .. })
    ));
    // Closing a failed session does nothing.
    c.session.close().await.unwrap();
    assert_eq!(c.session.state(), SessionState::Failed);
}

#[tokio::test]
async fn test_state_watch_observes_transitions() {
    let c = connect_with(Session::builder(), init_result(full_capabilities())).await;
    let mut states = c.session.watch_state();
    assert_eq!(*states.borrow_and_update(), SessionState::Ready);

    let closing = {
        let session = c.session.clone();
        tokio::spawn(async move { session.close().await })
    };
    states
        .wait_for(|state| *state == SessionState::Closed)
        .await
        .unwrap();
    closing.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_dropping_last_handle_releases_transport() {
    let c = connect().await;
    let server = c.server.clone();
    drop(c);
    assert!(server.try_next().await.is_none());
}
