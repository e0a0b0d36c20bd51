//! Call routing: concurrency, timeouts, cancellation and server errors.

mod common;

use std::time::{Duration, Instant};

use common::{connect, echo_tool, tool};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{Value, json};
use tether_client::{CallOptions, CancellationToken, Error, SessionState, ToolOutcome};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_out_of_order_responses_reach_their_callers(
        order in (1usize..12).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async move {
            let c = connect().await;
            let n = order.len();

            let calls: Vec<_> = (0..n)
                .map(|i| {
                    let session = c.session.clone();
                    tokio::spawn(async move {
                        session
                            .invoke("test/echo", Some(json!({"n": i})), CallOptions::new())
                            .await
                    })
                })
                .collect();

            let mut requests = Vec::with_capacity(n);
            for _ in 0..n {
                requests.push(c.server.next_request().await);
            }
            // Map position in `order` to the i-th received request.
            for &slot in &order {
                let request = &requests[slot];
                c.server
                    .respond(&request["id"], json!({"n": request["params"]["n"]}))
                    .await;
            }

            for (i, call) in calls.into_iter().enumerate() {
                let value = call.await.unwrap().unwrap();
                assert_eq!(value, json!({"n": i}));
            }
        });
    }
}

#[tokio::test]
async fn test_fast_call_is_not_blocked_by_slow_call() {
    let c = connect().await;
    c.discover_tools(json!([echo_tool(), tool("slow")])).await;

    let slow = {
        let session = c.session.clone();
        tokio::spawn(async move {
            session
                .call_tool("slow", json!({}), CallOptions::new())
                .await
        })
    };
    let slow_request = c.server.expect_request("tools/call").await;
    assert_eq!(slow_request["params"]["name"], "slow");

    let started = Instant::now();
    let echo = {
        let session = c.session.clone();
        tokio::spawn(async move {
            session
                .call_tool("echo", json!({"text": "hi"}), CallOptions::new())
                .await
        })
    };
    let echo_request = c.server.expect_request("tools/call").await;
    assert_eq!(echo_request["params"]["arguments"], json!({"text": "hi"}));

    tokio::time::sleep(Duration::from_millis(50)).await;
    c.server
        .respond(
            &echo_request["id"],
            json!({"content": [{"type": "text", "text": "hi"}]}),
        )
        .await;

    let outcome = echo.await.unwrap().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(outcome.is_success());
    assert_eq!(outcome.text(), "hi");
    assert!(!slow.is_finished());

    c.server
        .respond(
            &slow_request["id"],
            json!({"content": [{"type": "text", "text": "done"}]}),
        )
        .await;
    assert_eq!(slow.await.unwrap().unwrap().text(), "done");
}

#[tokio::test]
async fn test_cancelled_call_discards_late_response() {
    let c = connect().await;
    let mut faults = c.session.faults();
    let token = CancellationToken::new();

    let call = {
        let session = c.session.clone();
        let options = CallOptions::new().with_cancel(token.clone());
        tokio::spawn(async move { session.invoke("slow/op", None, options).await })
    };
    let request = c.server.expect_request("slow/op").await;
    token.cancel();

    assert!(matches!(
        call.await.unwrap(),
        Err(Error::Cancelled { ref method }) if method == "slow/op"
    ));

    let cancelled = c.server.next().await;
    assert_eq!(cancelled["method"], "notifications/cancelled");
    assert_eq!(cancelled["params"]["requestId"], request["id"]);

    // Late answer is dropped without disturbing the session.
    c.server.respond(&request["id"], json!({"late": true})).await;

    let ping = {
        let session = c.session.clone();
        tokio::spawn(async move { session.ping().await })
    };
    let ping_request = c.server.expect_request("ping").await;
    c.server.respond(&ping_request["id"], json!({})).await;
    ping.await.unwrap().unwrap();

    assert_eq!(c.session.state(), SessionState::Ready);
    assert!(faults.try_recv().is_err());
}

#[tokio::test]
async fn test_cancelled_token_sends_nothing() {
    let c = connect().await;
    let before = c.bytes_sent();
    let token = CancellationToken::new();
    token.cancel();

    let err = c
        .session
        .invoke("slow/op", None, CallOptions::new().with_cancel(token))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled { .. }));
    assert_eq!(c.bytes_sent(), before);
}

#[tokio::test]
async fn test_timeout_abandons_call_and_tells_server() {
    let c = connect().await;
    let call = {
        let session = c.session.clone();
        let options = CallOptions::new().with_timeout(Duration::from_millis(50));
        tokio::spawn(async move { session.invoke("slow/op", None, options).await })
    };
    let request = c.server.expect_request("slow/op").await;

    match call.await.unwrap() {
        Err(Error::Timeout { method, timeout }) => {
            assert_eq!(method, "slow/op");
            assert_eq!(timeout, Duration::from_millis(50));
        }
        other => panic!("unexpected {other:?}"),
    }

    let cancelled = c.server.next().await;
    assert_eq!(cancelled["method"], "notifications/cancelled");
    assert_eq!(cancelled["params"]["requestId"], request["id"]);
}

#[tokio::test]
async fn test_timeout_without_propagation_stays_quiet() {
    let c = common::connect_with(
        tether_client::Session::builder()
            .with_cancellation_propagation(false)
            .with_request_timeout(Duration::from_millis(30)),
        common::init_result(common::full_capabilities()),
    )
    .await;

    let call = {
        let session = c.session.clone();
        tokio::spawn(async move { session.invoke("slow/op", None, CallOptions::new()).await })
    };
    c.server.expect_request("slow/op").await;
    assert!(matches!(call.await.unwrap(), Err(Error::Timeout { .. })));
    assert!(c.server.is_silent_for(Duration::from_millis(100)).await);
}

#[tokio::test]
async fn test_server_error_maps_to_error_variant() {
    let c = connect().await;
    let call = {
        let session = c.session.clone();
        tokio::spawn(async move { session.invoke("no/such", None, CallOptions::new()).await })
    };
    let request = c.server.expect_request("no/such").await;
    c.server
        .respond_error(&request["id"], -32601, "Method not found")
        .await;

    match call.await.unwrap() {
        Err(Error::Server { code, message, .. }) => {
            assert_eq!(code, -32601);
            assert_eq!(message, "Method not found");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_tool_error_result_is_an_outcome() {
    let c = connect().await;
    c.discover_tools(json!([tool("flaky")])).await;

    let call = {
        let session = c.session.clone();
        tokio::spawn(async move {
            session
                .call_tool("flaky", Value::Null, CallOptions::new())
                .await
        })
    };
    let request = c.server.expect_request("tools/call").await;
    assert!(request["params"].get("arguments").is_none());
    c.server
        .respond(
            &request["id"],
            json!({"content": [{"type": "text", "text": "disk full"}], "isError": true}),
        )
        .await;

    match call.await.unwrap().unwrap() {
        ToolOutcome::Failed(failure) => {
            assert_eq!(failure.tool, "flaky");
            assert_eq!(failure.message, "disk full");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_tool_result_is_protocol_error() {
    let c = connect().await;
    c.discover_tools(json!([tool("odd")])).await;

    let call = {
        let session = c.session.clone();
        tokio::spawn(async move { session.call_tool("odd", json!({}), CallOptions::new()).await })
    };
    let request = c.server.expect_request("tools/call").await;
    c.server
        .respond(&request["id"], json!({"content": "not a list"}))
        .await;
    assert!(matches!(call.await.unwrap(), Err(Error::ProtocolError(_))));
}

#[tokio::test]
async fn test_undecodable_frame_is_a_fault_not_a_failure() {
    let c = connect().await;
    let mut faults = c.session.faults();
    c.server.send_raw(b"{not json").await;

    let fault = tokio::time::timeout(Duration::from_secs(5), faults.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(fault, Error::ProtocolError(_)));
    assert_eq!(c.session.state(), SessionState::Ready);
}
