//! Integration tests exercising the JSON-RPC peer end to end over a real
//! duplex pair, complementing the unit tests inside `src/jsonrpc.rs`.

use cli_agent_sdk::jsonrpc::JsonRpcPeer;
use cli_agent_sdk::JsonRpcError;
use serde_json::json;
use std::sync::Arc;

fn peer_pair() -> (Arc<JsonRpcPeer>, Arc<JsonRpcPeer>) {
    let (a_io, b_io) = tokio::io::duplex(8192);
    let (a_read, a_write) = tokio::io::split(a_io);
    let (b_read, b_write) = tokio::io::split(b_io);
    (JsonRpcPeer::connect(a_read, a_write), JsonRpcPeer::connect(b_read, b_write))
}

#[tokio::test]
async fn request_is_answered_across_a_real_duplex_connection() {
    let (client, server) = peer_pair();

    server.on_request(
        "echo",
        Arc::new(|params| Box::pin(async move { Ok(params) })),
    );

    let response = client.request("echo", json!({"hello": "world"})).await.unwrap();
    assert_eq!(response, json!({"hello": "world"}));

    client.shutdown().await;
    server.shutdown().await;
}

#[tokio::test]
async fn notification_reaches_the_other_peer() {
    let (client, server) = peer_pair();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    server.on_notification(
        "log",
        Arc::new(move |params| {
            let _ = tx.send(params);
        }),
    );

    client.notify("log", json!({"line": "hi"})).await.unwrap();
    let received = rx.recv().await.unwrap();
    assert_eq!(received, json!({"line": "hi"}));

    client.shutdown().await;
    server.shutdown().await;
}

#[tokio::test]
async fn unhandled_method_returns_a_json_rpc_error() {
    let (client, server) = peer_pair();

    let err = client.request("nonexistent", json!({})).await.unwrap_err();
    assert!(err.to_string().contains("Method not found"));

    client.shutdown().await;
    server.shutdown().await;
}

#[tokio::test]
async fn handler_returning_an_error_propagates_its_code() {
    let (client, server) = peer_pair();

    server.on_request(
        "fails",
        Arc::new(|_params| {
            Box::pin(async move { Err(JsonRpcError::new(-32000, "custom failure")) })
        }),
    );

    let err = client.request("fails", json!({})).await.unwrap_err();
    assert!(err.to_string().contains("custom failure"));

    client.shutdown().await;
    server.shutdown().await;
}
