//! Drives `HttpTransport` against an in-process `axum` router — C1 http coverage.
#![cfg(feature = "mcp-server")]

use std::collections::BTreeMap;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use cloudllm::transport::http::HttpTransport;
use cloudllm::transport::Transport;
use serde_json::{json, Value as JsonValue};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
struct MockState;

async fn initialize(State(_): State<MockState>, Json(_): Json<JsonValue>) -> Json<JsonValue> {
    Json(json!({ "protocolVersion": "2024-11-05" }))
}

async fn tools_list(State(_): State<MockState>, Json(_): Json<JsonValue>) -> Json<JsonValue> {
    Json(json!({
        "tools": [{
            "name": "echo",
            "description": "echoes text",
            "input_schema": {"type": "object", "properties": {"text": {"type": "string"}}},
        }]
    }))
}

async fn tools_call(State(_): State<MockState>, Json(body): Json<JsonValue>) -> Json<JsonValue> {
    let args = body.get("arguments").cloned().unwrap_or(json!({}));
    Json(json!({ "isError": false, "content": args }))
}

async fn spawn_mock_server() -> String {
    let app = Router::new()
        .route("/initialize", post(initialize))
        .route("/tools/list", post(tools_list))
        .route("/tools/call", post(tools_call))
        .with_state(MockState);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn connect_initializes_against_the_mock_server() {
    let base_url = spawn_mock_server().await;
    let mut transport = HttpTransport::new("mock", base_url, BTreeMap::new());
    let result = transport.connect(CancellationToken::new()).await;
    assert!(result.is_ok(), "{:?}", result.err());
}

#[tokio::test]
async fn list_tools_and_call_tool_round_trip() {
    let base_url = spawn_mock_server().await;
    let mut transport = HttpTransport::new("mock", base_url, BTreeMap::new());
    transport.connect(CancellationToken::new()).await.unwrap();

    let tools = transport.list_tools(CancellationToken::new()).await.unwrap();
    assert_eq!(tools[0].name, "echo");

    let result = transport
        .call_tool("echo", json!({"text": "hi"}), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.content["text"], "hi");
}
