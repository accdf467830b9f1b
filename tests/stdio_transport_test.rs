//! Drives `StdioTransport` against the `mock_stdio_mcp_server` fixture binary — C1 stdio coverage.

use std::collections::BTreeMap;

use cloudllm::transport::stdio::StdioTransport;
use cloudllm::transport::Transport;
use tokio_util::sync::CancellationToken;

fn mock_server_transport(name: &str) -> StdioTransport {
    let path = env!("CARGO_BIN_EXE_mock_stdio_mcp_server");
    StdioTransport::new(name, path, vec![], BTreeMap::new())
}

#[tokio::test]
async fn connect_initializes_the_child_process() {
    let mut transport = mock_server_transport("mock");
    let result = transport.connect(CancellationToken::new()).await;
    assert!(result.is_ok(), "{:?}", result.err());
    transport.close().await;
}

#[tokio::test]
async fn list_tools_returns_the_mock_echo_tool() {
    let mut transport = mock_server_transport("mock");
    transport.connect(CancellationToken::new()).await.unwrap();

    let tools = transport.list_tools(CancellationToken::new()).await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "echo");

    transport.close().await;
}

#[tokio::test]
async fn call_tool_round_trips_arguments_through_content() {
    let mut transport = mock_server_transport("mock");
    transport.connect(CancellationToken::new()).await.unwrap();

    let result = transport
        .call_tool("echo", serde_json::json!({"text": "hi"}), CancellationToken::new())
        .await
        .unwrap();

    assert!(!result.is_error);
    assert_eq!(result.content["text"], "hi");

    transport.close().await;
}
