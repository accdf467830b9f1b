//! Drives `StdioConnectionPool` against the mock stdio server fixture — C2 coverage.

use std::collections::BTreeMap;
use std::time::Duration;

use cloudllm::pool::StdioConnectionPool;
use tokio_util::sync::CancellationToken;

fn mock_server_path() -> String {
    env!("CARGO_BIN_EXE_mock_stdio_mcp_server").to_string()
}

#[tokio::test]
async fn second_get_connection_reuses_the_first() {
    let pool = StdioConnectionPool::new(4, Duration::from_secs(3600), Duration::from_secs(1800));
    let command = mock_server_path();

    let first = pool
        .get_connection("mock", &command, &[], BTreeMap::new(), CancellationToken::new())
        .await
        .unwrap();
    let second = pool
        .get_connection("mock", &command, &[], BTreeMap::new(), CancellationToken::new())
        .await
        .unwrap();

    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(pool.len(), 1);
}

#[tokio::test]
async fn force_remove_broken_makes_the_next_get_connection_reconnect() {
    let pool = StdioConnectionPool::new(4, Duration::from_secs(3600), Duration::from_secs(1800));
    let command = mock_server_path();

    let first = pool
        .get_connection("mock", &command, &[], BTreeMap::new(), CancellationToken::new())
        .await
        .unwrap();

    pool.force_remove_broken(&command, &[]);
    assert!(pool.is_empty());

    let second = pool
        .get_connection("mock", &command, &[], BTreeMap::new(), CancellationToken::new())
        .await
        .unwrap();

    assert!(!std::sync::Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn pooled_connection_serves_list_tools() {
    let pool = StdioConnectionPool::new(4, Duration::from_secs(3600), Duration::from_secs(1800));
    let command = mock_server_path();

    let connection = pool
        .get_connection("mock", &command, &[], BTreeMap::new(), CancellationToken::new())
        .await
        .unwrap();

    let tools = connection.list_tools(CancellationToken::new()).await.unwrap();
    assert_eq!(tools.len(), 1);
}
