//! Drives `discover_all` against a mix of a real mock stdio server and an unreachable binary —
//! proves one bad server doesn't block the round (C3 coverage).

use std::time::Duration;

use cloudllm::discovery::discover_all;
use cloudllm::fingerprint::Protocol;
use cloudllm::transport::stdio::StdioTransport;

#[tokio::test]
async fn mixed_good_and_bad_servers_both_resolve_independently() {
    let good = Box::new(StdioTransport::new(
        "good",
        env!("CARGO_BIN_EXE_mock_stdio_mcp_server"),
        vec![],
        Default::default(),
    ));
    let bad = Box::new(StdioTransport::new(
        "bad",
        "definitely-not-a-real-binary",
        vec![],
        Default::default(),
    ));

    let results = discover_all(vec![good, bad], Duration::from_secs(5)).await;
    assert_eq!(results.len(), 2);

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let failures = results.iter().filter(|r| r.is_err()).count();
    assert_eq!(successes, 1);
    assert_eq!(failures, 1);

    let good_discovery = results.into_iter().find_map(|r| r.ok()).unwrap();
    assert_eq!(good_discovery.server_name, "good");
    assert_eq!(good_discovery.protocol, Protocol::Stdio);
    assert_eq!(good_discovery.tools.len(), 1);
}
