//! Drives `get_cached_or_fresh` end-to-end against the mock stdio server with a tempfile-backed
//! cache, proving the live miss -> fresh-discovery -> cache-write path (C5 coverage — the
//! in-module facade tests only ever seed the cache manually).

use std::time::Duration;

use cloudllm::cache::CacheManager;
use cloudllm::event::EventBus;
use cloudllm::facade::{get_cached_or_fresh, FacadeOptions};
use cloudllm::fingerprint::{Fingerprint, Protocol, ServerConfig};

fn mock_server_config(name: &str) -> ServerConfig {
    let mut config = ServerConfig::new(name, Protocol::Stdio);
    config.command = Some(env!("CARGO_BIN_EXE_mock_stdio_mcp_server").to_string());
    config
}

#[tokio::test]
async fn a_cold_cache_falls_through_to_live_discovery_and_writes_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CacheManager::new(dir.path().to_path_buf(), Duration::from_secs(3600));
    let bus = EventBus::new();
    let config = mock_server_config("mock");

    let results = get_cached_or_fresh(&cache, &bus, &[config.clone()], FacadeOptions::default(), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    let entry = &results["mock"];
    assert_eq!(entry.tools.len(), 1);
    assert_eq!(entry.tools[0].name, "echo");

    let key = Fingerprint::of(&config).unified_key(&config.name);
    assert!(cache.get(&key).await.is_some());
}

#[tokio::test]
async fn a_warm_cache_serves_without_touching_discovery() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CacheManager::new(dir.path().to_path_buf(), Duration::from_secs(3600));
    let bus = EventBus::new();
    let config = mock_server_config("mock");

    get_cached_or_fresh(&cache, &bus, &[config.clone()], FacadeOptions::default(), Duration::from_secs(5))
        .await
        .unwrap();

    let started = std::time::Instant::now();
    let results = get_cached_or_fresh(&cache, &bus, &[config], FacadeOptions::default(), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(started.elapsed() < Duration::from_millis(200));
}
