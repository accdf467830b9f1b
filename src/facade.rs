//! Connection Façade — C5.
//!
//! `get_cached_or_fresh` is the single entry point orchestration code calls to get tool listings
//! for a set of servers; it aggregates the cache (C4) and parallel discovery (C3) behind the
//! decision table in §4.5 and emits exactly one `ComprehensiveCacheEvent` per call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::cache::{CacheEntry, CacheManager};
use crate::discovery;
use crate::errors::{CacheError, RuntimeError};
use crate::event::{ComprehensiveCacheEvent, EventBus, EventKind, RuntimeEvent};
use crate::fingerprint::{Fingerprint, ServerConfig};
use crate::transport;

#[derive(Debug, Clone, Copy, Default)]
pub struct FacadeOptions {
    /// Serve only from cache, never opening a fresh connection. §4.5's "cache-only flag".
    pub cache_only: bool,
}

enum Status {
    Hit,
    Miss,
}

/// Looks up tools/prompts/resources for every server in `servers`, following §4.5's decision
/// table, and returns one `CacheEntry` per server that could be served (from cache or fresh).
pub async fn get_cached_or_fresh(
    cache: &CacheManager,
    bus: &EventBus,
    servers: &[ServerConfig],
    options: FacadeOptions,
    discovery_timeout: Duration,
) -> Result<HashMap<String, CacheEntry>, RuntimeError> {
    let started = Instant::now();
    let mut per_server_status = HashMap::new();
    let mut results: HashMap<String, CacheEntry> = HashMap::new();
    let mut errors = Vec::new();
    let mut cache_hits = 0u32;
    let mut cache_misses = 0u32;
    let mut cache_writes = 0u32;

    let mut missing: Vec<&ServerConfig> = Vec::new();

    for server in servers {
        let key = Fingerprint::of(server).unified_key(&server.name);
        match cache.get(&key).await {
            Some(entry) => {
                per_server_status.insert(server.name.clone(), Status::Hit);
                cache_hits += 1;
                results.insert(server.name.clone(), entry);
            }
            None => {
                per_server_status.insert(server.name.clone(), Status::Miss);
                cache_misses += 1;
                missing.push(server);
            }
        }
    }

    let cache_elapsed = started.elapsed();
    log::debug!("facade cache lookup: {} hits, {} misses ({:?})", cache_hits, cache_misses, cache_elapsed);

    if missing.is_empty() {
        emit_cache_event(
            bus,
            &per_server_status,
            cache_hits,
            cache_misses,
            cache_writes,
            &errors,
            &results,
            0,
            cache_elapsed,
        )
        .await;
        return Ok(results);
    }

    if options.cache_only {
        if results.is_empty() {
            log::warn!("cache-only request with no hits among {} servers", servers.len());
            emit_cache_event(
                bus,
                &per_server_status,
                cache_hits,
                cache_misses,
                cache_writes,
                &errors,
                &results,
                0,
                cache_elapsed,
            )
            .await;
            return Err(RuntimeError::Cache(CacheError::CacheOnlyEmpty));
        }

        emit_cache_event(
            bus,
            &per_server_status,
            cache_hits,
            cache_misses,
            cache_writes,
            &errors,
            &results,
            0,
            cache_elapsed,
        )
        .await;
        return Ok(results);
    }

    // "Some misses" without cache-only: fall back to fresh discovery for ALL servers, not just
    // the misses, so a stale hit doesn't outlive a server whose config silently changed (§4.5).
    log::info!("{} server(s) missing from cache, falling back to fresh discovery for all {}", missing.len(), servers.len());
    let connect_started = Instant::now();
    let transports = servers.iter().map(transport::build).collect();
    let discovered = discovery::discover_all(transports, discovery_timeout).await;
    let connect_elapsed = connect_started.elapsed();

    for outcome in discovered {
        match outcome {
            Ok(server_discovery) => {
                let entry = CacheEntry {
                    server_name: server_discovery.server_name.clone(),
                    tools: server_discovery.tools,
                    prompts: server_discovery.prompts,
                    resources: server_discovery.resources,
                    cached_at: Utc::now(),
                };

                if let Some(config) = servers.iter().find(|s| s.name == server_discovery.server_name) {
                    let key = Fingerprint::of(config).unified_key(&config.name);
                    if cache.put(&key, entry.clone()).await.is_ok() {
                        cache_writes += 1;
                    }
                }

                results.insert(server_discovery.server_name, entry);
            }
            Err((server_name, cause)) => {
                log::warn!("fresh discovery for '{}' failed: {}", server_name, cause);
                errors.push(format!("{}: {}", server_name, cause));
            }
        }
    }

    emit_cache_event(
        bus,
        &per_server_status,
        cache_hits,
        cache_misses,
        cache_writes,
        &errors,
        &results,
        connect_elapsed.as_millis() as u64,
        cache_elapsed,
    )
    .await;

    Ok(results)
}

#[allow(clippy::too_many_arguments)]
async fn emit_cache_event(
    bus: &EventBus,
    per_server_status: &HashMap<String, Status>,
    hits: u32,
    misses: u32,
    writes: u32,
    errors: &[String],
    results: &HashMap<String, CacheEntry>,
    connection_time_ms: u64,
    cache_time: Duration,
) {
    let per_server_status = per_server_status
        .iter()
        .map(|(name, status)| {
            let label = match status {
                Status::Hit => "hit",
                Status::Miss => "miss",
            };
            (name.clone(), label.to_string())
        })
        .collect();

    let total_tools = results.values().map(|e| e.tools.len()).sum();
    let total_prompts = results.values().map(|e| e.prompts.len()).sum();
    let total_resources = results.values().map(|e| e.resources.len()).sum();

    let event = RuntimeEvent::new(EventKind::ComprehensiveCache(ComprehensiveCacheEvent {
        per_server_status,
        cache_hits: hits,
        cache_misses: misses,
        cache_writes: writes,
        errors: errors.to_vec(),
        total_tools,
        total_prompts,
        total_resources,
        connection_time_ms,
        cache_time_ms: cache_time.as_millis() as u64,
    }));

    bus.emit(event).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Protocol;

    #[tokio::test]
    async fn all_hits_open_no_connections_and_emit_one_event() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf(), Duration::from_secs(3600));
        let mut bus = EventBus::new();
        let recorder = Arc::new(crate::event::RecordingListener::new());
        bus.register(recorder.clone());

        let config = ServerConfig::new("fs", Protocol::Stdio);
        let key = Fingerprint::of(&config).unified_key(&config.name);
        cache
            .put(
                &key,
                CacheEntry {
                    server_name: "fs".into(),
                    tools: vec![],
                    prompts: vec![],
                    resources: vec![],
                    cached_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        let results = get_cached_or_fresh(&cache, &bus, &[config], FacadeOptions::default(), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(recorder.events().await.len(), 1);
    }

    #[tokio::test]
    async fn cache_only_with_no_hits_fails_with_cache_only_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf(), Duration::from_secs(3600));
        let bus = EventBus::new();

        let config = ServerConfig::new("fs", Protocol::Stdio);
        let result = get_cached_or_fresh(
            &cache,
            &bus,
            &[config],
            FacadeOptions { cache_only: true },
            Duration::from_secs(1),
        )
        .await;

        assert!(matches!(result, Err(RuntimeError::Cache(CacheError::CacheOnlyEmpty))));
    }
}
