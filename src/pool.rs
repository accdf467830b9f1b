//! Stdio Connection Pool — C2.
//!
//! Keeps one live stdio child process per `(command, args)` fingerprint alive across calls,
//! generalizing the teacher's `http_client_pool`'s `DashMap`-keyed singleton-client pattern from
//! pooled `reqwest::Client`s to pooled stdio child processes (§4.2).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::errors::TransportError;
use crate::fingerprint::connection_key;
use crate::transport::stdio::StdioTransport;
use crate::transport::{CallResult, McpPrompt, McpResource, McpTool, Transport};

/// One pooled stdio connection plus the bookkeeping the sweeper needs.
pub struct PooledConnection {
    transport: AsyncMutex<StdioTransport>,
    created_at: Instant,
    last_used_secs: AtomicU64,
}

impl PooledConnection {
    fn touch(&self) {
        self.last_used_secs.store(now_secs(), Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = self.last_used_secs.load(Ordering::Relaxed);
        Duration::from_secs(now_secs().saturating_sub(last))
    }

    fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub async fn list_tools(&self, cancel: CancellationToken) -> Result<Vec<McpTool>, TransportError> {
        self.touch();
        self.transport.lock().await.list_tools(cancel).await
    }

    pub async fn call_tool(
        &self,
        name: &str,
        args: JsonValue,
        cancel: CancellationToken,
    ) -> Result<CallResult, TransportError> {
        self.touch();
        self.transport.lock().await.call_tool(name, args, cancel).await
    }

    pub async fn list_prompts(&self, cancel: CancellationToken) -> Result<Vec<McpPrompt>, TransportError> {
        self.touch();
        self.transport.lock().await.list_prompts(cancel).await
    }

    pub async fn list_resources(&self, cancel: CancellationToken) -> Result<Vec<McpResource>, TransportError> {
        self.touch();
        self.transport.lock().await.list_resources(cancel).await
    }
}

fn now_secs() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// A process-wide pool of stdio connections, constructed once and shared by `Arc` (never an
/// ambient global — callers hold the handle they were given).
pub struct StdioConnectionPool {
    connections: DashMap<String, Arc<PooledConnection>>,
    max_size: usize,
    max_age: Duration,
    max_idle: Duration,
}

impl StdioConnectionPool {
    pub fn new(max_size: usize, max_age: Duration, max_idle: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            max_size,
            max_age,
            max_idle,
        }
    }

    /// Returns the pooled connection for `(command, args)`, connecting a fresh one if absent.
    pub async fn get_connection(
        &self,
        server_name: &str,
        command: &str,
        args: &[String],
        env: BTreeMap<String, String>,
        cancel: CancellationToken,
    ) -> Result<Arc<PooledConnection>, TransportError> {
        let key = connection_key(command, args);

        if let Some(existing) = self.connections.get(&key) {
            log::debug!("pool hit for '{}' ({} {:?})", server_name, command, args);
            return Ok(existing.clone());
        }

        log::info!("pool miss for '{}', connecting {} {:?}", server_name, command, args);
        self.evict_lru_if_full();

        let mut transport = StdioTransport::new(server_name, command, args.to_vec(), env);
        transport.connect(cancel).await?;

        let connection = Arc::new(PooledConnection {
            transport: AsyncMutex::new(transport),
            created_at: Instant::now(),
            last_used_secs: AtomicU64::new(now_secs()),
        });

        self.connections.insert(key, connection.clone());
        Ok(connection)
    }

    /// Drops a connection that the caller observed failing (pipe broken, etc.) so the next
    /// `get_connection` call reconnects from scratch (§4.2).
    pub fn force_remove_broken(&self, command: &str, args: &[String]) {
        let key = connection_key(command, args);
        if self.connections.remove(&key).is_some() {
            log::warn!("removed broken pooled connection for {} {:?}", command, args);
        }
    }

    fn evict_lru_if_full(&self) {
        if self.connections.len() < self.max_size {
            return;
        }
        let oldest = self
            .connections
            .iter()
            .max_by_key(|entry| entry.value().idle_for())
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.connections.remove(&key);
        }
    }

    /// One sweep pass: closes and drops connections past `max_age` or idle past `max_idle`.
    /// Intended to be called on a timer by `spawn_sweeper`.
    pub async fn sweep(&self) {
        let expired: Vec<String> = self
            .connections
            .iter()
            .filter(|entry| entry.value().age() > self.max_age || entry.value().idle_for() > self.max_idle)
            .map(|entry| entry.key().clone())
            .collect();

        for key in expired {
            if let Some((_, connection)) = self.connections.remove(&key) {
                log::debug!("sweeping expired pooled connection {}", key);
                connection.transport.lock().await.close().await;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// Spawns a background task that calls `sweep` every `interval` until `cancel` fires.
pub fn spawn_sweeper(pool: Arc<StdioConnectionPool>, interval: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => pool.sweep().await,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connecting_to_missing_binary_does_not_pollute_the_pool() {
        let pool = StdioConnectionPool::new(4, Duration::from_secs(3600), Duration::from_secs(1800));
        let result = pool
            .get_connection("fs", "definitely-not-a-real-binary", &[], BTreeMap::new(), CancellationToken::new())
            .await;
        assert!(result.is_err());
        assert!(pool.is_empty());
    }

    #[test]
    fn force_remove_on_empty_pool_is_a_no_op() {
        let pool = StdioConnectionPool::new(4, Duration::from_secs(3600), Duration::from_secs(1800));
        pool.force_remove_broken("node", &["x".to_string()]);
        assert!(pool.is_empty());
    }

    #[test]
    fn evict_lru_on_non_full_pool_is_a_no_op() {
        let pool = StdioConnectionPool::new(10, Duration::from_secs(3600), Duration::from_secs(1800));
        pool.evict_lru_if_full();
        assert!(pool.is_empty());
    }
}
