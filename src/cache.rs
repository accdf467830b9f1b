//! Tool Cache Manager — C4.
//!
//! On-disk JSON cache of per-server tool/prompt/resource listings, keyed by
//! `Fingerprint::unified_key`, generalizing `tool_adapters.rs::McpAdapter`'s
//! `should_refresh_cache`/`refresh_cache` in-memory TTL pattern to a persisted cache with a
//! cache-only fallback mode for when a server can't be reached live (§4.4).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::errors::CacheError;
use crate::transport::{McpPrompt, McpResource, McpTool};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub server_name: String,
    pub tools: Vec<McpTool>,
    pub prompts: Vec<McpPrompt>,
    pub resources: Vec<McpResource>,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.cached_at);
        age.to_std().map(|age| age > ttl).unwrap_or(false)
    }
}

/// A process-wide cache handle, held as an `Arc` by whoever needs it rather than as an ambient
/// global (§9's singleton-services resolution).
pub struct CacheManager {
    cache_dir: PathBuf,
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf, ttl: Duration) -> Self {
        Self {
            cache_dir,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", key))
    }

    /// Returns the entry for `key` if present and not expired.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let entries = self.entries.read().await;
        let hit = entries.get(key).filter(|e| !e.is_expired(self.ttl)).cloned();
        log::debug!("cache {} for {}", if hit.is_some() { "hit" } else { "miss" }, key);
        hit
    }

    /// Returns the entry for `key` regardless of TTL, for cache-only fallback when live discovery
    /// fails. Errors with `CacheOnlyEmpty` if nothing was ever cached for this key.
    pub async fn get_ignoring_ttl(&self, key: &str) -> Result<CacheEntry, CacheError> {
        self.entries
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or(CacheError::CacheOnlyEmpty)
    }

    /// Updates the in-memory map, then persists to disk. File I/O happens after the write lock
    /// on the map is released, so a slow disk never blocks concurrent readers.
    pub async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        log::debug!("cache put {} ({} tools)", key, entry.tools.len());
        {
            let mut entries = self.entries.write().await;
            entries.insert(key.to_string(), entry.clone());
        }

        let path = self.path_for(key);
        let json = serde_json::to_vec_pretty(&entry).map_err(|e| CacheError::Serialize { cause: e.to_string() })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::Io {
                    path: parent.to_path_buf(),
                    cause: e.to_string(),
                })?;
        }

        tokio::fs::write(&path, json).await.map_err(|e| CacheError::Io {
            path: path.clone(),
            cause: e.to_string(),
        })
    }

    /// Reloads the in-memory map from disk, skipping (and logging) any file that fails to parse
    /// rather than crashing the process — a malformed cache entry is never fatal (§9).
    pub async fn reload_from_disk(&self) -> Result<(), CacheError> {
        if !self.cache_dir.exists() {
            return Ok(());
        }

        let mut dir = tokio::fs::read_dir(&self.cache_dir).await.map_err(|e| CacheError::Io {
            path: self.cache_dir.clone(),
            cause: e.to_string(),
        })?;

        let mut loaded = HashMap::new();

        while let Some(dir_entry) = dir.next_entry().await.map_err(|e| CacheError::Io {
            path: self.cache_dir.clone(),
            cause: e.to_string(),
        })? {
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_entry(&path).await {
                Ok(entry) => {
                    let key = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
                    loaded.insert(key, entry);
                }
                Err(e) => {
                    log::warn!("discarding unreadable cache entry {}: {}", path.display(), e);
                    let _ = tokio::fs::remove_file(&path).await;
                }
            }
        }

        *self.entries.write().await = loaded;
        Ok(())
    }

    /// Drops every cached entry for `server_name` from memory and disk.
    pub async fn invalidate_by_server(&self, server_name: &str) {
        log::info!("invalidating cache entries for server '{}'", server_name);
        let keys: Vec<String> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .filter(|(_, e)| e.server_name == server_name)
                .map(|(k, _)| k.clone())
                .collect()
        };

        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(&key);
            let _ = tokio::fs::remove_file(self.path_for(&key)).await;
        }
    }

    /// Removes expired entries from memory and disk, returning how many were removed.
    pub async fn cleanup(&self) -> usize {
        let expired: Vec<String> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .filter(|(_, e)| e.is_expired(self.ttl))
                .map(|(k, _)| k.clone())
                .collect()
        };

        let mut entries = self.entries.write().await;
        for key in &expired {
            entries.remove(key);
            let _ = tokio::fs::remove_file(self.path_for(key)).await;
        }
        expired.len()
    }
}

async fn load_entry(path: &Path) -> Result<CacheEntry, CacheError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| CacheError::Io {
        path: path.to_path_buf(),
        cause: e.to_string(),
    })?;
    serde_json::from_slice(&bytes).map_err(|e| CacheError::Serialize { cause: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(server_name: &str) -> CacheEntry {
        CacheEntry {
            server_name: server_name.to_string(),
            tools: vec![],
            prompts: vec![],
            resources: vec![],
            cached_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips_within_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CacheManager::new(dir.path().to_path_buf(), Duration::from_secs(3600));
        manager.put("unified_fs_abc", sample_entry("fs")).await.unwrap();

        let entry = manager.get("unified_fs_abc").await;
        assert!(entry.is_some());
        assert_eq!(entry.unwrap().server_name, "fs");
    }

    #[tokio::test]
    async fn expired_entry_is_invisible_to_get_but_visible_ignoring_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CacheManager::new(dir.path().to_path_buf(), Duration::from_secs(0));
        let mut entry = sample_entry("fs");
        entry.cached_at = Utc::now() - chrono::Duration::hours(1);
        manager.put("unified_fs_abc", entry).await.unwrap();

        assert!(manager.get("unified_fs_abc").await.is_none());
        assert!(manager.get_ignoring_ttl("unified_fs_abc").await.is_ok());
    }

    #[tokio::test]
    async fn missing_key_ignoring_ttl_reports_cache_only_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CacheManager::new(dir.path().to_path_buf(), Duration::from_secs(3600));
        assert!(matches!(
            manager.get_ignoring_ttl("nope").await,
            Err(CacheError::CacheOnlyEmpty)
        ));
    }

    #[tokio::test]
    async fn reload_from_disk_skips_unparseable_files_without_failing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CacheManager::new(dir.path().to_path_buf(), Duration::from_secs(3600));
        manager.put("unified_fs_abc", sample_entry("fs")).await.unwrap();
        tokio::fs::write(dir.path().join("corrupt.json"), b"not json").await.unwrap();

        let result = manager.reload_from_disk().await;
        assert!(result.is_ok());
        assert!(manager.get("unified_fs_abc").await.is_some());
        assert!(!dir.path().join("corrupt.json").exists());
    }

    #[tokio::test]
    async fn invalidate_by_server_removes_only_matching_entries() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CacheManager::new(dir.path().to_path_buf(), Duration::from_secs(3600));
        manager.put("unified_fs_abc", sample_entry("fs")).await.unwrap();
        manager.put("unified_mem_def", sample_entry("memory")).await.unwrap();

        manager.invalidate_by_server("fs").await;

        assert!(manager.get("unified_fs_abc").await.is_none());
        assert!(manager.get("unified_mem_def").await.is_some());
    }

    #[tokio::test]
    async fn cleanup_removes_only_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CacheManager::new(dir.path().to_path_buf(), Duration::from_secs(3600));
        let mut fresh = sample_entry("fs");
        fresh.cached_at = Utc::now();
        let mut stale = sample_entry("memory");
        stale.cached_at = Utc::now() - chrono::Duration::hours(2);

        manager.put("unified_fs_abc", fresh).await.unwrap();
        manager.put("unified_mem_def", stale).await.unwrap();

        let removed = manager.cleanup().await;
        assert_eq!(removed, 1);
        assert!(manager.get("unified_fs_abc").await.is_some());
    }
}
