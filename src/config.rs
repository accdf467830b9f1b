//! Runtime configuration — C16.
//!
//! `RuntimeConfig` is assembled from built-in defaults, then environment variables, then explicit
//! builder overrides (later wins). No TOML/YAML parsing is introduced — the same "users construct
//! it however they want" philosophy as the inherited `CloudLLMConfig`, just with an env layer
//! added because this runtime has more operational knobs than a thought-chain directory path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CACHE_TTL_MINUTES: u64 = 7 * 24 * 60;
const DEFAULT_POOL_MAX_SIZE: usize = 10;
const DEFAULT_POOL_MAX_AGE_SECS: u64 = 3600;
const DEFAULT_POOL_MAX_IDLE_SECS: u64 = 1800;
const DEFAULT_CONNECT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15 * 60;
const DEFAULT_WORKSPACE_API_URL: &str = "http://localhost:8081";
const DEFAULT_MEMORY_API_URL: &str = "http://localhost:8000";
const DEFAULT_MAX_ITERATIONS_AI_ORCHESTRATOR: u32 = 10;
const DEFAULT_MAX_ITERATIONS_TODO_PLANNER: u32 = 10;
const DEFAULT_MAX_ITERATIONS_TODO_REFINEMENT: u32 = 10;

/// Process-wide runtime configuration for the agent runtime.
///
/// # Example
///
/// ```rust
/// use cloudllm::config::RuntimeConfig;
///
/// let config = RuntimeConfig::default();
/// assert_eq!(config.pool_max_size, 10);
/// ```
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Directory backing the on-disk tool cache (C4). Defaults to a `mcp_cache` directory under
    /// the OS-appropriate cache dir, falling back to `./mcp_cache` when that cannot be resolved.
    pub cache_dir: PathBuf,
    /// TTL for cache entries, in minutes.
    pub cache_ttl_minutes: u64,
    /// Soft cap on concurrently pooled stdio connections (C2).
    pub pool_max_size: usize,
    /// Max age before a stdio connection is force-evicted regardless of activity.
    pub pool_max_age: Duration,
    /// Max idle time before the background sweeper evicts a stdio connection.
    pub pool_max_idle: Duration,
    /// Number of connect attempts in `ConnectWithRetry` (C1).
    pub connect_retry_attempts: u32,
    /// Per-attempt connect timeout (C1); generous default to absorb slow first-run downloads.
    pub connect_timeout: Duration,
    /// Base URL for the external workspace document API (consumed only via C8 tools).
    pub workspace_api_url: String,
    /// Base URL for the external long-term memory API (consumed only via C8 tools).
    pub memory_api_url: String,
    /// Wait bound for `WaitForResponse` on a human-feedback request. `None` means wait
    /// indefinitely, matching the resolved Open Question in SPEC_FULL.md §9.
    pub human_feedback_timeout: Option<Duration>,
    /// Upper bound on plan/execute/validate/organize rounds in the AI-controlled orchestrator (C10).
    pub max_iterations_ai_orchestrator: u32,
    /// Upper bound on plan/execute/validate rounds in the multi-agent todo planner (C12).
    pub max_iterations_todo_planner: u32,
    /// Upper bound on critique/refine rounds in the human workflow's refinement phase (C11).
    pub max_iterations_todo_refinement: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("mcp_cache"),
            cache_ttl_minutes: DEFAULT_CACHE_TTL_MINUTES,
            pool_max_size: DEFAULT_POOL_MAX_SIZE,
            pool_max_age: Duration::from_secs(DEFAULT_POOL_MAX_AGE_SECS),
            pool_max_idle: Duration::from_secs(DEFAULT_POOL_MAX_IDLE_SECS),
            connect_retry_attempts: DEFAULT_CONNECT_RETRY_ATTEMPTS,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            workspace_api_url: DEFAULT_WORKSPACE_API_URL.to_string(),
            memory_api_url: DEFAULT_MEMORY_API_URL.to_string(),
            human_feedback_timeout: None,
            max_iterations_ai_orchestrator: DEFAULT_MAX_ITERATIONS_AI_ORCHESTRATOR,
            max_iterations_todo_planner: DEFAULT_MAX_ITERATIONS_TODO_PLANNER,
            max_iterations_todo_refinement: DEFAULT_MAX_ITERATIONS_TODO_REFINEMENT,
        }
    }
}

impl RuntimeConfig {
    /// Build a config from defaults overlaid with the process environment (`std::env::vars`).
    pub fn from_env() -> Self {
        Self::from_env_map(&std::env::vars().collect())
    }

    /// Build a config from an explicit env map, for testability without touching the real
    /// process environment.
    pub fn from_env_map(env: &HashMap<String, String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = env.get("MCP_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }

        if let Some(raw) = env.get("MCP_CACHE_TTL_MINUTES") {
            match raw.parse::<u64>() {
                Ok(v) if v > 0 => config.cache_ttl_minutes = v,
                _ => {
                    log::warn!(
                        "MCP_CACHE_TTL_MINUTES={:?} is non-positive or unparseable, using default {}",
                        raw,
                        DEFAULT_CACHE_TTL_MINUTES
                    );
                }
            }
        }

        if let Some(raw) = env.get("MCP_POOL_MAX_SIZE") {
            match raw.parse::<usize>() {
                Ok(v) if v > 0 => config.pool_max_size = v,
                _ => log::warn!("MCP_POOL_MAX_SIZE={:?} invalid, using default", raw),
            }
        }

        if let Some(raw) = env.get("MCP_POOL_MAX_AGE_SECS") {
            match raw.parse::<u64>() {
                Ok(v) => config.pool_max_age = Duration::from_secs(v),
                Err(_) => log::warn!("MCP_POOL_MAX_AGE_SECS={:?} invalid, using default", raw),
            }
        }

        if let Some(raw) = env.get("MCP_POOL_MAX_IDLE_SECS") {
            match raw.parse::<u64>() {
                Ok(v) => config.pool_max_idle = Duration::from_secs(v),
                Err(_) => log::warn!("MCP_POOL_MAX_IDLE_SECS={:?} invalid, using default", raw),
            }
        }

        if let Some(raw) = env.get("MCP_CONNECT_RETRY_ATTEMPTS") {
            match raw.parse::<u32>() {
                Ok(v) => config.connect_retry_attempts = v,
                Err(_) => log::warn!("MCP_CONNECT_RETRY_ATTEMPTS={:?} invalid, using default", raw),
            }
        }

        if let Some(url) = env.get("PLANNER_API_URL") {
            config.workspace_api_url = url.clone();
        }

        if let Some(url) = env.get("MEMORY_API_URL") {
            config.memory_api_url = url.clone();
        }

        if let Some(raw) = env.get("HUMAN_FEEDBACK_TIMEOUT_SECS") {
            match raw.parse::<u64>() {
                Ok(0) => config.human_feedback_timeout = None,
                Ok(v) => config.human_feedback_timeout = Some(Duration::from_secs(v)),
                Err(_) => log::warn!("HUMAN_FEEDBACK_TIMEOUT_SECS={:?} invalid, using default", raw),
            }
        }

        if let Some(raw) = env.get("MAX_ITERATIONS_AI_ORCHESTRATOR") {
            match raw.parse::<u32>() {
                Ok(v) if v > 0 => config.max_iterations_ai_orchestrator = v,
                _ => log::warn!("MAX_ITERATIONS_AI_ORCHESTRATOR={:?} invalid, using default", raw),
            }
        }

        if let Some(raw) = env.get("MAX_ITERATIONS_TODO_PLANNER") {
            match raw.parse::<u32>() {
                Ok(v) if v > 0 => config.max_iterations_todo_planner = v,
                _ => log::warn!("MAX_ITERATIONS_TODO_PLANNER={:?} invalid, using default", raw),
            }
        }

        if let Some(raw) = env.get("MAX_ITERATIONS_TODO_REFINEMENT") {
            match raw.parse::<u32>() {
                Ok(v) if v > 0 => config.max_iterations_todo_refinement = v,
                _ => log::warn!("MAX_ITERATIONS_TODO_REFINEMENT={:?} invalid, using default", raw),
            }
        }

        config
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_cache_ttl_minutes(mut self, minutes: u64) -> Self {
        self.cache_ttl_minutes = minutes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = RuntimeConfig::default();
        assert_eq!(config.cache_ttl_minutes, DEFAULT_CACHE_TTL_MINUTES);
        assert_eq!(config.pool_max_size, DEFAULT_POOL_MAX_SIZE);
        assert!(config.human_feedback_timeout.is_none());
    }

    #[test]
    fn invalid_ttl_falls_back_to_default() {
        let mut env = HashMap::new();
        env.insert("MCP_CACHE_TTL_MINUTES".to_string(), "not-a-number".to_string());
        let config = RuntimeConfig::from_env_map(&env);
        assert_eq!(config.cache_ttl_minutes, DEFAULT_CACHE_TTL_MINUTES);

        let mut env = HashMap::new();
        env.insert("MCP_CACHE_TTL_MINUTES".to_string(), "0".to_string());
        let config = RuntimeConfig::from_env_map(&env);
        assert_eq!(config.cache_ttl_minutes, DEFAULT_CACHE_TTL_MINUTES);
    }

    #[test]
    fn env_overrides_apply() {
        let mut env = HashMap::new();
        env.insert("MCP_CACHE_DIR".to_string(), "/tmp/my_cache".to_string());
        env.insert("MCP_CACHE_TTL_MINUTES".to_string(), "42".to_string());
        env.insert("PLANNER_API_URL".to_string(), "http://workspace.example".to_string());
        let config = RuntimeConfig::from_env_map(&env);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/my_cache"));
        assert_eq!(config.cache_ttl_minutes, 42);
        assert_eq!(config.workspace_api_url, "http://workspace.example");
    }

    #[test]
    fn zero_feedback_timeout_means_wait_indefinitely() {
        let mut env = HashMap::new();
        env.insert("HUMAN_FEEDBACK_TIMEOUT_SECS".to_string(), "0".to_string());
        let config = RuntimeConfig::from_env_map(&env);
        assert!(config.human_feedback_timeout.is_none());
    }
}
