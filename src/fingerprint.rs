//! Deterministic server-configuration fingerprinting (§3 Fingerprint, §4.4).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Which MCP transport a server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Stdio,
    Sse,
    Http,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Stdio => "stdio",
            Protocol::Sse => "sse",
            Protocol::Http => "http",
        }
    }
}

/// Stable identity of an MCP server (§3 ServerConfig). Read-only after load; merged from
/// base-config and user-config by key with user entries overriding (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub protocol: Protocol,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub url: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub description: Option<String>,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            name: name.into(),
            protocol,
            command: None,
            args: Vec::new(),
            env: BTreeMap::new(),
            url: None,
            headers: BTreeMap::new(),
            description: None,
        }
    }

    /// Canonical, key-sorted JSON encoding used as fingerprint input (§8: Fingerprint(c1) ==
    /// Fingerprint(c2) iff their canonical encodings are equal). `BTreeMap` keeps `env`/`headers`
    /// sorted; fields are serialized in declaration order which is fixed by this struct.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).expect("ServerConfig always serializes")
    }
}

/// Deterministic hash of a canonicalized `ServerConfig` (§3 Fingerprint).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    pub fn of(config: &ServerConfig) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(config.canonical_json().as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Fingerprint(bytes)
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// `unified_<server_name>_<fingerprint>` cache key (§3 CacheEntry, §4.4).
    pub fn unified_key(&self, server_name: &str) -> String {
        format!("unified_{}_{}", server_name, self.to_hex())
    }
}

/// Deterministic hash of `(command, args)` used to key the stdio connection pool (§4.2).
pub fn connection_key(command: &str, args: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(command.as_bytes());
    for arg in args {
        hasher.update(b"\0");
        hasher.update(arg.as_bytes());
    }
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_canonical_configs_have_equal_fingerprints() {
        let mut c1 = ServerConfig::new("fs", Protocol::Stdio);
        c1.command = Some("mcp-fs".into());
        c1.args = vec!["--root".into(), "/tmp".into()];

        let c2 = c1.clone();
        assert_eq!(Fingerprint::of(&c1), Fingerprint::of(&c2));
        assert_eq!(c1.canonical_json(), c2.canonical_json());
    }

    #[test]
    fn differing_args_change_fingerprint() {
        let mut c1 = ServerConfig::new("fs", Protocol::Stdio);
        c1.args = vec!["x".into()];
        let mut c2 = c1.clone();
        c2.args = vec!["y".into()];

        assert_ne!(Fingerprint::of(&c1), Fingerprint::of(&c2));
    }

    #[test]
    fn unified_key_format() {
        let config = ServerConfig::new("memory", Protocol::Http);
        let fp = Fingerprint::of(&config);
        let key = fp.unified_key("memory");
        assert!(key.starts_with("unified_memory_"));
        assert_eq!(key, format!("unified_memory_{}", fp.to_hex()));
    }

    #[test]
    fn connection_key_distinguishes_arg_lists() {
        let k1 = connection_key("node", &["a".to_string()]);
        let k2 = connection_key("node", &["b".to_string()]);
        assert_ne!(k1, k2);
    }
}
