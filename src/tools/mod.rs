//! Virtual Tool Adapters — C8.
//!
//! `ToolArg` replaces the inherited `serde_json::Value`-everywhere style with a small tagged
//! union so tool parameters are pattern-matchable Rust rather than opaque JSON (§3, §9's resolved
//! Open Question). `Tool`/`ToolRegistry` generalize `tool_protocol.rs`'s `ToolMetadata`/
//! `ToolRegistry` pair to the three virtual-tool families this runtime ships (§4.8).

pub mod feedback;
pub mod memory;
pub mod workspace;

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::errors::ToolError;

/// A tool argument or return value, kept as a closed tagged union rather than raw JSON so callers
/// can exhaustively match on shape (§3 ToolArg).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolArg {
    String(String),
    Int(i64),
    Bool(bool),
    Number(f64),
    Object(BTreeMap<String, ToolArg>),
    Array(Vec<ToolArg>),
    Null,
}

impl ToolArg {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ToolArg::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ToolArg::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }

    pub fn from_json(value: JsonValue) -> Self {
        serde_json::from_value(value).unwrap_or(ToolArg::Null)
    }
}

/// What an agent/LLM needs to see in order to call a tool — name, description, JSON-Schema
/// parameters (§3 ToolMetadata, generalized from `tool_protocol.rs::ToolMetadata`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters_schema: JsonValue,
}

/// A callable virtual tool (§4.8). Each of the three families below produces a
/// `Vec<Arc<dyn Tool>>`; `ToolRegistry::descriptors`/`call` give the
/// `(tool_descriptor_list, executor_map)` pair the spec asks for from the same objects.
#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;
    async fn call(&self, args: HashMap<String, ToolArg>) -> Result<ToolArg, ToolError>;
}

/// Aggregates tools from all three families under one name -> tool map.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.descriptor().name.clone(), tool);
    }

    pub fn extend(&mut self, tools: Vec<Arc<dyn Tool>>) {
        for tool in tools {
            self.register(tool);
        }
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|t| t.descriptor()).collect()
    }

    pub async fn call(&self, name: &str, args: HashMap<String, ToolArg>) -> Result<ToolArg, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.call(args).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn required_str(args: &HashMap<String, ToolArg>, key: &str) -> Result<String, ToolError> {
    args.get(key)
        .and_then(ToolArg::as_str)
        .map(str::to_string)
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing required string parameter `{}`", key)))
}

fn optional_str(args: &HashMap<String, ToolArg>, key: &str) -> Option<String> {
    args.get(key).and_then(ToolArg::as_str).map(str::to_string)
}

pub(crate) use optional_str as opt_str;
pub(crate) use required_str as req_str;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_arg_round_trips_through_json() {
        let mut obj = BTreeMap::new();
        obj.insert("count".to_string(), ToolArg::Int(3));
        obj.insert("label".to_string(), ToolArg::String("x".into()));
        let arg = ToolArg::Object(obj);

        let json = arg.to_json();
        let back = ToolArg::from_json(json);
        assert_eq!(arg, back);
    }

    #[tokio::test]
    async fn registry_reports_not_found_for_unknown_tool() {
        let registry = ToolRegistry::new();
        let result = registry.call("nonexistent", HashMap::new()).await;
        assert!(matches!(result, Err(ToolError::NotFound(_))));
    }
}
