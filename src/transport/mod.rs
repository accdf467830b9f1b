//! Transport Clients — C1.
//!
//! Three protocol variants (stdio/sse/http) share the [`Transport`] contract. Grounded on the
//! inherited `McpClientProtocol`/`McpAdapter` reqwest-client pattern, generalized to also cover
//! the stdio child-process and SSE-stream shapes the spec requires.

pub mod http;
pub mod retry;
pub mod sse;
pub mod stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;

use crate::errors::TransportError;
use crate::fingerprint::{Protocol, ServerConfig};

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Builds the concrete transport named by `config.protocol` (§4.1).
pub fn build(config: &ServerConfig) -> Box<dyn Transport> {
    match config.protocol {
        Protocol::Stdio => Box::new(stdio::StdioTransport::new(
            config.name.clone(),
            config.command.clone().unwrap_or_default(),
            config.args.clone(),
            config.env.clone(),
        )),
        Protocol::Http => Box::new(http::HttpTransport::new(
            config.name.clone(),
            config.url.clone().unwrap_or_default(),
            config.headers.clone(),
        )),
        Protocol::Sse => Box::new(sse::SseTransport::new(
            config.name.clone(),
            config.url.clone().unwrap_or_default(),
            config.headers.clone(),
        )),
    }
}

/// A tool as discovered from an MCP server, normalized per §3's array/`items` invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    pub description: String,
    pub input_schema: JsonValue,
}

impl McpTool {
    /// Ensures every `type:"array"` property in the schema carries an `items` subschema,
    /// defaulting to `{"type":"string"}` when absent (§3, §8).
    pub fn normalize(mut self) -> Self {
        normalize_schema(&mut self.input_schema);
        self
    }
}

fn normalize_schema(schema: &mut JsonValue) {
    let Some(obj) = schema.as_object_mut() else {
        return;
    };

    if obj.get("type").and_then(|t| t.as_str()) == Some("array") && !obj.contains_key("items") {
        obj.insert("items".to_string(), serde_json::json!({"type": "string"}));
    }

    if let Some(properties) = obj.get_mut("properties").and_then(|p| p.as_object_mut()) {
        for (_, value) in properties.iter_mut() {
            normalize_schema(value);
        }
    }

    if let Some(items) = obj.get_mut("items") {
        normalize_schema(items);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpPrompt {
    pub name: String,
    pub description: Option<String>,
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResource {
    pub uri: String,
    pub name: String,
    pub mime_type: Option<String>,
}

/// Result of a `CallTool` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResult {
    pub content: JsonValue,
    pub is_error: bool,
}

/// Shared contract implemented by the stdio/sse/http transports (§4.1).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&mut self, cancel: CancellationToken) -> Result<(), TransportError>;
    async fn list_tools(&self, cancel: CancellationToken) -> Result<Vec<McpTool>, TransportError>;
    async fn call_tool(
        &self,
        name: &str,
        args: JsonValue,
        cancel: CancellationToken,
    ) -> Result<CallResult, TransportError>;
    async fn list_prompts(&self, cancel: CancellationToken) -> Result<Vec<McpPrompt>, TransportError>;
    async fn get_prompt(
        &self,
        name: &str,
        cancel: CancellationToken,
    ) -> Result<JsonValue, TransportError>;
    async fn list_resources(&self, cancel: CancellationToken) -> Result<Vec<McpResource>, TransportError>;
    async fn get_resource(
        &self,
        uri: &str,
        cancel: CancellationToken,
    ) -> Result<JsonValue, TransportError>;
    async fn close(&mut self);

    fn server_name(&self) -> &str;
    fn protocol(&self) -> Protocol;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_missing_items_default() {
        let mut tool = McpTool {
            name: "search".into(),
            description: "".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "tags": {"type": "array"},
                    "nested": {"type": "object", "properties": {"list": {"type": "array"}}}
                }
            }),
        }
        .normalize();

        assert_eq!(tool.input_schema["properties"]["tags"]["items"]["type"], "string");
        assert_eq!(
            tool.input_schema["properties"]["nested"]["properties"]["list"]["items"]["type"],
            "string"
        );
        // idempotent: normalizing again is a no-op
        let before = tool.input_schema.clone();
        tool = tool.normalize();
        assert_eq!(before, tool.input_schema);
    }

    #[test]
    fn normalize_preserves_existing_items() {
        let tool = McpTool {
            name: "t".into(),
            description: "".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {"ids": {"type": "array", "items": {"type": "integer"}}}
            }),
        }
        .normalize();
        assert_eq!(tool.input_schema["properties"]["ids"]["items"]["type"], "integer");
    }
}
