//! HTTP MCP transport — stateless request/response over a pooled `reqwest::Client` (§4.1).

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;

use crate::errors::TransportError;
use crate::fingerprint::Protocol;
use crate::transport::{CallResult, McpPrompt, McpResource, McpTool, Transport, MCP_PROTOCOL_VERSION};

/// Shared `reqwest::Client` pool keyed by base URL, mirroring the teacher's `http_client_pool`.
static CLIENT_POOL: Lazy<DashMap<String, reqwest::Client>> = Lazy::new(DashMap::new);

fn pooled_client(base_url: &str) -> reqwest::Client {
    if let Some(client) = CLIENT_POOL.get(base_url) {
        return client.clone();
    }
    let client = reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(std::time::Duration::from_secs(90)))
        .pool_max_idle_per_host(100)
        .tcp_keepalive(Some(std::time::Duration::from_secs(60)))
        .connect_timeout(std::time::Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());
    CLIENT_POOL.insert(base_url.to_string(), client.clone());
    client
}

pub struct HttpTransport {
    server_name: String,
    base_url: String,
    headers: BTreeMap<String, String>,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(server_name: impl Into<String>, base_url: impl Into<String>, headers: BTreeMap<String, String>) -> Self {
        let base_url = base_url.into();
        let client = pooled_client(&base_url);
        Self {
            server_name: server_name.into(),
            base_url,
            headers,
            client,
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(format!("{}{}", self.base_url, path));
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }
        builder
    }

    async fn post_json(&self, path: &str, body: JsonValue, tool: &str) -> Result<JsonValue, TransportError> {
        let response = self
            .request(path)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(&e, tool))?;

        if !response.status().is_success() {
            return Err(TransportError::Call {
                server: self.server_name.clone(),
                tool: tool.to_string(),
                cause: format!("HTTP {}", response.status()),
            });
        }

        response.json::<JsonValue>().await.map_err(|e| TransportError::Call {
            server: self.server_name.clone(),
            tool: tool.to_string(),
            cause: e.to_string(),
        })
    }

    fn classify(&self, err: &reqwest::Error, tool: &str) -> TransportError {
        let text = err.to_string();
        if TransportError::is_pipe_broken_signature(&text) {
            TransportError::PipeBroken {
                server: self.server_name.clone(),
            }
        } else if err.is_timeout() {
            TransportError::Timeout {
                server: self.server_name.clone(),
            }
        } else {
            TransportError::Call {
                server: self.server_name.clone(),
                tool: tool.to_string(),
                cause: text,
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&mut self, cancel: CancellationToken) -> Result<(), TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Canceled {
                server: self.server_name.clone(),
            });
        }
        log::debug!("connecting to http server '{}'", self.server_name);
        self.post_json(
            "/initialize",
            serde_json::json!({ "protocolVersion": MCP_PROTOCOL_VERSION }),
            "initialize",
        )
        .await
        .map_err(|e| TransportError::Initialize {
            server: self.server_name.clone(),
            cause: e.to_string(),
        })?;
        log::info!("http server '{}' initialized", self.server_name);
        Ok(())
    }

    async fn list_tools(&self, _cancel: CancellationToken) -> Result<Vec<McpTool>, TransportError> {
        let result = self.post_json("/tools/list", serde_json::json!({}), "tools/list").await?;
        let tools: Vec<McpTool> = serde_json::from_value(result.get("tools").cloned().unwrap_or(JsonValue::Array(vec![])))
            .map_err(|e| TransportError::Call {
                server: self.server_name.clone(),
                tool: "tools/list".to_string(),
                cause: e.to_string(),
            })?;
        Ok(tools.into_iter().map(McpTool::normalize).collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        args: JsonValue,
        _cancel: CancellationToken,
    ) -> Result<CallResult, TransportError> {
        let result = self
            .post_json(
                "/tools/call",
                serde_json::json!({ "name": name, "arguments": args }),
                "tools/call",
            )
            .await?;
        Ok(CallResult {
            is_error: result.get("isError").and_then(|v| v.as_bool()).unwrap_or(false),
            content: result.get("content").cloned().unwrap_or(JsonValue::Null),
        })
    }

    async fn list_prompts(&self, _cancel: CancellationToken) -> Result<Vec<McpPrompt>, TransportError> {
        let result = self
            .post_json("/prompts/list", serde_json::json!({}), "prompts/list")
            .await?;
        serde_json::from_value(result.get("prompts").cloned().unwrap_or(JsonValue::Array(vec![]))).map_err(|e| {
            TransportError::Call {
                server: self.server_name.clone(),
                tool: "prompts/list".to_string(),
                cause: e.to_string(),
            }
        })
    }

    async fn get_prompt(&self, name: &str, _cancel: CancellationToken) -> Result<JsonValue, TransportError> {
        self.post_json("/prompts/get", serde_json::json!({ "name": name }), "prompts/get").await
    }

    async fn list_resources(&self, _cancel: CancellationToken) -> Result<Vec<McpResource>, TransportError> {
        let result = self
            .post_json("/resources/list", serde_json::json!({}), "resources/list")
            .await?;
        serde_json::from_value(result.get("resources").cloned().unwrap_or(JsonValue::Array(vec![]))).map_err(|e| {
            TransportError::Call {
                server: self.server_name.clone(),
                tool: "resources/list".to_string(),
                cause: e.to_string(),
            }
        })
    }

    async fn get_resource(&self, uri: &str, _cancel: CancellationToken) -> Result<JsonValue, TransportError> {
        self.post_json("/resources/read", serde_json::json!({ "uri": uri }), "resources/read").await
    }

    async fn close(&mut self) {}

    fn server_name(&self) -> &str {
        &self.server_name
    }

    fn protocol(&self) -> Protocol {
        Protocol::Http
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pooled_client_is_reused_for_same_base_url() {
        let a = pooled_client("http://localhost:9");
        let b = pooled_client("http://localhost:9");
        assert_eq!(format!("{:?}", a), format!("{:?}", b));
    }

    #[tokio::test]
    async fn connect_to_unreachable_server_reports_initialize_error() {
        let mut transport = HttpTransport::new("memory", "http://127.0.0.1:1", BTreeMap::new());
        let result = transport.connect(CancellationToken::new()).await;
        assert!(matches!(result, Err(TransportError::Initialize { .. })));
    }
}
