//! SSE MCP transport — the event stream is owned by a background task whose lifetime is
//! decoupled from any caller's or discovery round's cancellation token; it only stops when
//! `close()` is called or the stream itself ends (§4.1, §4.3).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value as JsonValue;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::errors::TransportError;
use crate::fingerprint::Protocol;
use crate::transport::{CallResult, McpPrompt, McpResource, McpTool, Transport, MCP_PROTOCOL_VERSION};

const ENDPOINT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);
const ENDPOINT_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct SseTransport {
    server_name: String,
    base_url: String,
    headers: BTreeMap<String, String>,
    client: reqwest::Client,
    post_endpoint: Arc<RwLock<Option<String>>>,
    background_cancel: CancellationToken,
    background_task: Mutex<Option<JoinHandle<()>>>,
}

impl SseTransport {
    pub fn new(server_name: impl Into<String>, base_url: impl Into<String>, headers: BTreeMap<String, String>) -> Self {
        Self {
            server_name: server_name.into(),
            base_url: base_url.into(),
            headers,
            client: reqwest::Client::new(),
            post_endpoint: Arc::new(RwLock::new(None)),
            background_cancel: CancellationToken::new(),
            background_task: Mutex::new(None),
        }
    }

    async fn spawn_stream(&self) {
        let server_name = self.server_name.clone();
        let base_url = self.base_url.clone();
        let mut request = self.client.get(&base_url).header("Accept", "text/event-stream");
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        let post_endpoint = self.post_endpoint.clone();
        let cancel = self.background_cancel.clone();

        let task = tokio::spawn(async move {
            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    log::warn!("sse stream for {} failed to connect: {}", server_name, e);
                    return;
                }
            };

            let mut stream = response.bytes_stream();
            let mut pending_event: Option<String> = None;
            let mut buffer = String::new();

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        log::debug!("sse stream for {} closed", server_name);
                        return;
                    }
                    chunk = stream.next() => {
                        let Some(chunk) = chunk else {
                            log::debug!("sse stream for {} ended", server_name);
                            return;
                        };
                        let Ok(bytes) = chunk else { return; };
                        buffer.push_str(&String::from_utf8_lossy(&bytes));

                        while let Some(pos) = buffer.find('\n') {
                            let line = buffer[..pos].trim_end_matches('\r').to_string();
                            buffer.drain(..=pos);

                            if let Some(rest) = line.strip_prefix("event:") {
                                pending_event = Some(rest.trim().to_string());
                            } else if let Some(rest) = line.strip_prefix("data:") {
                                if pending_event.as_deref() == Some("endpoint") {
                                    let path = rest.trim().to_string();
                                    let resolved = if path.starts_with("http") {
                                        path
                                    } else {
                                        format!("{}{}", base_url.trim_end_matches('/'), path)
                                    };
                                    *post_endpoint.write().await = Some(resolved);
                                }
                            } else if line.is_empty() {
                                pending_event = None;
                            }
                        }
                    }
                }
            }
        });

        *self.background_task.lock().await = Some(task);
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn connect(&mut self, cancel: CancellationToken) -> Result<(), TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Canceled {
                server: self.server_name.clone(),
            });
        }

        self.spawn_stream().await;

        let deadline = tokio::time::Instant::now() + ENDPOINT_WAIT_TIMEOUT;
        loop {
            if self.post_endpoint.read().await.is_some() {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(TransportError::Connect {
                    server: self.server_name.clone(),
                    cause: "timed out waiting for SSE endpoint event".to_string(),
                });
            }
            if cancel.is_cancelled() {
                return Err(TransportError::Canceled {
                    server: self.server_name.clone(),
                });
            }
            tokio::time::sleep(ENDPOINT_POLL_INTERVAL).await;
        }

        self.post_json(
            "initialize",
            serde_json::json!({ "protocolVersion": MCP_PROTOCOL_VERSION }),
        )
        .await
        .map_err(|e| TransportError::Initialize {
            server: self.server_name.clone(),
            cause: e.to_string(),
        })?;

        Ok(())
    }

    async fn list_tools(&self, _cancel: CancellationToken) -> Result<Vec<McpTool>, TransportError> {
        let result = self.post_json("tools/list", serde_json::json!({})).await?;
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
            .post_json("tools/call", serde_json::json!({ "name": name, "arguments": args }))
            .await?;
        Ok(CallResult {
            is_error: result.get("isError").and_then(|v| v.as_bool()).unwrap_or(false),
            content: result.get("content").cloned().unwrap_or(JsonValue::Null),
        })
    }

    async fn list_prompts(&self, _cancel: CancellationToken) -> Result<Vec<McpPrompt>, TransportError> {
        let result = self.post_json("prompts/list", serde_json::json!({})).await?;
        serde_json::from_value(result.get("prompts").cloned().unwrap_or(JsonValue::Array(vec![]))).map_err(|e| {
            TransportError::Call {
                server: self.server_name.clone(),
                tool: "prompts/list".to_string(),
                cause: e.to_string(),
            }
        })
    }

    async fn get_prompt(&self, name: &str, _cancel: CancellationToken) -> Result<JsonValue, TransportError> {
        self.post_json("prompts/get", serde_json::json!({ "name": name })).await
    }

    async fn list_resources(&self, _cancel: CancellationToken) -> Result<Vec<McpResource>, TransportError> {
        let result = self.post_json("resources/list", serde_json::json!({})).await?;
        serde_json::from_value(result.get("resources").cloned().unwrap_or(JsonValue::Array(vec![]))).map_err(|e| {
            TransportError::Call {
                server: self.server_name.clone(),
                tool: "resources/list".to_string(),
                cause: e.to_string(),
            }
        })
    }

    async fn get_resource(&self, uri: &str, _cancel: CancellationToken) -> Result<JsonValue, TransportError> {
        self.post_json("resources/read", serde_json::json!({ "uri": uri })).await
    }

    async fn close(&mut self) {
        self.background_cancel.cancel();
        if let Some(task) = self.background_task.lock().await.take() {
            task.abort();
        }
    }

    fn server_name(&self) -> &str {
        &self.server_name
    }

    fn protocol(&self) -> Protocol {
        Protocol::Sse
    }
}

impl SseTransport {
    async fn post_json(&self, method: &str, params: JsonValue) -> Result<JsonValue, TransportError> {
        let endpoint = self.post_endpoint.read().await.clone().ok_or_else(|| TransportError::Call {
            server: self.server_name.clone(),
            tool: method.to_string(),
            cause: "SSE endpoint not yet established".to_string(),
        })?;

        let response = self
            .client
            .post(&endpoint)
            .json(&serde_json::json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params }))
            .send()
            .await
            .map_err(|e| {
                let text = e.to_string();
                if TransportError::is_pipe_broken_signature(&text) {
                    TransportError::PipeBroken {
                        server: self.server_name.clone(),
                    }
                } else {
                    TransportError::Call {
                        server: self.server_name.clone(),
                        tool: method.to_string(),
                        cause: text,
                    }
                }
            })?;

        let body: JsonValue = response.json().await.map_err(|e| TransportError::Call {
            server: self.server_name.clone(),
            tool: method.to_string(),
            cause: e.to_string(),
        })?;

        if let Some(error) = body.get("error") {
            return Err(TransportError::Call {
                server: self.server_name.clone(),
                tool: method.to_string(),
                cause: error.to_string(),
            });
        }

        Ok(body.get("result").cloned().unwrap_or(JsonValue::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_without_server_times_out_rather_than_hanging() {
        let mut transport = SseTransport::new("demo", "http://127.0.0.1:1", BTreeMap::new());
        let result = transport.connect(CancellationToken::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn close_before_connect_is_a_no_op() {
        let mut transport = SseTransport::new("demo", "http://127.0.0.1:1", BTreeMap::new());
        transport.close().await;
    }
}
