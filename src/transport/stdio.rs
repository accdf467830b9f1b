//! Stdio MCP transport — launches a child process and speaks line-delimited JSON-RPC over its
//! stdin/stdout (§4.1). Broken-pipe detection here is what lets C2 decide to evict a connection.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::errors::TransportError;
use crate::fingerprint::Protocol;
use crate::transport::{CallResult, McpPrompt, McpResource, McpTool, Transport, MCP_PROTOCOL_VERSION};

struct ChildHandle {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

pub struct StdioTransport {
    server_name: String,
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    handle: Mutex<Option<ChildHandle>>,
    next_id: AtomicU64,
}

impl StdioTransport {
    pub fn new(
        server_name: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
        env: BTreeMap<String, String>,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            command: command.into(),
            args,
            env,
            handle: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    fn map_io_err(&self, err: &std::io::Error) -> TransportError {
        let text = err.to_string();
        if TransportError::is_pipe_broken_signature(&text) {
            TransportError::PipeBroken {
                server: self.server_name.clone(),
            }
        } else {
            TransportError::Call {
                server: self.server_name.clone(),
                tool: "<io>".to_string(),
                cause: text,
            }
        }
    }

    async fn rpc_call(&self, method: &str, params: JsonValue) -> Result<JsonValue, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let mut line = request.to_string();
        line.push('\n');

        let mut guard = self.handle.lock().await;
        let handle = guard.as_mut().ok_or_else(|| TransportError::Call {
            server: self.server_name.clone(),
            tool: method.to_string(),
            cause: "not connected".to_string(),
        })?;

        handle
            .stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| self.map_io_err(&e))?;
        handle.stdin.flush().await.map_err(|e| self.map_io_err(&e))?;

        let mut response_line = String::new();
        let bytes_read = handle
            .stdout
            .read_line(&mut response_line)
            .await
            .map_err(|e| self.map_io_err(&e))?;

        if bytes_read == 0 {
            return Err(TransportError::PipeBroken {
                server: self.server_name.clone(),
            });
        }

        let response: JsonValue = serde_json::from_str(response_line.trim()).map_err(|e| TransportError::Call {
            server: self.server_name.clone(),
            tool: method.to_string(),
            cause: format!("malformed JSON-RPC response: {}", e),
        })?;

        if let Some(error) = response.get("error") {
            return Err(TransportError::Call {
                server: self.server_name.clone(),
                tool: method.to_string(),
                cause: error.to_string(),
            });
        }

        Ok(response.get("result").cloned().unwrap_or(JsonValue::Null))
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn connect(&mut self, cancel: CancellationToken) -> Result<(), TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Canceled {
                server: self.server_name.clone(),
            });
        }

        log::debug!("spawning stdio server '{}': {} {:?}", self.server_name, self.command, self.args);

        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = command.spawn().map_err(|e| TransportError::Connect {
            server: self.server_name.clone(),
            cause: e.to_string(),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| TransportError::Connect {
            server: self.server_name.clone(),
            cause: "child stdin unavailable".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| TransportError::Connect {
            server: self.server_name.clone(),
            cause: "child stdout unavailable".to_string(),
        })?;

        *self.handle.lock().await = Some(ChildHandle {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        });

        self.rpc_call(
            "initialize",
            serde_json::json!({ "protocolVersion": MCP_PROTOCOL_VERSION }),
        )
        .await
        .map_err(|e| TransportError::Initialize {
            server: self.server_name.clone(),
            cause: e.to_string(),
        })?;

        log::info!("stdio server '{}' initialized", self.server_name);
        Ok(())
    }

    async fn list_tools(&self, _cancel: CancellationToken) -> Result<Vec<McpTool>, TransportError> {
        let result = self.rpc_call("tools/list", serde_json::json!({})).await?;
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
            .rpc_call("tools/call", serde_json::json!({ "name": name, "arguments": args }))
            .await?;
        Ok(CallResult {
            is_error: result.get("isError").and_then(|v| v.as_bool()).unwrap_or(false),
            content: result.get("content").cloned().unwrap_or(JsonValue::Null),
        })
    }

    async fn list_prompts(&self, _cancel: CancellationToken) -> Result<Vec<McpPrompt>, TransportError> {
        let result = self.rpc_call("prompts/list", serde_json::json!({})).await?;
        serde_json::from_value(result.get("prompts").cloned().unwrap_or(JsonValue::Array(vec![]))).map_err(|e| {
            TransportError::Call {
                server: self.server_name.clone(),
                tool: "prompts/list".to_string(),
                cause: e.to_string(),
            }
        })
    }

    async fn get_prompt(&self, name: &str, _cancel: CancellationToken) -> Result<JsonValue, TransportError> {
        self.rpc_call("prompts/get", serde_json::json!({ "name": name })).await
    }

    async fn list_resources(&self, _cancel: CancellationToken) -> Result<Vec<McpResource>, TransportError> {
        let result = self.rpc_call("resources/list", serde_json::json!({})).await?;
        serde_json::from_value(result.get("resources").cloned().unwrap_or(JsonValue::Array(vec![]))).map_err(|e| {
            TransportError::Call {
                server: self.server_name.clone(),
                tool: "resources/list".to_string(),
                cause: e.to_string(),
            }
        })
    }

    async fn get_resource(&self, uri: &str, _cancel: CancellationToken) -> Result<JsonValue, TransportError> {
        self.rpc_call("resources/read", serde_json::json!({ "uri": uri })).await
    }

    async fn close(&mut self) {
        if let Some(mut handle) = self.handle.lock().await.take() {
            let _ = handle.child.start_kill();
        }
    }

    fn server_name(&self) -> &str {
        &self.server_name
    }

    fn protocol(&self) -> Protocol {
        Protocol::Stdio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn calling_without_connecting_errors_without_panicking() {
        let transport = StdioTransport::new("fs", "nonexistent-binary-xyz", vec![], BTreeMap::new());
        let result = transport.rpc_call("tools/list", serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn connect_to_missing_binary_reports_connect_error() {
        let mut transport = StdioTransport::new("fs", "definitely-not-a-real-binary", vec![], BTreeMap::new());
        let result = transport.connect(CancellationToken::new()).await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
