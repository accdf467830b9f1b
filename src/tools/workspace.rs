//! Workspace virtual tools (§4.8) — thin HTTP wrappers around an external workspace API,
//! grounded on `tool_adapters.rs::McpAdapter`'s pooled-reqwest-client-per-endpoint shape.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{opt_str, req_str, Tool, ToolArg, ToolDescriptor};
use crate::errors::ToolError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(45);

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

struct WorkspaceTool {
    name: &'static str,
    description: &'static str,
    parameters_schema: serde_json::Value,
    method: reqwest::Method,
    path: fn(&HashMap<String, ToolArg>) -> Result<String, ToolError>,
    body: fn(&HashMap<String, ToolArg>) -> Result<serde_json::Value, ToolError>,
    base_url: String,
}

fn no_body(_: &HashMap<String, ToolArg>) -> Result<serde_json::Value, ToolError> {
    Ok(serde_json::Value::Null)
}

#[async_trait]
impl Tool for WorkspaceTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.to_string(),
            description: self.description.to_string(),
            parameters_schema: self.parameters_schema.clone(),
        }
    }

    async fn call(&self, args: HashMap<String, ToolArg>) -> Result<ToolArg, ToolError> {
        let path = (self.path)(&args)?;
        let body = (self.body)(&args)?;

        let mut request = client().request(self.method.clone(), format!("{}{}", self.base_url, path));
        if !body.is_null() {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("workspace API request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ToolError::ExecutionFailed(format!(
                "workspace API returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ToolError::ProtocolError(format!("workspace API returned non-JSON body: {}", e)))?;

        let data = body.get("data").cloned().unwrap_or(body);
        Ok(ToolArg::from_json(data))
    }
}

/// Builds the ten workspace tools (§4.8), all pointed at `base_url`.
pub fn workspace_tools(base_url: impl Into<String>) -> Vec<Arc<dyn Tool>> {
    let base_url = base_url.into();
    let mut tools: Vec<Arc<dyn Tool>> = Vec::new();

    tools.push(Arc::new(WorkspaceTool {
        name: "list_workspace_files",
        description: "Lists files in the workspace, optionally under a path prefix.",
        parameters_schema: serde_json::json!({"type": "object", "properties": {"prefix": {"type": "string"}}}),
        method: reqwest::Method::GET,
        path: |args| Ok(format!("/files?prefix={}", opt_str(args, "prefix").unwrap_or_default())),
        body: no_body,
        base_url: base_url.clone(),
    }));

    tools.push(Arc::new(WorkspaceTool {
        name: "read_workspace_file",
        description: "Reads the contents of a workspace file.",
        parameters_schema: serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]}),
        method: reqwest::Method::GET,
        path: |args| Ok(format!("/files/{}", req_str(args, "path")?)),
        body: no_body,
        base_url: base_url.clone(),
    }));

    tools.push(Arc::new(WorkspaceTool {
        name: "update_workspace_file",
        description: "Creates or overwrites a workspace file with the given content (upsert).",
        parameters_schema: serde_json::json!({
            "type": "object",
            "properties": {"path": {"type": "string"}, "content": {"type": "string"}},
            "required": ["path", "content"]
        }),
        method: reqwest::Method::PUT,
        path: |args| Ok(format!("/files/{}", req_str(args, "path")?)),
        body: |args| Ok(serde_json::json!({ "content": req_str(args, "content")? })),
        base_url: base_url.clone(),
    }));

    tools.push(Arc::new(WorkspaceTool {
        name: "diff_patch_workspace_file",
        description: "Applies a unified diff to a workspace file that has already been read.",
        parameters_schema: serde_json::json!({
            "type": "object",
            "properties": {"path": {"type": "string"}, "patch": {"type": "string"}},
            "required": ["path", "patch"]
        }),
        method: reqwest::Method::PATCH,
        path: |args| Ok(format!("/files/{}", req_str(args, "path")?)),
        body: |args| Ok(serde_json::json!({ "patch": req_str(args, "patch")? })),
        base_url: base_url.clone(),
    }));

    tools.push(Arc::new(WorkspaceTool {
        name: "delete_workspace_file",
        description: "Deletes a workspace file.",
        parameters_schema: serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]}),
        method: reqwest::Method::DELETE,
        path: |args| Ok(format!("/files/{}", req_str(args, "path")?)),
        body: no_body,
        base_url: base_url.clone(),
    }));

    tools.push(Arc::new(WorkspaceTool {
        name: "move_workspace_file",
        description: "Moves or renames a workspace file.",
        parameters_schema: serde_json::json!({
            "type": "object",
            "properties": {"from": {"type": "string"}, "to": {"type": "string"}},
            "required": ["from", "to"]
        }),
        method: reqwest::Method::POST,
        path: |_| Ok("/files/move".to_string()),
        body: |args| Ok(serde_json::json!({ "from": req_str(args, "from")?, "to": req_str(args, "to")? })),
        base_url: base_url.clone(),
    }));

    tools.push(Arc::new(WorkspaceTool {
        name: "regex_search_workspace_files",
        description: "Searches workspace file contents by regular expression.",
        parameters_schema: serde_json::json!({"type": "object", "properties": {"pattern": {"type": "string"}}, "required": ["pattern"]}),
        method: reqwest::Method::POST,
        path: |_| Ok("/search/regex".to_string()),
        body: |args| Ok(serde_json::json!({ "pattern": req_str(args, "pattern")? })),
        base_url: base_url.clone(),
    }));

    tools.push(Arc::new(WorkspaceTool {
        name: "semantic_search_workspace_files",
        description: "Searches workspace file contents by semantic similarity to a query.",
        parameters_schema: serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]}),
        method: reqwest::Method::POST,
        path: |_| Ok("/search/semantic".to_string()),
        body: |args| Ok(serde_json::json!({ "query": req_str(args, "query")? })),
        base_url: base_url.clone(),
    }));

    tools.push(Arc::new(WorkspaceTool {
        name: "sync_workspace_to_github",
        description: "Pushes the current workspace state to its linked GitHub repository.",
        parameters_schema: serde_json::json!({"type": "object", "properties": {"message": {"type": "string"}}}),
        method: reqwest::Method::POST,
        path: |_| Ok("/github/sync".to_string()),
        body: |args| Ok(serde_json::json!({ "message": opt_str(args, "message") })),
        base_url: base_url.clone(),
    }));

    tools.push(Arc::new(WorkspaceTool {
        name: "get_workspace_github_status",
        description: "Reports the workspace's sync status against its linked GitHub repository.",
        parameters_schema: serde_json::json!({"type": "object", "properties": {}}),
        method: reqwest::Method::GET,
        path: |_| Ok("/github/status".to_string()),
        body: no_body,
        base_url,
    }));

    tools
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_ten_workspace_tools_are_present_with_unique_names() {
        let tools = workspace_tools("http://localhost:8081");
        assert_eq!(tools.len(), 10);
        let names: std::collections::HashSet<String> = tools.iter().map(|t| t.descriptor().name).collect();
        assert_eq!(names.len(), 10);
    }

    #[tokio::test]
    async fn read_workspace_file_without_path_is_rejected_before_any_http_call() {
        let tools = workspace_tools("http://localhost:8081");
        let read = tools.iter().find(|t| t.descriptor().name == "read_workspace_file").unwrap();
        let result = read.call(HashMap::new()).await;
        assert!(matches!(result, Err(ToolError::InvalidParameters(_))));
    }
}
