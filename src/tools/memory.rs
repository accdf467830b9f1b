//! Memory virtual tools (§4.8): `add_memory`, `search_memory`, `delete_memory`. Delete requires an
//! explicit confirmation argument; without it the call is refused rather than attempted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{req_str, Tool, ToolArg, ToolDescriptor};
use crate::errors::ToolError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

struct AddMemory {
    base_url: String,
}

#[async_trait]
impl Tool for AddMemory {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "add_memory".to_string(),
            description: "Stores a piece of content in long-term memory.".to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "properties": {"content": {"type": "string"}},
                "required": ["content"]
            }),
        }
    }

    async fn call(&self, args: HashMap<String, ToolArg>) -> Result<ToolArg, ToolError> {
        let content = req_str(&args, "content")?;
        let response = client()
            .post(format!("{}/memories", self.base_url))
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("memory API request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ToolError::ExecutionFailed(format!("memory API returned {}", response.status())));
        }

        Ok(ToolArg::Bool(true))
    }
}

struct SearchMemory {
    base_url: String,
}

#[async_trait]
impl Tool for SearchMemory {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "search_memory".to_string(),
            description: "Searches long-term memory for content relevant to a query.".to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: HashMap<String, ToolArg>) -> Result<ToolArg, ToolError> {
        let query = req_str(&args, "query")?;
        let response = client()
            .get(format!("{}/memories/search", self.base_url))
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("memory API request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ToolError::ExecutionFailed(format!("memory API returned {}", response.status())));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ToolError::ProtocolError(format!("memory API returned non-JSON body: {}", e)))?;

        Ok(ToolArg::from_json(body))
    }
}

struct DeleteMemory {
    base_url: String,
}

#[async_trait]
impl Tool for DeleteMemory {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "delete_memory".to_string(),
            description: "Deletes a stored memory entry. Requires confirm=true.".to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "properties": {"id": {"type": "string"}, "confirm": {"type": "boolean"}},
                "required": ["id", "confirm"]
            }),
        }
    }

    async fn call(&self, args: HashMap<String, ToolArg>) -> Result<ToolArg, ToolError> {
        let id = req_str(&args, "id")?;
        let confirmed = args.get("confirm").and_then(ToolArg::as_bool).unwrap_or(false);

        if !confirmed {
            return Ok(ToolArg::String("cancelled: delete_memory requires confirm=true".to_string()));
        }

        let response = client()
            .delete(format!("{}/memories/{}", self.base_url, id))
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("memory API request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ToolError::ExecutionFailed(format!("memory API returned {}", response.status())));
        }

        Ok(ToolArg::Bool(true))
    }
}

pub fn memory_tools(base_url: impl Into<String>) -> Vec<Arc<dyn Tool>> {
    let base_url = base_url.into();
    vec![
        Arc::new(AddMemory { base_url: base_url.clone() }),
        Arc::new(SearchMemory { base_url: base_url.clone() }),
        Arc::new(DeleteMemory { base_url }),
    ]
}
