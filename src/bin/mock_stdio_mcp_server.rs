//! Tiny stdio MCP server stub used by `tests/` to exercise C1/C2/C3/C5 against a real child
//! process without depending on an actual external MCP server. Speaks the same line-delimited
//! JSON-RPC framing as `transport::stdio::StdioTransport::rpc_call`.

use std::io::{self, BufRead, Write};

fn main() {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let request: serde_json::Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(_) => continue,
        };

        let id = request.get("id").cloned().unwrap_or(serde_json::Value::Null);
        let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");

        let result = match method {
            "initialize" => serde_json::json!({ "protocolVersion": "2024-11-05" }),
            "tools/list" => serde_json::json!({
                "tools": [{
                    "name": "echo",
                    "description": "echoes its `text` argument",
                    "input_schema": {"type": "object", "properties": {"text": {"type": "string"}}},
                }]
            }),
            "tools/call" => {
                let args = request
                    .get("params")
                    .and_then(|p| p.get("arguments"))
                    .cloned()
                    .unwrap_or(serde_json::json!({}));
                serde_json::json!({ "isError": false, "content": args })
            }
            "prompts/list" => serde_json::json!({ "prompts": [] }),
            "resources/list" => serde_json::json!({ "resources": [] }),
            _ => serde_json::json!({}),
        };

        let response = serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result });
        let _ = writeln!(stdout, "{}", response);
        let _ = stdout.flush();
    }
}
