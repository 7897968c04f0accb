//! Shared types for the tool-server client.
//!
//! JSON-RPC 2.0 message types, server descriptors, and the tagged content
//! union produced at the session boundary.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ─── Tool Identifiers ────────────────────────────────────────────────────────

/// Separator between server name and tool name in a qualified identifier.
pub const TOOL_ID_SEPARATOR: &str = "__";

/// Build the globally unique identifier for a tool on a server.
///
/// E.g., `("filesystem", "read_file")` → `"filesystem__read_file"`.
pub fn join_tool_id(server: &str, tool: &str) -> String {
    format!("{server}{TOOL_ID_SEPARATOR}{tool}")
}

/// Split a qualified tool identifier back into `(server, tool)`.
///
/// Returns `None` when either half is empty or the separator is missing.
/// The split happens at the FIRST separator, so tool names may themselves
/// contain double underscores.
pub fn split_tool_id(tool_id: &str) -> Option<(&str, &str)> {
    let (server, tool) = tool_id.split_once(TOOL_ID_SEPARATOR)?;
    if server.is_empty() || tool.is_empty() {
        return None;
    }
    Some((server, tool))
}

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message (success or error).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: u64,
    pub result: Option<serde_json::Value>,
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

// ─── Server Configuration ────────────────────────────────────────────────────

/// Static description of one tool server.
///
/// The full set is loaded once at startup and never mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerDescriptor {
    /// Unique server name — the first half of every tool identifier.
    pub name: String,
    #[serde(flatten)]
    pub kind: ConnectionKind,
    /// Whether `connect_all` should attempt this server.
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
    /// Server-level default for folding tool results back into the model.
    /// Overridden by a tool-specific policy; `None` falls through to `false`.
    #[serde(default)]
    pub send_result_to_ai: Option<bool>,
}

fn default_auto_connect() -> bool {
    true
}

/// How to reach a tool server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum ConnectionKind {
    /// Spawned child process speaking line-delimited JSON-RPC over stdio.
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Persistent streamed-event connection to an HTTP endpoint.
    Sse { url: String },
}

// ─── Protocol Types ──────────────────────────────────────────────────────────

/// Tool definition as returned by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// `initialize` response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(default)]
    pub capabilities: serde_json::Value,
    #[serde(default, alias = "serverInfo")]
    pub server_info: Option<ServerInfo>,
}

/// Server identity returned in the initialize response.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// `tools/list` response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}

// ─── Raw Tool Content ────────────────────────────────────────────────────────

/// Tool output resolved into one normalized shape at the session boundary.
///
/// Tool servers return heterogeneous payloads (plain text blocks, arbitrary
/// JSON, base64 blobs). Resolving the union here means the dispatcher and
/// response transformers never inspect protocol-level structure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum RawContent {
    Text { text: String },
    Structured { value: serde_json::Value },
    Binary {
        /// Base64-encoded payload, passed through undecoded.
        data: String,
        mime_type: Option<String>,
    },
}

impl RawContent {
    /// Resolve a `tools/call` result payload into a `RawContent`.
    ///
    /// Recognizes the protocol's `content` block list: all-text blocks
    /// collapse into `Text` (joined with newlines), a single blob block
    /// becomes `Binary`, anything else is carried as `Structured`.
    pub fn resolve(result: serde_json::Value) -> Self {
        if let Some(blocks) = result.get("content").and_then(|c| c.as_array()) {
            let texts: Vec<&str> = blocks
                .iter()
                .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect();

            if texts.len() == blocks.len() && !blocks.is_empty() {
                return RawContent::Text {
                    text: texts.join("\n"),
                };
            }

            if blocks.len() == 1 {
                if let Some(data) = blocks[0].get("data").and_then(|d| d.as_str()) {
                    return RawContent::Binary {
                        data: data.to_string(),
                        mime_type: blocks[0]
                            .get("mimeType")
                            .and_then(|m| m.as_str())
                            .map(|s| s.to_string()),
                    };
                }
            }

            return RawContent::Structured {
                value: serde_json::Value::Array(blocks.clone()),
            };
        }

        match result {
            serde_json::Value::String(text) => RawContent::Text { text },
            other => RawContent::Structured { value: other },
        }
    }

    /// Human-readable rendering for the caller-facing trace.
    pub fn display(&self) -> String {
        match self {
            RawContent::Text { text } => text.clone(),
            RawContent::Structured { value } => {
                serde_json::to_string(value).unwrap_or_else(|_| "<unserializable>".to_string())
            }
            RawContent::Binary { data, mime_type } => format!(
                "<binary {} ({} base64 bytes)>",
                mime_type.as_deref().unwrap_or("application/octet-stream"),
                data.len()
            ),
        }
    }

    /// JSON form used when the result is serialized into a model-bound message.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            RawContent::Text { text } => serde_json::Value::String(text.clone()),
            RawContent::Structured { value } => value.clone(),
            RawContent::Binary { data, mime_type } => serde_json::json!({
                "data": data,
                "mime_type": mime_type,
            }),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_split_tool_id() {
        let id = join_tool_id("filesystem", "read_file");
        assert_eq!(id, "filesystem__read_file");
        assert_eq!(split_tool_id(&id), Some(("filesystem", "read_file")));
    }

    #[test]
    fn test_split_tool_id_tool_may_contain_separator() {
        assert_eq!(
            split_tool_id("search__deep__lookup"),
            Some(("search", "deep__lookup"))
        );
    }

    #[test]
    fn test_split_tool_id_rejects_malformed() {
        assert_eq!(split_tool_id("no_separator"), None);
        assert_eq!(split_tool_id("__tool"), None);
        assert_eq!(split_tool_id("server__"), None);
        assert_eq!(split_tool_id(""), None);
    }

    #[test]
    fn test_json_rpc_request_serialization() {
        let req = JsonRpcRequest::new(1, "initialize", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"initialize\""));
        // params should be omitted when None
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_json_rpc_error_response() {
        let json = r#"{
            "jsonrpc": "2.0",
            "id": 2,
            "result": null,
            "error": {"code": -32601, "message": "Method not found"}
        }"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, -32601);
    }

    #[test]
    fn test_server_descriptor_stdio_from_yaml() {
        let yaml = r#"
name: filesystem
transport: stdio
command: python3
args: ["-m", "server"]
env:
  API_KEY: abc
send_result_to_ai: true
"#;
        let desc: ServerDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(desc.name, "filesystem");
        assert!(desc.auto_connect, "auto_connect defaults to true");
        assert_eq!(desc.send_result_to_ai, Some(true));
        match desc.kind {
            ConnectionKind::Stdio { command, args, env } => {
                assert_eq!(command, "python3");
                assert_eq!(args, vec!["-m", "server"]);
                assert_eq!(env.get("API_KEY").map(String::as_str), Some("abc"));
            }
            _ => panic!("expected stdio kind"),
        }
    }

    #[test]
    fn test_server_descriptor_sse_from_yaml() {
        let yaml = r#"
name: search
transport: sse
url: http://localhost:8931/sse
auto_connect: false
"#;
        let desc: ServerDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert!(!desc.auto_connect);
        assert_eq!(desc.send_result_to_ai, None);
        assert!(matches!(desc.kind, ConnectionKind::Sse { ref url } if url.ends_with("/sse")));
    }

    #[test]
    fn test_tool_descriptor_input_schema_alias() {
        let json = r#"{"name": "read_file", "description": "Read a file",
                       "inputSchema": {"type": "object"}}"#;
        let tool: ToolDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn test_raw_content_resolves_text_blocks() {
        let result = serde_json::json!({
            "content": [
                {"type": "text", "text": "line one"},
                {"type": "text", "text": "line two"}
            ]
        });
        assert_eq!(
            RawContent::resolve(result),
            RawContent::Text {
                text: "line one\nline two".to_string()
            }
        );
    }

    #[test]
    fn test_raw_content_resolves_blob_block() {
        let result = serde_json::json!({
            "content": [{"type": "image", "data": "aGVsbG8=", "mimeType": "image/png"}]
        });
        match RawContent::resolve(result) {
            RawContent::Binary { data, mime_type } => {
                assert_eq!(data, "aGVsbG8=");
                assert_eq!(mime_type.as_deref(), Some("image/png"));
            }
            other => panic!("expected binary, got {other:?}"),
        }
    }

    #[test]
    fn test_raw_content_resolves_bare_values() {
        assert_eq!(
            RawContent::resolve(serde_json::json!("plain")),
            RawContent::Text {
                text: "plain".to_string()
            }
        );
        assert!(matches!(
            RawContent::resolve(serde_json::json!({"rows": [1, 2]})),
            RawContent::Structured { .. }
        ));
    }

    #[test]
    fn test_raw_content_display_binary_is_summarized() {
        let content = RawContent::Binary {
            data: "aGVsbG8=".to_string(),
            mime_type: Some("image/png".to_string()),
        };
        let shown = content.display();
        assert!(shown.contains("image/png"));
        assert!(!shown.contains("aGVsbG8="), "blob payload must not be dumped");
    }
}
