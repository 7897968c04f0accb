//! JSON-RPC over stdio transport.
//!
//! Handles low-level communication with spawned tool-server processes:
//! - Writing JSON-RPC requests to stdin
//! - Reading JSON-RPC responses from stdout
//! - Line-delimited JSON protocol (one JSON object per line)

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use super::errors::McpError;
use super::types::{JsonRpcRequest, JsonRpcResponse};

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Global monotonic request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Spawning ────────────────────────────────────────────────────────────────

/// Expand a leading `~/` (or bare `~`) in an argument string to the home
/// directory. Non-tilde arguments pass through unchanged.
pub fn expand_home(arg: &str) -> String {
    let Some(home) = dirs::home_dir() else {
        return arg.to_string();
    };
    if arg == "~" {
        return home.display().to_string();
    }
    if let Some(rest) = arg.strip_prefix("~/") {
        return home.join(rest).display().to_string();
    }
    arg.to_string()
}

/// Spawn a tool-server child process wired for line-delimited JSON-RPC.
///
/// Argument strings get home-directory expansion. The child inherits the
/// parent environment, with the server's own `env` entries layered on top
/// (server values win on key collisions).
pub fn spawn_server_process(
    name: &str,
    command: &str,
    args: &[String],
    env: &HashMap<String, String>,
) -> Result<(Child, StdioTransport), McpError> {
    let mut cmd = Command::new(command);
    cmd.args(args.iter().map(|a| expand_home(a)));

    for (key, value) in env {
        cmd.env(key, value);
    }

    cmd.stdin(std::process::Stdio::piped());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::null());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| McpError::Connection {
        name: name.to_string(),
        reason: format!("spawn failed: {e}"),
    })?;

    let stdin = child.stdin.take().ok_or(McpError::Connection {
        name: name.to_string(),
        reason: "failed to capture stdin".into(),
    })?;

    let stdout = child.stdout.take().ok_or(McpError::Connection {
        name: name.to_string(),
        reason: "failed to capture stdout".into(),
    })?;

    Ok((child, StdioTransport::new(name, stdin, stdout)))
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// Bi-directional JSON-RPC transport over a child process's stdio.
pub struct StdioTransport {
    server_name: String,
    writer: Mutex<ChildStdin>,
    reader: Mutex<BufReader<ChildStdout>>,
    /// Responses read off the pipe while waiting for a different id.
    /// Lets two in-flight requests to the same server interleave safely.
    pending: Mutex<HashMap<u64, JsonRpcResponse>>,
}

impl StdioTransport {
    /// Create a new transport from a child process's stdin/stdout.
    pub fn new(server_name: &str, stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self {
            server_name: server_name.to_string(),
            writer: Mutex::new(stdin),
            reader: Mutex::new(BufReader::new(stdout)),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Send a JSON-RPC request and wait for the matching response.
    ///
    /// Write one line of JSON, then read lines until the response with our
    /// `id` shows up. Responses for other in-flight requests are stashed for
    /// their owners rather than dropped.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let req = JsonRpcRequest::new(id, method, params);

        let mut json = serde_json::to_string(&req).map_err(|e| McpError::Protocol {
            server: self.server_name.clone(),
            reason: format!("failed to serialize request: {e}"),
        })?;
        json.push('\n');

        {
            let mut writer = self.writer.lock().await;
            writer
                .write_all(json.as_bytes())
                .await
                .map_err(|e| McpError::Protocol {
                    server: self.server_name.clone(),
                    reason: format!("failed to write to stdin: {e}"),
                })?;
            writer.flush().await.map_err(|e| McpError::Protocol {
                server: self.server_name.clone(),
                reason: format!("failed to flush stdin: {e}"),
            })?;
        }

        let mut line_buf = String::new();

        loop {
            // Another request may have already read our response off the pipe.
            if let Some(resp) = self.pending.lock().await.remove(&id) {
                return Ok(resp);
            }

            let mut reader = self.reader.lock().await;

            // Re-check after acquiring the lock: the previous holder may have
            // stashed our response between the check above and the lock.
            if let Some(resp) = self.pending.lock().await.remove(&id) {
                return Ok(resp);
            }

            line_buf.clear();
            let bytes_read =
                reader
                    .read_line(&mut line_buf)
                    .await
                    .map_err(|e| McpError::Protocol {
                        server: self.server_name.clone(),
                        reason: format!("failed to read from stdout: {e}"),
                    })?;

            if bytes_read == 0 {
                return Err(McpError::Protocol {
                    server: self.server_name.clone(),
                    reason: "server stdout closed (process may have exited)".into(),
                });
            }

            let trimmed = line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.id == id => return Ok(resp),
                Ok(resp) => {
                    self.pending.lock().await.insert(resp.id, resp);
                }
                Err(_) => {
                    // Not a JSON-RPC response — could be server log output.
                    // Skip and keep reading.
                    continue;
                }
            }
        }
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });

        let mut json =
            serde_json::to_string(&notification).map_err(|e| McpError::Protocol {
                server: self.server_name.clone(),
                reason: format!("failed to serialize notification: {e}"),
            })?;
        json.push('\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| McpError::Protocol {
                server: self.server_name.clone(),
                reason: format!("failed to write notification: {e}"),
            })?;
        writer.flush().await.map_err(|e| McpError::Protocol {
            server: self.server_name.clone(),
            reason: format!("failed to flush notification: {e}"),
        })?;

        Ok(())
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting protocol-level
/// errors into an `Invocation` error against the given server/tool pair.
pub fn extract_result(
    response: JsonRpcResponse,
    server: &str,
    tool: &str,
) -> Result<serde_json::Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::Invocation {
            server: server.to_string(),
            tool: tool.to_string(),
            reason: format!("[{}] {}", err.code, err.message),
        });
    }

    response.result.ok_or(McpError::Protocol {
        server: server.to_string(),
        reason: "response missing both result and error".into(),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_request_id_is_monotonic() {
        let id1 = next_request_id();
        let id2 = next_request_id();
        assert!(id2 > id1);
    }

    #[test]
    fn test_expand_home_prefix() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(
            expand_home("~/data/store"),
            home.join("data/store").display().to_string()
        );
        assert_eq!(expand_home("~"), home.display().to_string());
    }

    #[test]
    fn test_expand_home_leaves_other_args_alone() {
        assert_eq!(expand_home("--verbose"), "--verbose");
        assert_eq!(expand_home("/absolute/path"), "/absolute/path");
        // Mid-string tildes are not home references
        assert_eq!(expand_home("a~b"), "a~b");
    }

    #[test]
    fn test_extract_result_success() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 1,
            result: Some(serde_json::json!({"text": "hello"})),
            error: None,
        };
        let result = extract_result(resp, "fs", "read_file").unwrap();
        assert_eq!(result["text"], "hello");
    }

    #[test]
    fn test_extract_result_error_becomes_invocation() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 1,
            result: None,
            error: Some(super::super::types::JsonRpcError {
                code: -32601,
                message: "Method not found".into(),
                data: None,
            }),
        };
        let err = extract_result(resp, "fs", "read_file").unwrap_err();
        match err {
            McpError::Invocation { server, tool, reason } => {
                assert_eq!(server, "fs");
                assert_eq!(tool, "read_file");
                assert!(reason.contains("-32601"));
            }
            _ => panic!("expected Invocation"),
        }
    }

    #[test]
    fn test_extract_result_missing_both() {
        let resp = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 1,
            result: None,
            error: None,
        };
        let err = extract_result(resp, "fs", "read_file").unwrap_err();
        assert!(matches!(err, McpError::Protocol { .. }));
    }
}
