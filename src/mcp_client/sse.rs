//! JSON-RPC over a streamed-event HTTP connection.
//!
//! The server holds one persistent `text/event-stream` response open per
//! client. The first event announces the POST endpoint for requests; every
//! JSON-RPC response then arrives as a `message` event on the stream and is
//! correlated back to its request by id.

use std::collections::HashMap;
use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use tokio::sync::Mutex;

use super::errors::McpError;
use super::transport::next_request_id;
use super::types::{JsonRpcRequest, JsonRpcResponse};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout for the event stream and request POSTs.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for the server to announce its request endpoint.
const ENDPOINT_TIMEOUT: Duration = Duration::from_secs(10);

// ─── SSE Event Parsing ───────────────────────────────────────────────────────

/// One parsed server-sent event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    /// Event type from the `event:` field; defaults to `"message"`.
    pub event: String,
    /// Concatenated `data:` lines.
    pub data: String,
}

/// Parse a single raw SSE event block (the text between blank lines).
///
/// Returns `None` for comment-only or empty blocks (keep-alives).
fn parse_sse_event(raw: &str) -> Option<SseEvent> {
    let mut event = "message".to_string();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in raw.lines() {
        if line.starts_with(':') {
            continue; // comment / keep-alive
        }
        if let Some(value) = line.strip_prefix("event:") {
            event = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    if data_lines.is_empty() {
        return None;
    }

    Some(SseEvent {
        event,
        data: data_lines.join("\n"),
    })
}

/// Resolve the announced endpoint (absolute or relative) against the stream URL.
fn resolve_endpoint(base: &str, announced: &str) -> Result<String, String> {
    let base_url = reqwest::Url::parse(base).map_err(|e| format!("bad base url: {e}"))?;
    let resolved = base_url
        .join(announced)
        .map_err(|e| format!("bad endpoint '{announced}': {e}"))?;
    Ok(resolved.to_string())
}

// ─── Event Stream Reader ─────────────────────────────────────────────────────

/// Pull-based reader over the persistent event stream.
///
/// Buffers raw bytes until a full event block (`…\n\n`) is available, then
/// parses it. Incomplete blocks survive across network chunk boundaries.
struct SseEventStream {
    bytes: BoxStream<'static, Result<Vec<u8>, String>>,
    buffer: String,
}

impl SseEventStream {
    fn new(response: reqwest::Response) -> Self {
        let bytes = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|b| b.to_vec())
                    .map_err(|e| format!("stream read error: {e}"))
            })
            .boxed();
        Self {
            bytes,
            buffer: String::new(),
        }
    }

    /// Read the next parsed event; `Ok(None)` means the stream ended.
    async fn next_event(&mut self) -> Result<Option<SseEvent>, String> {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let raw = self.buffer[..end].to_string();
                self.buffer.drain(..end + 2);
                match parse_sse_event(&raw) {
                    Some(event) => return Ok(Some(event)),
                    None => continue,
                }
            }

            match self.bytes.next().await {
                Some(Ok(chunk)) => {
                    self.buffer.push_str(&String::from_utf8_lossy(&chunk));
                }
                Some(Err(reason)) => return Err(reason),
                None => {
                    // Stream ended — flush any trailing unterminated block.
                    let trailing = std::mem::take(&mut self.buffer);
                    if !trailing.trim().is_empty() {
                        return Ok(parse_sse_event(trailing.trim()));
                    }
                    return Ok(None);
                }
            }
        }
    }
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// Bi-directional JSON-RPC transport over a persistent event stream.
pub struct SseTransport {
    server_name: String,
    http: reqwest::Client,
    /// POST target announced by the server on connect.
    endpoint: String,
    stream: Mutex<SseEventStream>,
    /// Responses read off the stream while waiting for a different id.
    pending: Mutex<HashMap<u64, JsonRpcResponse>>,
}

impl SseTransport {
    /// Open the event stream and wait for the server's endpoint announcement.
    pub async fn connect(server_name: &str, url: &str) -> Result<Self, McpError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| McpError::Connection {
                name: server_name.to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let response = http
            .get(url)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| McpError::Connection {
                name: server_name.to_string(),
                reason: format!("event stream request failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(McpError::Connection {
                name: server_name.to_string(),
                reason: format!("event stream returned HTTP {}", response.status()),
            });
        }

        let mut stream = SseEventStream::new(response);

        let first = tokio::time::timeout(ENDPOINT_TIMEOUT, stream.next_event())
            .await
            .map_err(|_| McpError::Connection {
                name: server_name.to_string(),
                reason: format!(
                    "no endpoint announcement within {}s",
                    ENDPOINT_TIMEOUT.as_secs()
                ),
            })?
            .map_err(|reason| McpError::Connection {
                name: server_name.to_string(),
                reason,
            })?;

        let endpoint = match first {
            Some(event) if event.event == "endpoint" => {
                resolve_endpoint(url, &event.data).map_err(|reason| McpError::Connection {
                    name: server_name.to_string(),
                    reason,
                })?
            }
            Some(event) => {
                return Err(McpError::Connection {
                    name: server_name.to_string(),
                    reason: format!("expected endpoint announcement, got '{}' event", event.event),
                });
            }
            None => {
                return Err(McpError::Connection {
                    name: server_name.to_string(),
                    reason: "event stream closed before endpoint announcement".into(),
                });
            }
        };

        Ok(Self {
            server_name: server_name.to_string(),
            http,
            endpoint,
            stream: Mutex::new(stream),
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Send a JSON-RPC request and wait for the matching `message` event.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let req = JsonRpcRequest::new(id, method, params);
        self.post(&serde_json::to_value(&req).map_err(|e| McpError::Protocol {
            server: self.server_name.clone(),
            reason: format!("failed to serialize request: {e}"),
        })?)
        .await?;

        loop {
            // Another request may have already read our response off the stream.
            if let Some(resp) = self.pending.lock().await.remove(&id) {
                return Ok(resp);
            }

            let mut stream = self.stream.lock().await;

            if let Some(resp) = self.pending.lock().await.remove(&id) {
                return Ok(resp);
            }

            let event = stream
                .next_event()
                .await
                .map_err(|reason| McpError::Protocol {
                    server: self.server_name.clone(),
                    reason,
                })?;

            match event {
                Some(event) if event.event == "message" => {
                    match serde_json::from_str::<JsonRpcResponse>(&event.data) {
                        Ok(resp) if resp.id == id => return Ok(resp),
                        Ok(resp) => {
                            self.pending.lock().await.insert(resp.id, resp);
                        }
                        // Server-to-client notifications have no id; skip.
                        Err(_) => continue,
                    }
                }
                Some(_) => continue,
                None => {
                    return Err(McpError::Protocol {
                        server: self.server_name.clone(),
                        reason: "event stream closed while awaiting response".into(),
                    });
                }
            }
        }
    }

    /// Send a JSON-RPC notification (no id, no response expected).
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
        self.post(&notification).await
    }

    async fn post(&self, body: &serde_json::Value) -> Result<(), McpError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| McpError::Protocol {
                server: self.server_name.clone(),
                reason: format!("request POST failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(McpError::Protocol {
                server: self.server_name.clone(),
                reason: format!("request POST returned HTTP {}", response.status()),
            });
        }

        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_event_defaults_to_message() {
        let event = parse_sse_event("data: {\"id\":1}").unwrap();
        assert_eq!(event.event, "message");
        assert_eq!(event.data, "{\"id\":1}");
    }

    #[test]
    fn test_parse_sse_event_named() {
        let event = parse_sse_event("event: endpoint\ndata: /rpc?session=abc").unwrap();
        assert_eq!(event.event, "endpoint");
        assert_eq!(event.data, "/rpc?session=abc");
    }

    #[test]
    fn test_parse_sse_event_multi_data_lines() {
        let event = parse_sse_event("data: first\ndata: second").unwrap();
        assert_eq!(event.data, "first\nsecond");
    }

    #[test]
    fn test_parse_sse_event_skips_comments_and_empty() {
        assert_eq!(parse_sse_event(": keep-alive"), None);
        assert_eq!(parse_sse_event(""), None);
        assert_eq!(parse_sse_event("event: ping"), None);
    }

    #[test]
    fn test_parse_sse_event_without_space_after_colon() {
        let event = parse_sse_event("data:payload").unwrap();
        assert_eq!(event.data, "payload");
    }

    #[test]
    fn test_resolve_endpoint_relative() {
        let resolved = resolve_endpoint("http://localhost:8931/sse", "/rpc?session=1").unwrap();
        assert_eq!(resolved, "http://localhost:8931/rpc?session=1");
    }

    #[test]
    fn test_resolve_endpoint_absolute() {
        let resolved =
            resolve_endpoint("http://localhost:8931/sse", "http://other:9000/rpc").unwrap();
        assert_eq!(resolved, "http://other:9000/rpc");
    }

    #[test]
    fn test_resolve_endpoint_bad_base() {
        assert!(resolve_endpoint("not a url", "/rpc").is_err());
    }

    #[tokio::test]
    async fn test_event_stream_reassembles_split_chunks() {
        // An event split across two network chunks must parse once complete.
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"event: message\nda".to_vec()),
            Ok(b"ta: {\"id\":7}\n\n".to_vec()),
        ];
        let mut stream = SseEventStream {
            bytes: futures::stream::iter(chunks).boxed(),
            buffer: String::new(),
        };

        let event = stream.next_event().await.unwrap().unwrap();
        assert_eq!(event.event, "message");
        assert_eq!(event.data, "{\"id\":7}");
        assert!(stream.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_event_stream_flushes_unterminated_tail() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![Ok(b"data: tail".to_vec())];
        let mut stream = SseEventStream {
            bytes: futures::stream::iter(chunks).boxed(),
            buffer: String::new(),
        };

        let event = stream.next_event().await.unwrap().unwrap();
        assert_eq!(event.data, "tail");
    }
}
