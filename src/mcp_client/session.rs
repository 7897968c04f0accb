//! Sessions and the session registry.
//!
//! A `Session` pairs a server name with a live transport after a successful
//! `initialize` handshake. The `SessionRegistry` owns every session, keyed
//! by server name, and is the single place tool discovery and invocation
//! go through. A server without a session is simply "not connected" — a
//! normal state, not an error.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::process::Child;

use crate::observer::PipelineObserver;

use super::errors::McpError;
use super::sse::SseTransport;
use super::transport::{self, spawn_server_process, StdioTransport};
use super::types::{
    join_tool_id, ConnectionKind, InitializeResult, JsonRpcResponse, ListToolsResult,
    RawContent, ServerDescriptor, ServerInfo, ToolDescriptor,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for the initialize handshake.
const INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for graceful child-process shutdown before force-killing.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Transport ───────────────────────────────────────────────────────────────

/// The two transport kinds behind one request/notify surface.
pub enum Transport {
    Stdio(StdioTransport),
    Sse(SseTransport),
}

impl Transport {
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        match self {
            Transport::Stdio(t) => t.request(method, params).await,
            Transport::Sse(t) => t.request(method, params).await,
        }
    }

    async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        match self {
            Transport::Stdio(t) => t.notify(method, params).await,
            Transport::Sse(t) => t.notify(method, params).await,
        }
    }
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// A live connection to one tool server.
pub struct Session {
    /// Server name (the registry key).
    pub name: String,
    transport: Transport,
    /// Child handle for spawned-process servers; `None` for endpoints.
    process: Option<Child>,
    /// Identity the server reported during the handshake.
    pub server_info: Option<ServerInfo>,
}

impl Session {
    /// Connect a transport per the descriptor and run the handshake.
    pub async fn establish(descriptor: &ServerDescriptor) -> Result<Self, McpError> {
        let (transport, process) = match &descriptor.kind {
            ConnectionKind::Stdio { command, args, env } => {
                let (child, stdio) =
                    spawn_server_process(&descriptor.name, command, args, env)?;
                (Transport::Stdio(stdio), Some(child))
            }
            ConnectionKind::Sse { url } => {
                let sse = SseTransport::connect(&descriptor.name, url).await?;
                (Transport::Sse(sse), None)
            }
        };

        let mut session = Session {
            name: descriptor.name.clone(),
            transport,
            process,
            server_info: None,
        };

        match tokio::time::timeout(INIT_TIMEOUT, session.initialize()).await {
            Ok(Ok(info)) => {
                session.server_info = info;
            }
            Ok(Err(e)) => {
                session.close().await;
                return Err(McpError::Connection {
                    name: descriptor.name.clone(),
                    reason: format!("handshake failed: {e}"),
                });
            }
            Err(_) => {
                session.close().await;
                return Err(McpError::Connection {
                    name: descriptor.name.clone(),
                    reason: format!("handshake timed out after {}s", INIT_TIMEOUT.as_secs()),
                });
            }
        }

        Ok(session)
    }

    /// Perform the `initialize` handshake.
    async fn initialize(&self) -> Result<Option<ServerInfo>, McpError> {
        let params = serde_json::json!({
            "clientInfo": {
                "name": "toolbridge",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {},
        });

        let response = self.transport.request("initialize", Some(params)).await?;
        let result = transport::extract_result(response, &self.name, "initialize")?;

        let init: InitializeResult =
            serde_json::from_value(result).map_err(|e| McpError::Protocol {
                server: self.name.clone(),
                reason: format!("failed to parse initialize response: {e}"),
            })?;

        Ok(init.server_info)
    }

    /// Fetch this server's tool catalog.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        let response = self.transport.request("tools/list", None).await?;
        let result = transport::extract_result(response, &self.name, "tools/list")?;

        let listed: ListToolsResult =
            serde_json::from_value(result).map_err(|e| McpError::Protocol {
                server: self.name.clone(),
                reason: format!("failed to parse tools/list response: {e}"),
            })?;

        Ok(listed.tools)
    }

    /// Invoke a tool and resolve its output into `RawContent`.
    pub async fn invoke(
        &self,
        tool: &str,
        args: serde_json::Value,
    ) -> Result<RawContent, McpError> {
        let params = serde_json::json!({
            "name": tool,
            "arguments": args,
        });

        let response = self.transport.request("tools/call", Some(params)).await?;
        let result = transport::extract_result(response, &self.name, tool)?;

        // Some servers report tool-level failure in-band instead of via a
        // JSON-RPC error object.
        if result.get("isError").and_then(|e| e.as_bool()) == Some(true) {
            let reason = RawContent::resolve(result).display();
            return Err(McpError::Invocation {
                server: self.name.clone(),
                tool: tool.to_string(),
                reason,
            });
        }

        Ok(RawContent::resolve(result))
    }

    /// Release the transport; for spawned servers, try a graceful exit first.
    pub async fn close(&mut self) {
        if let Some(process) = self.process.as_mut() {
            let _ = self.transport.notify("shutdown", None).await;
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, process.wait()).await {
                Ok(Ok(_)) => {}
                _ => {
                    let _ = process.kill().await;
                }
            }
        }
        // Endpoint transports close when the stream is dropped.
    }
}

// ─── ToolBackend ─────────────────────────────────────────────────────────────

/// Discovery-and-invocation surface the pipeline depends on.
///
/// The registry is the production implementation; tests substitute their own.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// Number of servers with a live session.
    fn connected_count(&self) -> usize;

    /// Whether a named server has a live session.
    fn is_connected(&self, server: &str) -> bool;

    /// Model-facing catalog across every connected server (best-effort).
    async fn list_available_tools(&self) -> Vec<ToolDescriptor>;

    /// Invoke a bare tool name on a named server.
    async fn invoke(
        &self,
        server: &str,
        tool: &str,
        args: serde_json::Value,
    ) -> Result<RawContent, McpError>;
}

// ─── SessionRegistry ─────────────────────────────────────────────────────────

/// Owns one live `Session` per connected server name.
///
/// Connect/close mutate the map and are expected to be serialized by the
/// caller; queries only read it.
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Connect one server, replacing any existing session for that name.
    pub async fn connect(&mut self, descriptor: &ServerDescriptor) -> Result<(), McpError> {
        let session = Session::establish(descriptor).await?;
        if let Some(mut old) = self.sessions.insert(descriptor.name.clone(), session) {
            old.close().await;
        }
        Ok(())
    }

    /// Connect every `auto_connect` descriptor, best-effort.
    ///
    /// Descriptors are attempted concurrently and independently: a failure is
    /// reported through the observer and the returned list, never propagated.
    /// The fleet is usable as long as at least one server connects.
    pub async fn connect_all(
        &mut self,
        descriptors: &[ServerDescriptor],
        observer: &dyn PipelineObserver,
    ) -> Vec<(String, McpError)> {
        let attempts = descriptors
            .iter()
            .filter(|d| d.auto_connect)
            .map(|d| async move { (d.name.clone(), Session::establish(d).await) });

        let mut failures = Vec::new();
        for (name, outcome) in join_all(attempts).await {
            match outcome {
                Ok(session) => {
                    observer.server_connected(&name);
                    if let Some(mut old) = self.sessions.insert(name, session) {
                        old.close().await;
                    }
                }
                Err(e) => {
                    observer.connect_failed(&name, &e);
                    failures.push((name, e));
                }
            }
        }

        failures
    }

    /// Names of all connected servers, sorted for deterministic output.
    pub fn connected_servers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Fetch the tool catalog of one named server.
    pub async fn list_tools(&self, server: &str) -> Result<Vec<ToolDescriptor>, McpError> {
        let session = self.sessions.get(server).ok_or(McpError::NotConnected {
            name: server.to_string(),
        })?;
        session.list_tools().await
    }

    /// Close one session; no-op when the server is not connected.
    pub async fn close(&mut self, server: &str) {
        if let Some(mut session) = self.sessions.remove(server) {
            session.close().await;
        }
    }

    /// Release every open session. Idempotent; a failure closing one
    /// transport never prevents closing the others.
    pub async fn close_all(&mut self) {
        for (_, mut session) in self.sessions.drain() {
            session.close().await;
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolBackend for SessionRegistry {
    fn connected_count(&self) -> usize {
        self.sessions.len()
    }

    fn is_connected(&self, server: &str) -> bool {
        self.sessions.contains_key(server)
    }

    /// Project every connected server's catalog into model-facing descriptors:
    /// qualified `server__tool` names, descriptions prefixed with the owning
    /// server (identically-named tools stay distinguishable), schemas passed
    /// through unmodified. A listing failure on one server is logged and
    /// skipped; discovery continues on the others.
    async fn list_available_tools(&self) -> Vec<ToolDescriptor> {
        let mut catalog = Vec::new();

        for name in self.connected_servers() {
            let session = &self.sessions[&name];
            match session.list_tools().await {
                Ok(tools) => {
                    for tool in tools {
                        catalog.push(ToolDescriptor {
                            name: join_tool_id(&name, &tool.name),
                            description: format!("[{name}] {}", tool.description),
                            input_schema: tool.input_schema,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(server = %name, error = %e, "tool listing failed; skipping server");
                }
            }
        }

        catalog
    }

    async fn invoke(
        &self,
        server: &str,
        tool: &str,
        args: serde_json::Value,
    ) -> Result<RawContent, McpError> {
        let session = self.sessions.get(server).ok_or(McpError::NotConnected {
            name: server.to_string(),
        })?;
        session.invoke(tool, args).await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
