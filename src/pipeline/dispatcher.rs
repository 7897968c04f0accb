//! Tool dispatcher — executes one model turn's tool calls.
//!
//! Every call in a batch runs concurrently and settles independently; the
//! batch recombines in request order once all calls finish. A failing call
//! is converted into a trace line (and, policy permitting, a model-bound
//! error payload) — it never aborts its siblings or the query.

use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;

use crate::config::PolicyResolver;
use crate::mcp_client::{split_tool_id, McpError, ToolBackend};
use crate::model::types::{ChatMessage, ToolCallRequest};
use crate::observer::PipelineObserver;

use super::response::{validate_tool_response, NormalizedToolResponse};
use super::transform::TransformerRegistry;

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Per-call failure. Recoverable by construction: the dispatcher converts
/// each into trace output instead of propagating it.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The identifier did not split into `server__tool`.
    #[error("malformed tool identifier '{tool_id}'")]
    MalformedIdentifier { tool_id: String },

    /// The call's argument payload was not valid JSON.
    #[error("invalid arguments for '{tool_id}': {reason}")]
    ArgumentParse { tool_id: String, reason: String },

    /// The invocation itself failed (not connected, protocol, server error).
    #[error(transparent)]
    Mcp(#[from] McpError),
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// The settled result of one dispatched tool call.
#[derive(Debug)]
pub struct ToolCallOutcome {
    /// Correlation id from the model's request.
    pub call_id: String,
    /// Qualified tool identifier as requested.
    pub tool_id: String,
    /// Caller-facing trace lines; produced on success and failure alike.
    pub lines: Vec<String>,
    /// Tool-role message for the second model call, when policy sends it.
    pub model_message: Option<ChatMessage>,
    /// The failure, when the call did not succeed.
    pub error: Option<DispatchError>,
}

impl ToolCallOutcome {
    /// Whether the call executed successfully.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// What a successful call produced for the two downstream audiences.
struct CallProduct {
    lines: Vec<String>,
    payload: serde_json::Value,
}

// ─── Dispatch ────────────────────────────────────────────────────────────────

/// Dispatch a batch of model-requested tool calls concurrently.
///
/// Fan-out/fan-in: all calls start together and the batch waits for every
/// call to settle. Outcomes come back in request order regardless of
/// completion order.
pub async fn dispatch_tool_calls(
    calls: &[ToolCallRequest],
    backend: &dyn ToolBackend,
    policies: &PolicyResolver,
    transformers: &TransformerRegistry,
    observer: &dyn PipelineObserver,
    call_timeout: Option<Duration>,
) -> Vec<ToolCallOutcome> {
    join_all(calls.iter().map(|call| {
        dispatch_single(call, backend, policies, transformers, observer, call_timeout)
    }))
    .await
}

/// Execute one tool call end-to-end: route, invoke, transform, and decide
/// whether the result goes back to the model.
async fn dispatch_single(
    call: &ToolCallRequest,
    backend: &dyn ToolBackend,
    policies: &PolicyResolver,
    transformers: &TransformerRegistry,
    observer: &dyn PipelineObserver,
    call_timeout: Option<Duration>,
) -> ToolCallOutcome {
    observer.dispatch_started(&call.name, &call.id);

    let executed = execute_call(call, backend, policies, transformers, call_timeout).await;

    // The send-to-model decision follows the same precedence for successes
    // and failures, resolved fresh for every call.
    let send_to_ai = policies.resolve_send_to_ai(&call.name);

    let outcome = match executed {
        Ok(product) => ToolCallOutcome {
            call_id: call.id.clone(),
            tool_id: call.name.clone(),
            model_message: send_to_ai
                .then(|| ChatMessage::tool_result(&call.id, &product.payload)),
            lines: product.lines,
            error: None,
        },
        Err(error) => {
            let line = format!("[{}] ERROR: {error}", call.name);
            let model_message = send_to_ai.then(|| {
                ChatMessage::tool_result(
                    &call.id,
                    &serde_json::json!({"error": error.to_string()}),
                )
            });
            ToolCallOutcome {
                call_id: call.id.clone(),
                tool_id: call.name.clone(),
                lines: vec![line],
                model_message,
                error: Some(error),
            }
        }
    };

    observer.dispatch_finished(&call.name, &call.id, outcome.succeeded());
    outcome
}

/// Route and invoke one call, returning its trace lines and model payload.
async fn execute_call(
    call: &ToolCallRequest,
    backend: &dyn ToolBackend,
    policies: &PolicyResolver,
    transformers: &TransformerRegistry,
    call_timeout: Option<Duration>,
) -> Result<CallProduct, DispatchError> {
    let (server, tool) =
        split_tool_id(&call.name).ok_or_else(|| DispatchError::MalformedIdentifier {
            tool_id: call.name.clone(),
        })?;

    let args = parse_arguments(&call.name, &call.arguments)?;

    let invocation = backend.invoke(server, tool, args);
    let raw = match call_timeout {
        Some(limit) => tokio::time::timeout(limit, invocation)
            .await
            .map_err(|_| McpError::Timeout {
                server: server.to_string(),
                tool: tool.to_string(),
                timeout_ms: limit.as_millis() as u64,
            })??,
        None => invocation.await?,
    };

    let transformer = policies
        .resolve_config(&call.name)
        .and_then(|policy| policy.transformer.as_deref())
        .and_then(|name| match transformers.get(name) {
            Some(t) => Some(t),
            None => {
                tracing::warn!(
                    tool = %call.name,
                    transformer = name,
                    "configured transformer is not registered; passing raw result through"
                );
                None
            }
        });

    match transformer {
        Some(transformer) => {
            let normalized = validate_tool_response(transformer.transform(&raw).await);
            Ok(CallProduct {
                lines: render_normalized(&call.name, &normalized),
                payload: normalized.to_json(),
            })
        }
        None => Ok(CallProduct {
            lines: vec![format!("[{}] {}", call.name, raw.display())],
            payload: raw.to_json(),
        }),
    }
}

/// Parse the call's serialized argument payload into structured data.
///
/// An empty payload means "no arguments"; anything else must be valid JSON.
fn parse_arguments(tool_id: &str, raw: &str) -> Result<serde_json::Value, DispatchError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(trimmed).map_err(|e| DispatchError::ArgumentParse {
        tool_id: tool_id.to_string(),
        reason: e.to_string(),
    })
}

/// Trace lines for a transformed result: the summary line plus one line per
/// reported artifact.
fn render_normalized(tool_id: &str, normalized: &NormalizedToolResponse) -> Vec<String> {
    let mut lines = vec![format!("[{tool_id}] {}", normalized.message)];

    let mut artifacts: Vec<(&String, &String)> = normalized.paths.iter().collect();
    artifacts.sort();
    for (name, location) in artifacts {
        lines.push(format!("[{tool_id}] saved {name} -> {location}"));
    }

    lines
}

// ─── Tests ───────────────────────────────────────────────────────────────────
