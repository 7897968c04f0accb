//! Pipeline observability hooks.
//!
//! Lifecycle logging goes through a collaborator invoked at defined
//! extension points instead of being sprinkled through the control flow,
//! so the state machine stays testable with a no-op observer.

use crate::mcp_client::McpError;

/// Which of the two model calls in a query is being made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelCallPhase {
    /// The tool-eligible first call.
    First,
    /// The answer-only summarization call.
    Second,
}

impl ModelCallPhase {
    fn label(&self) -> &'static str {
        match self {
            ModelCallPhase::First => "first",
            ModelCallPhase::Second => "second",
        }
    }
}

/// Extension points the pipeline reports into.
///
/// All methods default to no-ops so implementations only override what
/// they care about.
pub trait PipelineObserver: Send + Sync {
    /// A server session was established.
    fn server_connected(&self, _server: &str) {}

    /// A fleet-connect attempt failed (the batch continues).
    fn connect_failed(&self, _server: &str, _error: &McpError) {}

    /// A tool call is about to execute.
    fn dispatch_started(&self, _tool_id: &str, _call_id: &str) {}

    /// A tool call settled.
    fn dispatch_finished(&self, _tool_id: &str, _call_id: &str, _success: bool) {}

    /// A model call is about to be issued.
    fn model_call_started(&self, _phase: ModelCallPhase) {}

    /// A model call returned.
    fn model_call_finished(&self, _phase: ModelCallPhase, _success: bool) {}
}

/// Observer that does nothing. Used by tests exercising the pure pipeline.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Observer that emits structured `tracing` events.
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn server_connected(&self, server: &str) {
        tracing::info!(server, "server connected");
    }

    fn connect_failed(&self, server: &str, error: &McpError) {
        tracing::warn!(server, error = %error, "server connection failed");
    }

    fn dispatch_started(&self, tool_id: &str, call_id: &str) {
        tracing::info!(tool = tool_id, call_id, "tool dispatch started");
    }

    fn dispatch_finished(&self, tool_id: &str, call_id: &str, success: bool) {
        tracing::info!(tool = tool_id, call_id, success, "tool dispatch finished");
    }

    fn model_call_started(&self, phase: ModelCallPhase) {
        tracing::info!(phase = phase.label(), "model call started");
    }

    fn model_call_finished(&self, phase: ModelCallPhase, success: bool) {
        tracing::info!(phase = phase.label(), success, "model call finished");
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
