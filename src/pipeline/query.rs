//! Query orchestrator — the top-level two-phase state machine.
//!
//! One query flows `Init → FirstModelCall → {DirectAnswer | ToolDispatch →
//! ResultAggregation → {SecondModelCall | Terminal}}`. The first model call
//! sees the current tool catalog; the second (entered only when at least one
//! tool result was policy-routed back to the model) is answer-only and gets
//! no catalog — at most one round of tool use per query.
//!
//! A model-call failure aborts the remaining steps of that query only. The
//! session registry is untouched and the orchestrator serves the next query
//! as if nothing happened.

use std::sync::Arc;
use std::time::Duration;

use crate::config::PolicyResolver;
use crate::mcp_client::ToolBackend;
use crate::model::types::ChatMessage;
use crate::model::ModelClient;
use crate::observer::{ModelCallPhase, PipelineObserver, TracingObserver};

use super::dispatcher::dispatch_tool_calls;
use super::errors::PipelineError;
use super::transform::TransformerRegistry;

// ─── QueryResult ─────────────────────────────────────────────────────────────

/// Everything one query produced.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Concatenated human-readable trace of the run.
    pub trace: String,
    /// The second model call's content, when one occurred and answered.
    pub final_response: Option<String>,
}

// ─── QueryOrchestrator ───────────────────────────────────────────────────────

/// Drives queries end-to-end against a tool backend.
///
/// The model client is an explicit constructor dependency — orchestrators
/// with different endpoints or credentials can coexist, and tests substitute
/// a scripted implementation.
pub struct QueryOrchestrator {
    model: Arc<dyn ModelClient>,
    policies: PolicyResolver,
    transformers: TransformerRegistry,
    observer: Arc<dyn PipelineObserver>,
    call_timeout: Option<Duration>,
}

impl QueryOrchestrator {
    /// Create an orchestrator with no transformers, tracing observability,
    /// and no per-call timeout.
    pub fn new(model: Arc<dyn ModelClient>, policies: PolicyResolver) -> Self {
        Self {
            model,
            policies,
            transformers: TransformerRegistry::new(),
            observer: Arc::new(TracingObserver),
            call_timeout: None,
        }
    }

    /// Attach the transformer registry tool policies refer to.
    pub fn with_transformers(mut self, transformers: TransformerRegistry) -> Self {
        self.transformers = transformers;
        self
    }

    /// Replace the observability collaborator.
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Bound each tool invocation; `None` lets calls wait indefinitely.
    pub fn with_call_timeout(mut self, call_timeout: Option<Duration>) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Run one query to completion.
    ///
    /// Rejects up front when zero servers are connected; every later failure
    /// mode yields a well-formed `QueryResult` instead of an error.
    pub async fn run(
        &self,
        backend: &dyn ToolBackend,
        query: &str,
    ) -> Result<QueryResult, PipelineError> {
        if backend.connected_count() == 0 {
            return Err(PipelineError::NoServersConnected);
        }

        // Init: seed the conversation with the user's query.
        let mut conversation = vec![ChatMessage::user(query)];

        // FirstModelCall: offer the current tool catalog.
        let catalog = backend.list_available_tools().await;
        self.observer.model_call_started(ModelCallPhase::First);
        let first = match self.model.complete(&conversation, Some(&catalog)).await {
            Ok(completion) => {
                self.observer
                    .model_call_finished(ModelCallPhase::First, true);
                completion
            }
            Err(e) => {
                self.observer
                    .model_call_finished(ModelCallPhase::First, false);
                return Ok(QueryResult {
                    trace: format!("model call failed: {e}"),
                    final_response: None,
                });
            }
        };
        conversation.push(ChatMessage::assistant(&first));

        // DirectAnswer: no tool calls — the reply text is the entire output.
        if first.tool_calls.is_empty() {
            return Ok(QueryResult {
                trace: first.content.unwrap_or_default(),
                final_response: None,
            });
        }

        // ToolDispatch: all requested calls, concurrently.
        let outcomes = dispatch_tool_calls(
            &first.tool_calls,
            backend,
            &self.policies,
            &self.transformers,
            self.observer.as_ref(),
            self.call_timeout,
        )
        .await;

        // ResultAggregation: trace lines in request order, plus whichever
        // tool-role messages the per-call policies produced.
        let mut lines: Vec<String> = Vec::new();
        if let Some(preamble) = &first.content {
            lines.push(preamble.clone());
        }

        let mut tool_messages: Vec<ChatMessage> = Vec::new();
        for outcome in outcomes {
            lines.extend(outcome.lines);
            if let Some(message) = outcome.model_message {
                tool_messages.push(message);
            }
        }

        // SecondModelCall: only when at least one result was routed back.
        // Answer-only — no catalog is offered.
        let mut final_response = None;
        if !tool_messages.is_empty() {
            conversation.extend(tool_messages);

            self.observer.model_call_started(ModelCallPhase::Second);
            match self.model.complete(&conversation, None).await {
                Ok(second) => {
                    self.observer
                        .model_call_finished(ModelCallPhase::Second, true);
                    if let Some(content) = second.content {
                        lines.push(content.clone());
                        final_response = Some(content);
                    }
                }
                Err(e) => {
                    self.observer
                        .model_call_finished(ModelCallPhase::Second, false);
                    lines.push(format!("model call failed: {e}"));
                }
            }
        }

        // Terminal.
        Ok(QueryResult {
            trace: lines.join("\n"),
            final_response,
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
