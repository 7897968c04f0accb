//! Shared types for the model collaborator.
//!
//! These mirror the OpenAI Chat Completions API types, used for both
//! request building and response parsing.

use serde::{Deserialize, Serialize};

// ─── Conversation Messages ───────────────────────────────────────────────────

/// A single message in the conversation.
///
/// Serialization notes for OpenAI-compatible endpoints:
/// - `content` must be `""` (not `null`) for assistant messages with tool
///   calls. Many local runtimes misinterpret `null` content and fail to
///   recognize the tool call round-trip pattern.
/// - `tool_call_id` and `tool_calls` are skipped when `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(serialize_with = "serialize_content")]
    pub content: Option<String>,
    /// Tool call results are sent back as `tool` role messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Assistant messages may carry tool call requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallPayload>>,
}

/// Custom serializer for `content`: emit `""` instead of `null` when `None`.
fn serialize_content<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(s) => serializer.serialize_str(s),
        None => serializer.serialize_str(""),
    }
}

impl ChatMessage {
    /// The user-role message seeding a query's conversation.
    pub fn user(text: &str) -> Self {
        Self {
            role: Role::User,
            content: Some(text.to_string()),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// A tool-role message carrying one call's serialized result, correlated
    /// back to the request by its call id.
    pub fn tool_result(call_id: &str, payload: &serde_json::Value) -> Self {
        Self {
            role: Role::Tool,
            content: Some(payload.to_string()),
            tool_call_id: Some(call_id.to_string()),
            tool_calls: None,
        }
    }

    /// The assistant-role message echoing a completion back into the history.
    pub fn assistant(completion: &Completion) -> Self {
        let tool_calls = if completion.tool_calls.is_empty() {
            None
        } else {
            Some(
                completion
                    .tool_calls
                    .iter()
                    .map(|tc| ToolCallPayload {
                        id: tc.id.clone(),
                        r#type: "function".to_string(),
                        function: FunctionCall {
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        },
                    })
                    .collect(),
            )
        };

        Self {
            role: Role::Assistant,
            content: completion.content.clone(),
            tool_call_id: None,
            tool_calls,
        }
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

// ─── Tool Calls ──────────────────────────────────────────────────────────────

/// Tool call as it appears on the wire inside a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallPayload {
    #[serde(default)]
    pub id: String,
    pub r#type: String,
    pub function: FunctionCall,
}

/// Function call details within a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Serialized JSON argument payload, passed through unparsed.
    pub arguments: String,
}

/// A parsed tool call request extracted from the model's reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    /// Correlation id for the eventual tool-role result message.
    pub id: String,
    /// Qualified tool identifier, e.g. `"filesystem__read_file"`.
    pub name: String,
    /// Serialized JSON argument payload; parsing happens at dispatch.
    pub arguments: String,
}

// ─── Completions ─────────────────────────────────────────────────────────────

/// The model's reply to one completion request.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    /// Direct text content, if any.
    pub content: Option<String>,
    /// Requested tool calls; empty when the model answered directly.
    pub tool_calls: Vec<ToolCallRequest>,
}

/// Request body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

/// Response body from `POST /v1/chat/completions`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<Choice>,
}

/// A single choice within a completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

/// The assistant message within a response choice.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallPayload>>,
}

impl ChatCompletionResponse {
    /// Flatten the first choice into a `Completion`.
    ///
    /// Tool calls missing an id get a generated one so correlation always
    /// works. Empty text content is normalized to `None`.
    pub fn into_completion(self) -> Option<Completion> {
        let message = self.choices.into_iter().next()?.message;

        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|payload| ToolCallRequest {
                id: if payload.id.is_empty() {
                    format!("call_{}", uuid::Uuid::new_v4())
                } else {
                    payload.id
                },
                name: payload.function.name,
                arguments: payload.function.arguments,
            })
            .collect();

        Some(Completion {
            content: message.content.filter(|c| !c.is_empty()),
            tool_calls,
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
