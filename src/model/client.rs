//! OpenAI-compatible chat completion client.
//!
//! One request/response call per invocation, with a bounded internal retry
//! on transient failures. The orchestrator sees a single typed error when
//! the call ultimately fails.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use crate::config::ModelSettings;
use crate::mcp_client::ToolDescriptor;

use super::errors::ModelError;
use super::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Completion};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Attempts per `complete` call (1 initial + retries).
const MAX_ATTEMPTS: u32 = 3;

/// Base delay between attempts (doubles each time).
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

// ─── ModelClient ─────────────────────────────────────────────────────────────

/// The external chat-completion collaborator.
///
/// An explicit constructor dependency of the query orchestrator, so
/// orchestrators with different endpoints or credentials can coexist and
/// tests can substitute their own implementation.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Issue one completion call. `tools` carries the catalog for the
    /// tool-eligible first call and is `None` for the answer-only second call.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDescriptor]>,
    ) -> Result<Completion, ModelError>;
}

// ─── HttpModelClient ─────────────────────────────────────────────────────────

/// `ModelClient` over an OpenAI-compatible HTTP endpoint.
pub struct HttpModelClient {
    http: HttpClient,
    settings: ModelSettings,
    api_key: Option<String>,
}

impl HttpModelClient {
    /// Build the client from settings; resolves the API key from the
    /// configured environment variable. Does NOT check connectivity —
    /// that happens on the first request.
    pub fn new(settings: ModelSettings) -> Result<Self, ModelError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ModelError::ConnectionFailed {
                endpoint: settings.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let api_key = settings.api_key();

        Ok(Self {
            http,
            settings,
            api_key,
        })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDescriptor]>,
    ) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.settings.model.clone(),
            messages: messages.to_vec(),
            tools: tools.map(serialize_tool_catalog),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stream: false,
        }
    }

    /// One HTTP round trip; the caller decides whether to retry.
    async fn attempt(&self, request: &ChatCompletionRequest) -> Result<Completion, ModelError> {
        let mut builder = self.http.post(self.completions_url()).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ModelError::ConnectionFailed {
                endpoint: self.settings.base_url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::HttpError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse =
            response
                .json()
                .await
                .map_err(|e| ModelError::InvalidResponse {
                    reason: format!("failed to parse completion body: {e}"),
                })?;

        parsed
            .into_completion()
            .ok_or_else(|| ModelError::InvalidResponse {
                reason: "completion carried no choices".into(),
            })
    }
}

/// Whether an attempt failure is worth retrying.
///
/// Transport failures and server-side 5xx/429 are transient; client-side
/// 4xx and malformed bodies are not going to improve on a retry.
fn is_transient(error: &ModelError) -> bool {
    match error {
        ModelError::ConnectionFailed { .. } => true,
        ModelError::HttpError { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

/// Serialize the catalog into the wire's function-calling format.
fn serialize_tool_catalog(tools: &[ToolDescriptor]) -> Vec<serde_json::Value> {
    tools
        .iter()
        .map(|tool| {
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.input_schema,
                }
            })
        })
        .collect()
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDescriptor]>,
    ) -> Result<Completion, ModelError> {
        let request = self.build_request(messages, tools);

        let mut last_error: Option<ModelError> = None;
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt - 1)).await;
            }

            match self.attempt(&request).await {
                Ok(completion) => return Ok(completion),
                Err(e) if is_transient(&e) => {
                    tracing::warn!(attempt, error = %e, "model call attempt failed");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(ModelError::RetriesExhausted {
            attempts: MAX_ATTEMPTS,
            reason: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".into()),
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
