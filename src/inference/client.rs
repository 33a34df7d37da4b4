//! OpenAI-compatible inference client.
//!
//! Sends chat completion requests to a local LLM endpoint and streams back
//! tokens and tool calls. Walks the configured fallback chain when a model is
//! unavailable.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client as HttpClient;
use uuid::Uuid;

use super::config::{candidate_models, ModelConfig, ModelsConfig};
use super::errors::InferenceError;
use super::generator::{ChunkStream, GenerationRequest, Generator};
use super::json_repair::repair_malformed_json;
use super::streaming::{parse_non_streaming_response, parse_sse_stream};
use super::tool_call_parser::extract_arguments_from_error;
use super::types::{ChatCompletionRequest, ResponseFormat, StreamChunk, ToolCall};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request timeout for streaming calls.
///
/// Local models can take a long time to process a large context before the
/// first token arrives.
const STREAM_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for local LLM inference endpoints.
///
/// Holds every usable model from the config in fallback order. The client is
/// stateless across requests: each request walks the chain from the top.
pub struct InferenceClient {
    http: HttpClient,
    http_stream: HttpClient,
    candidates: Vec<(String, ModelConfig)>,
}

impl InferenceClient {
    /// Create a client from the models configuration.
    ///
    /// Does NOT check connectivity; that happens on the first request.
    pub fn from_config(config: &ModelsConfig) -> Result<Self, InferenceError> {
        let candidates = candidate_models(config)?;
        let endpoint = candidates[0].1.base_url.clone();

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: endpoint.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let http_stream = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(STREAM_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint,
                reason: format!("failed to build streaming HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            http_stream,
            candidates,
        })
    }

    /// Model keys in the order they are tried.
    pub fn model_keys(&self) -> Vec<&str> {
        self.candidates.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// Display name of the preferred model.
    pub fn primary_model_name(&self) -> &str {
        &self.candidates[0].1.display_name
    }

    /// Context window of the preferred model.
    pub fn context_window(&self) -> u32 {
        self.candidates[0].1.context_window
    }

    /// Check whether the preferred model endpoint is reachable.
    ///
    /// Hits `/models`, which does not consume inference tokens.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/models", self.candidates[0].1.base_url);
        match self.http.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "health check failed");
                false
            }
        }
    }

    /// Attempt a single streaming request against one model.
    async fn try_stream_request(
        &self,
        key: &str,
        model: &ModelConfig,
        request: &GenerationRequest,
    ) -> Result<ChunkStream, InferenceError> {
        let url = format!("{}/chat/completions", model.base_url);
        let sampling = request.sampling.unwrap_or_default();
        let tools_requested = request.tools.is_some();

        let response_format = (request.json_output && model.force_json_response).then(|| {
            ResponseFormat {
                r#type: "json_object".to_string(),
            }
        });

        let body = ChatCompletionRequest {
            model: model.model_name.clone().unwrap_or_else(|| key.to_string()),
            messages: request.messages.clone(),
            tools: request.tools.clone(),
            tool_choice: tools_requested.then(|| "auto".to_string()),
            temperature: sampling.temperature.unwrap_or(model.temperature),
            top_p: sampling.top_p,
            max_tokens: model.max_tokens,
            stream: true,
            response_format,
        };

        // Metadata only; the body can be large.
        tracing::info!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            json_output = body.response_format.is_some(),
            max_tokens = body.max_tokens,
            "llm request"
        );

        let response = self
            .http_stream
            .post(&url)
            .json(&body)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout {
                        duration_secs: STREAM_REQUEST_TIMEOUT.as_secs(),
                    }
                } else {
                    InferenceError::ConnectionFailed {
                        endpoint: url.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let is_sse = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/event-stream"));

        if is_sse {
            return Ok(parse_sse_stream(response, model.tool_call_format, tools_requested).boxed());
        }

        // Server ignored `stream: true`.
        let body_text = response.text().await.map_err(|e| InferenceError::StreamError {
            reason: format!("failed to read response body: {e}"),
        })?;
        let chunk = parse_non_streaming_response(&body_text, model.tool_call_format, tools_requested)?;
        Ok(stream::once(async move { Ok(chunk) }).boxed())
    }
}

#[async_trait]
impl Generator for InferenceClient {
    /// Stream a chat completion, falling back through the model chain.
    ///
    /// When the server rejects the model's own tool-call JSON (HTTP 500), the
    /// arguments are repaired client-side before moving to the next model.
    async fn stream(&self, request: GenerationRequest) -> Result<ChunkStream, InferenceError> {
        let mut attempted = Vec::new();

        for (key, model) in &self.candidates {
            match self.try_stream_request(key, model, &request).await {
                Ok(stream) => return Ok(stream),
                Err(e) if e.is_tool_call_parse_error() => {
                    if let Some(chunk) = repair_from_error(&e, &request) {
                        tracing::info!(model = %key, "repaired malformed tool call from server error");
                        return Ok(stream::once(async move { Ok(chunk) }).boxed());
                    }
                    tracing::warn!(model = %key, "tool call JSON repair failed, falling back");
                    attempted.push(key.clone());
                }
                Err(e) if e.is_retriable() => {
                    tracing::warn!(model = %key, error = %e, "model unavailable, falling back");
                    attempted.push(key.clone());
                }
                Err(e) => return Err(e),
            }
        }

        Err(InferenceError::AllModelsUnavailable { attempted })
    }
}

// ─── Tool Call Repair ────────────────────────────────────────────────────────

/// Rebuild a tool call from a server-side parse failure.
///
/// The error body carries the raw arguments but not the tool name, so this
/// only works when the request offered exactly one tool.
fn repair_from_error(err: &InferenceError, request: &GenerationRequest) -> Option<StreamChunk> {
    let tools = request.tools.as_ref()?;
    let [tool] = tools.as_slice() else {
        return None;
    };
    let raw_args = extract_arguments_from_error(err.error_body()?)?;
    let arguments = repair_malformed_json(&raw_args)?;

    Some(StreamChunk::tool_calls(vec![ToolCall {
        id: format!("call_{}", Uuid::new_v4()),
        name: tool.function.name.clone(),
        arguments,
    }]))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
