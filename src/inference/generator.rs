//! The text-generation seam.
//!
//! Everything that needs a model goes through [`Generator`]. The HTTP client
//! implements it for real endpoints; tests implement it with scripted chunks.

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::errors::InferenceError;
use super::types::{ChatMessage, SamplingOverrides, StreamChunk, ToolCall, ToolDefinition};

/// Chunks produced by one generation.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, InferenceError>>;

/// One generation request.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub sampling: Option<SamplingOverrides>,
    /// Ask for a JSON object reply, where the model runtime supports it.
    pub json_output: bool,
}

impl GenerationRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = (!tools.is_empty()).then_some(tools);
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingOverrides) -> Self {
        self.sampling = Some(sampling);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// A source of streamed model output.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Start a generation. Errors here mean no chunk was produced at all.
    async fn stream(&self, request: GenerationRequest) -> Result<ChunkStream, InferenceError>;
}

/// The collected result of one generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
}

impl Generation {
    /// Fold one chunk into the collected result.
    pub fn absorb(&mut self, chunk: StreamChunk) {
        if let Some(token) = chunk.token {
            self.text.push_str(&token);
        }
        if let Some(calls) = chunk.tool_calls {
            self.tool_calls.extend(calls);
        }
        if chunk.finish_reason.is_some() {
            self.finish_reason = chunk.finish_reason;
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
