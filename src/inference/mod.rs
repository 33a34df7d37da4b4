//! Inference: everything between the agent and a language model.
//!
//! - OpenAI-compatible streaming client with a model fallback chain
//! - SSE parsing and tool call extraction (native JSON + pythonic formats)
//! - Repair of malformed or truncated JSON emitted by small models
//! - The [`Generator`] seam and the cancellable [`StreamSession`]
//!
//! Models are configured in `config/models.yaml`; switching models is a
//! config change, not a code change.

pub mod client;
pub mod config;
pub mod errors;
pub mod generator;
pub mod json_repair;
pub mod session;
pub mod streaming;
pub mod tool_call_parser;
pub mod types;

pub use client::InferenceClient;
pub use config::{ModelConfig, ModelsConfig, ToolCallFormat};
pub use errors::{InferenceError, SessionError};
pub use generator::{ChunkStream, Generation, GenerationRequest, Generator};
pub use session::{ChunkCallback, StreamSession};
pub use types::{
    ChatMessage, Role, SamplingOverrides, StreamChunk, ToolCall, ToolDefinition,
};
