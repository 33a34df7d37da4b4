//! Agent Core error types.

use thiserror::Error;

/// Errors that can occur during agent core operations.
///
/// None of these reach the turn caller directly; the orchestrator turns them
/// into a `TurnResult` or `ConfirmationOutcome` message.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The tool name is not in the declared catalog.
    #[error("unknown tool '{name}'")]
    UnknownTool { name: String },

    /// The arguments do not match the tool's parameter schema.
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// A confirmation token was unknown, already used, or expired.
    #[error("confirmation rejected: {reason}")]
    ConfirmationError { reason: String },

    /// The domain service behind a tool failed.
    #[error("tool '{tool}' failed: {reason}")]
    DomainServiceError { tool: String, reason: String },

    /// Serialization error.
    #[error("serialization error: {reason}")]
    SerializationError { reason: String },
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::SerializationError {
            reason: e.to_string(),
        }
    }
}
