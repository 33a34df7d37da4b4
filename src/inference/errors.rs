//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to
//! build meaningful log entries.

use thiserror::Error;

/// Errors that can occur while talking to a generator.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the model endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The model endpoint did not respond within the configured timeout.
    #[error("inference timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Failed to parse a tool call from the model's response.
    #[error("tool call parse error: {reason}")]
    ToolCallParseError { raw_response: String, reason: String },

    /// Every model in the fallback chain was unavailable.
    #[error("all models unavailable (tried: {})", attempted.join(", "))]
    AllModelsUnavailable { attempted: Vec<String> },

    /// Non-2xx HTTP response from the model endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// SSE stream parsing or chunk-level error.
    #[error("stream error: {reason}")]
    StreamError { reason: String },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

impl InferenceError {
    /// Whether this is a server-side tool call parse failure (HTTP 500).
    ///
    /// Ollama returns HTTP 500 with `"error parsing tool call"` when the model
    /// generates malformed JSON in tool call arguments. These errors are
    /// candidates for client-side JSON repair.
    pub fn is_tool_call_parse_error(&self) -> bool {
        matches!(
            self,
            InferenceError::HttpError { status: 500, body }
                if body.contains("error parsing tool call")
        )
    }

    /// Extract the error body text, if this is an `HttpError`.
    pub fn error_body(&self) -> Option<&str> {
        match self {
            InferenceError::HttpError { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Whether an error should move on to the next model in the chain.
    ///
    /// HTTP 404 is included because Ollama returns 404 when a model isn't
    /// pulled. HTTP 500 is included because local servers return it when
    /// the model emits malformed tool-call JSON, which is transient.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            InferenceError::ConnectionFailed { .. }
                | InferenceError::Timeout { .. }
                | InferenceError::HttpError { status: 404, .. }
                | InferenceError::HttpError { status: 500, .. }
                | InferenceError::HttpError {
                    status: 502..=504,
                    ..
                }
        )
    }
}

/// Why a streaming session stopped before producing a result.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The caller cancelled the session.
    #[error("session aborted")]
    Aborted,

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_tool_call_parse_error_true() {
        let err = InferenceError::HttpError {
            status: 500,
            body: r#"{"error":{"message":"error parsing tool call: raw='{...}', err=invalid"}}"#
                .to_string(),
        };
        assert!(err.is_tool_call_parse_error());
    }

    #[test]
    fn test_is_tool_call_parse_error_false_different_status() {
        let err = InferenceError::HttpError {
            status: 404,
            body: "error parsing tool call".to_string(),
        };
        assert!(!err.is_tool_call_parse_error());
    }

    #[test]
    fn test_error_body() {
        let err = InferenceError::HttpError {
            status: 500,
            body: "test body".to_string(),
        };
        assert_eq!(err.error_body(), Some("test body"));
        assert!(InferenceError::Timeout { duration_secs: 5 }.error_body().is_none());
    }

    #[test]
    fn test_is_retriable() {
        assert!(InferenceError::ConnectionFailed {
            endpoint: "".into(),
            reason: "".into()
        }
        .is_retriable());
        assert!(InferenceError::Timeout { duration_secs: 5 }.is_retriable());
        assert!(InferenceError::HttpError {
            status: 404,
            body: "model not found".into()
        }
        .is_retriable());
        assert!(InferenceError::HttpError {
            status: 503,
            body: "".into()
        }
        .is_retriable());
        assert!(!InferenceError::HttpError {
            status: 400,
            body: "".into()
        }
        .is_retriable());
        assert!(!InferenceError::ToolCallParseError {
            raw_response: "".into(),
            reason: "".into()
        }
        .is_retriable());
    }

    #[test]
    fn test_session_error_wraps_inference_error() {
        let err: SessionError = InferenceError::StreamError {
            reason: "eof".into(),
        }
        .into();
        assert_eq!(err.to_string(), "stream error: eof");
        assert_eq!(SessionError::Aborted.to_string(), "session aborted");
    }
}
