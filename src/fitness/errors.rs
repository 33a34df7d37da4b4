//! Fitness domain error types.

use thiserror::Error;

/// Errors raised while loading or validating the exercise catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog file could not be read.
    #[error("failed to read catalog {path}: {reason}")]
    Io { path: String, reason: String },

    /// The catalog contents could not be parsed.
    #[error("failed to parse catalog: {reason}")]
    Parse { reason: String },

    /// The catalog parsed but violates an invariant.
    #[error("invalid catalog: {reason}")]
    Invalid { reason: String },
}

/// Internal composer failures. Never surfaced past `WorkoutComposer::compose`.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// Not enough exercises could be selected, even after backfill.
    #[error("only {found} exercises available, need at least {required}")]
    InsufficientExercises { found: usize, required: usize },
}
