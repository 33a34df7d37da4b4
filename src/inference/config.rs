//! Model configuration loading and validation.
//!
//! Reads `config/models.yaml` and resolves environment variables. The file is
//! the single source of truth for model endpoints, tool-call formats and the
//! fallback chain used by [`InferenceClient`](super::InferenceClient).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::errors::InferenceError;

/// Relative location of the models file under a project root.
const MODELS_CONFIG_RELATIVE: &str = "config/models.yaml";

/// Env var naming a project root that holds `config/models.yaml`.
pub const PROJECT_ROOT_ENV: &str = "REPCOACH_PROJECT_ROOT";

// ─── Public Types ───────────────────────────────────────────────────────────

/// Which tool-call format the model emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallFormat {
    /// Standard OpenAI JSON tool calls in the response delta.
    #[default]
    NativeJson,
    /// Text `Tool: … / Arguments: …` lines in the content.
    Pythonic,
}

/// A single model's runtime configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelConfig {
    pub display_name: String,
    #[serde(default)]
    pub model_name: Option<String>,
    pub base_url: String,
    #[serde(default = "default_context_window")]
    pub context_window: u32,
    #[serde(default)]
    pub tool_call_format: ToolCallFormat,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Send `response_format: {"type":"json_object"}` when a request asks
    /// for JSON output. Off unless the runtime is known to support it.
    #[serde(default)]
    pub force_json_response: bool,
}

fn default_context_window() -> u32 {
    8192
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}

/// Top-level model registry (mirrors `config/models.yaml`).
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub active_model: String,
    pub models: HashMap<String, ModelConfig>,
    #[serde(default)]
    pub fallback_chain: Vec<String>,
}

// ─── Loading ────────────────────────────────────────────────────────────────

/// Locate `config/models.yaml`.
///
/// Checks `REPCOACH_PROJECT_ROOT` first, then searches upward from `start`.
pub fn find_config_path(start: &Path) -> Result<PathBuf, InferenceError> {
    if let Ok(root) = std::env::var(PROJECT_ROOT_ENV) {
        let candidate = PathBuf::from(&root).join(MODELS_CONFIG_RELATIVE);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(MODELS_CONFIG_RELATIVE);
        if candidate.exists() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(InferenceError::ConfigError {
        reason: format!("could not find {MODELS_CONFIG_RELATIVE}"),
    })
}

/// Load and parse the models configuration file.
///
/// Performs environment-variable interpolation on `${VAR}` and
/// `${VAR:-default}` before parsing.
pub fn load_models_config(path: &Path) -> Result<ModelsConfig, InferenceError> {
    let raw = std::fs::read_to_string(path).map_err(|e| InferenceError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;
    parse_models_config(&raw)
}

/// Parse models configuration from YAML text.
pub fn parse_models_config(raw: &str) -> Result<ModelsConfig, InferenceError> {
    let interpolated = interpolate_env_vars(raw);
    serde_yaml::from_str(&interpolated).map_err(|e| InferenceError::ConfigError {
        reason: format!("failed to parse models config: {e}"),
    })
}

/// Models to try, in order: the active model, then the fallback chain.
/// Unknown keys and duplicates are skipped.
pub fn candidate_models(config: &ModelsConfig) -> Result<Vec<(String, ModelConfig)>, InferenceError> {
    let mut candidates: Vec<(String, ModelConfig)> = Vec::new();
    let keys = std::iter::once(&config.active_model).chain(config.fallback_chain.iter());

    for key in keys {
        if candidates.iter().any(|(k, _)| k == key) {
            continue;
        }
        match config.models.get(key) {
            Some(model) => candidates.push((key.clone(), model.clone())),
            None => tracing::debug!(model = %key, "model key not defined, skipping"),
        }
    }

    if candidates.is_empty() {
        return Err(InferenceError::ConfigError {
            reason: format!(
                "active model '{}' not found in config and no fallback available",
                config.active_model
            ),
        });
    }
    Ok(candidates)
}

// ─── Env-var interpolation ──────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some(idx) = expr.find(":-") {
        let var_name = &expr[..idx];
        let default = &expr[idx + 2..];
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ──────────────────────────────────────────────────────────────────
