//! Agent settings loaded from YAML.
//!
//! Every field has a default, so a partial file (or none
//! at all) is valid. Values are checked by [`AgentSettings::validate`] before
//! the agent is built.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent_core::confirmation::DEFAULT_CONFIRMATION_TTL_SECS;
use crate::agent_core::conversation::DEFAULT_MAX_TURNS;
use crate::agent_core::reasoning::DEFAULT_STEP_BUDGET;
use crate::fitness::workout::{MAX_EXERCISES, MIN_EXERCISES};
use crate::fitness::{ComposerLimits, RecoveryThresholds};
use crate::inference::SamplingOverrides;

/// Fewest transitions that let the workout chain reach its reply.
const MIN_STEP_BUDGET: usize = 4;

/// Settings file name inside the data directory.
const SETTINGS_FILE: &str = "settings.yaml";

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("failed to parse settings: {reason}")]
    Parse { reason: String },

    #[error("invalid settings: {reason}")]
    Invalid { reason: String },
}

// ─── Sampling ───────────────────────────────────────────────────────────────

/// Sampling per kind of generation.
///
/// Tool selection and workout authoring run cold so output stays
/// parseable; conversation runs warmer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingSettings {
    #[serde(default = "default_conversational_temperature")]
    pub conversational_temperature: f32,
    #[serde(default = "default_conversational_top_p")]
    pub conversational_top_p: f32,
    #[serde(default = "default_tool_temperature")]
    pub tool_temperature: f32,
    #[serde(default = "default_tool_top_p")]
    pub tool_top_p: f32,
    #[serde(default = "default_authoring_temperature")]
    pub authoring_temperature: f32,
    #[serde(default = "default_authoring_top_p")]
    pub authoring_top_p: f32,
}

fn default_conversational_temperature() -> f32 {
    0.7
}
fn default_conversational_top_p() -> f32 {
    0.9
}
fn default_tool_temperature() -> f32 {
    0.1
}
fn default_tool_top_p() -> f32 {
    0.2
}
fn default_authoring_temperature() -> f32 {
    0.2
}
fn default_authoring_top_p() -> f32 {
    0.5
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            conversational_temperature: default_conversational_temperature(),
            conversational_top_p: default_conversational_top_p(),
            tool_temperature: default_tool_temperature(),
            tool_top_p: default_tool_top_p(),
            authoring_temperature: default_authoring_temperature(),
            authoring_top_p: default_authoring_top_p(),
        }
    }
}

impl SamplingSettings {
    pub fn conversation(&self) -> SamplingOverrides {
        overrides(self.conversational_temperature, self.conversational_top_p)
    }

    pub fn tool_selection(&self) -> SamplingOverrides {
        overrides(self.tool_temperature, self.tool_top_p)
    }

    pub fn authoring(&self) -> SamplingOverrides {
        overrides(self.authoring_temperature, self.authoring_top_p)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        let pairs = [
            ("conversational", self.conversational_temperature, self.conversational_top_p),
            ("tool", self.tool_temperature, self.tool_top_p),
            ("authoring", self.authoring_temperature, self.authoring_top_p),
        ];
        for (name, temperature, top_p) in pairs {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(invalid(format!("{name} temperature {temperature} is outside 0..=2")));
            }
            if !(top_p > 0.0 && top_p <= 1.0) {
                return Err(invalid(format!("{name} top_p {top_p} is outside (0, 1]")));
            }
        }
        Ok(())
    }
}

fn overrides(temperature: f32, top_p: f32) -> SamplingOverrides {
    SamplingOverrides {
        temperature: Some(temperature),
        top_p: Some(top_p),
    }
}

// ─── AgentSettings ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default)]
    pub recovery: RecoveryThresholds,
    #[serde(default)]
    pub composer: ComposerLimits,
    /// Transition budget of the reasoning machine.
    #[serde(default = "default_step_budget")]
    pub step_budget: usize,
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
    /// Approximate tokens of history sent with each generation.
    #[serde(default = "default_history_token_budget")]
    pub history_token_budget: u32,
    #[serde(default = "default_confirmation_ttl_secs")]
    pub confirmation_ttl_secs: u64,
    /// Let the model author workouts. When off, composer drafts are used as is.
    #[serde(default = "default_generator_authoring")]
    pub generator_authoring: bool,
    #[serde(default)]
    pub sampling: SamplingSettings,
    /// Exercise catalog file. The built-in catalog is used when unset.
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}

fn default_step_budget() -> usize {
    DEFAULT_STEP_BUDGET
}
fn default_max_history_turns() -> usize {
    DEFAULT_MAX_TURNS
}
fn default_history_token_budget() -> u32 {
    2_000
}
fn default_confirmation_ttl_secs() -> u64 {
    DEFAULT_CONFIRMATION_TTL_SECS
}
fn default_generator_authoring() -> bool {
    true
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            recovery: RecoveryThresholds::default(),
            composer: ComposerLimits::default(),
            step_budget: default_step_budget(),
            max_history_turns: default_max_history_turns(),
            history_token_budget: default_history_token_budget(),
            confirmation_ttl_secs: default_confirmation_ttl_secs(),
            generator_authoring: default_generator_authoring(),
            sampling: SamplingSettings::default(),
            catalog_path: None,
        }
    }
}

impl AgentSettings {
    /// `settings.yaml` in the platform data directory.
    pub fn default_path() -> PathBuf {
        crate::data_dir().join(SETTINGS_FILE)
    }

    pub fn parse(raw: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_yaml::from_str(raw).map_err(|e| SettingsError::Parse {
            reason: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&raw)
    }

    /// Load from disk, or return defaults when the file is missing or bad.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(settings) => {
                tracing::info!(path = %path.display(), "loaded agent settings");
                settings
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "bad settings file, using defaults");
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let RecoveryThresholds { high, low } = self.recovery;
        if !high.is_finite() || !low.is_finite() || low < 0.0 {
            return Err(invalid(format!("recovery thresholds must be finite and non-negative (low {low}, high {high})")));
        }
        if low >= high {
            return Err(invalid(format!("recovery low threshold {low} must be below high {high}")));
        }

        let limits = self.composer;
        if limits.min_exercises < MIN_EXERCISES
            || limits.max_exercises > MAX_EXERCISES
            || limits.min_exercises > limits.max_exercises
        {
            return Err(invalid(format!(
                "exercise bounds {}..={} must lie within {MIN_EXERCISES}..={MAX_EXERCISES}",
                limits.min_exercises, limits.max_exercises
            )));
        }
        if limits.max_per_muscle == 0 || limits.max_target_muscles == 0 {
            return Err(invalid("per-muscle and target-muscle caps must be at least 1".into()));
        }

        if self.step_budget < MIN_STEP_BUDGET {
            return Err(invalid(format!(
                "step budget {} is below the minimum of {MIN_STEP_BUDGET}",
                self.step_budget
            )));
        }
        if self.max_history_turns == 0 {
            return Err(invalid("max_history_turns must be at least 1".into()));
        }
        if self.confirmation_ttl_secs == 0 {
            return Err(invalid("confirmation_ttl_secs must be positive".into()));
        }
        self.sampling.validate()
    }
}

fn invalid(reason: String) -> SettingsError {
    SettingsError::Invalid { reason }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
