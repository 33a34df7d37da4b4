//! Shared types for the agent core.
//!
//! Turn requests and results, conversation history entries, and the intent
//! classes used by the router and orchestrator.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fitness::{Equipment, FitnessLevel, GeneratedWorkout, MuscleVolumeMap};

use super::confirmation::PendingConfirmation;

// ─── Intent ─────────────────────────────────────────────────────────────────

/// What kind of turn the user started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Create or adjust a workout plan.
    Workout,
    /// Free conversation.
    General,
    /// Navigate, query or change application state through tools.
    AppControl,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Intent::Workout => "workout",
            Intent::General => "general",
            Intent::AppControl => "app_control",
        };
        f.write_str(s)
    }
}

// ─── Conversation History ───────────────────────────────────────────────────

/// Who said a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
}

/// One message carried between turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub text: String,
}

impl HistoryEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::Assistant,
            text: text.into(),
        }
    }
}

// ─── Turn Input ─────────────────────────────────────────────────────────────

/// Profile defaults applied when the request itself does not say.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub level: FitnessLevel,
    /// Available equipment. Empty means bodyweight only.
    #[serde(default)]
    pub equipment: Vec<Equipment>,
}

/// One user turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub muscle_volumes: MuscleVolumeMap,
    #[serde(default)]
    pub profile: Option<UserProfile>,
}

impl TurnRequest {
    pub fn new(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_volumes(mut self, volumes: MuscleVolumeMap) -> Self {
        self.muscle_volumes = volumes;
        self
    }

    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profile = Some(profile);
        self
    }
}

// ─── Turn Output ────────────────────────────────────────────────────────────

/// Everything the caller learns from a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResult {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workout_data: Option<GeneratedWorkout>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigation_target: Option<String>,
    pub success: bool,
    pub confidence: f64,
    pub steps_completed: Vec<String>,
    pub requires_confirmation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_confirmation: Option<PendingConfirmation>,
    pub intent: Intent,
    pub aborted: bool,
}

impl TurnResult {
    /// A plain text reply.
    pub fn reply(intent: Intent, content: impl Into<String>, success: bool, confidence: f64) -> Self {
        Self {
            content: content.into(),
            workout_data: None,
            navigation_target: None,
            success,
            confidence,
            steps_completed: Vec::new(),
            requires_confirmation: false,
            confirmation_prompt: None,
            pending_confirmation: None,
            intent,
            aborted: false,
        }
    }

    /// The terminal result of a cancelled turn.
    pub fn aborted(intent: Intent, steps_completed: Vec<String>) -> Self {
        Self {
            steps_completed,
            aborted: true,
            ..Self::reply(intent, String::new(), false, 0.0)
        }
    }
}

/// Result of confirming or declining a pending action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationOutcome {
    pub success: bool,
    pub message: String,
}

// ─── Tests ──────────────────────────────────────────────────────────────────
