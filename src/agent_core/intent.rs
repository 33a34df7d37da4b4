//! Intent Router: lexical classification of a user turn.
//!
//! Workout vocabulary is fixed; app-control vocabulary is derived from the
//! declared tools, so adding a tool widens what the router recognizes.
//! Matching is on word boundaries and fully deterministic.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::fitness::templates::word_text;

use super::tool_registry::ToolCatalog;
use super::types::Intent;

// ─── Vocabulary ─────────────────────────────────────────────────────────────

const GENERATION_VERBS: &[&str] = &[
    "create", "build", "generate", "make", "design", "plan", "give", "suggest", "recommend",
    "prepare",
];

const MUSCLE_NAMES: &[&str] = &[
    "chest", "pec", "back", "lats", "leg", "quad", "hamstring", "glute", "calf", "calves",
    "shoulder", "delt", "arm", "bicep", "tricep", "core", "abs", "upper body", "lower body",
    "full body",
];

const EXERCISE_NAMES: &[&str] = &[
    "squat", "deadlift", "bench", "push up", "pushup", "pull up", "pullup", "row", "lunge",
    "curl", "press", "plank", "dip", "crunch",
];

const FITNESS_NOUNS: &[&str] = &[
    "workout", "exercise", "training", "routine", "sets", "reps", "strength", "cardio", "muscle",
    "gym",
];

const WORKOUT_GROUPS: &[&[&str]] = &[GENERATION_VERBS, MUSCLE_NAMES, EXERCISE_NAMES, FITNESS_NOUNS];

/// Weight of a tool-name word hit. Description words weigh 1.
const NAME_WORD_WEIGHT: usize = 3;

// ─── Analysis ───────────────────────────────────────────────────────────────

/// The router's view of one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentAnalysis {
    pub intent: Intent,
    pub workout_keywords: Vec<String>,
    pub app_keywords: Vec<String>,
    pub workout_score: usize,
    pub app_score: usize,
    /// Winning score over total score; 0.5 when nothing matched.
    pub confidence: f64,
}

/// Classifies turns as workout, app control or general conversation.
#[derive(Debug, Clone)]
pub struct IntentRouter {
    tool_name_words: BTreeSet<String>,
    tool_description_words: BTreeSet<String>,
}

impl IntentRouter {
    pub fn new(catalog: &ToolCatalog) -> Self {
        let (names, descriptions) = catalog.keywords();
        let in_workout_vocabulary =
            |word: &String| WORKOUT_GROUPS.iter().any(|group| group.contains(&word.as_str()));

        let tool_name_words: BTreeSet<String> =
            names.into_iter().filter(|w| !in_workout_vocabulary(w)).collect();
        let tool_description_words = descriptions
            .into_iter()
            .filter(|w| !in_workout_vocabulary(w) && !tool_name_words.contains(w))
            .collect();

        Self {
            tool_name_words,
            tool_description_words,
        }
    }

    pub fn classify(&self, text: &str) -> Intent {
        self.analyze(text).intent
    }

    pub fn analyze(&self, text: &str) -> IntentAnalysis {
        let padded = word_text(text);

        let workout_keywords: Vec<String> = WORKOUT_GROUPS
            .iter()
            .flat_map(|group| group.iter())
            .filter(|kw| matches_word(&padded, kw))
            .map(|kw| kw.to_string())
            .collect();

        let name_hits: Vec<&String> =
            self.tool_name_words.iter().filter(|kw| matches_word(&padded, kw)).collect();
        let description_hits: Vec<&String> = self
            .tool_description_words
            .iter()
            .filter(|kw| matches_word(&padded, kw))
            .collect();

        let workout_score = workout_keywords.len();
        let app_score = NAME_WORD_WEIGHT * name_hits.len() + description_hits.len();

        let intent = if workout_score > app_score {
            Intent::Workout
        } else if app_score > workout_score {
            Intent::AppControl
        } else if workout_score > 0 {
            Intent::Workout
        } else {
            // Both zero here, so neither keyword set matched.
            Intent::General
        };

        let total = workout_score + app_score;
        let confidence = if total == 0 {
            0.5
        } else {
            workout_score.max(app_score) as f64 / total as f64
        };

        let app_keywords = name_hits.into_iter().chain(description_hits).cloned().collect();

        tracing::debug!(
            intent = %intent,
            workout_score,
            app_score,
            "classified turn"
        );

        IntentAnalysis {
            intent,
            workout_keywords,
            app_keywords,
            workout_score,
            app_score,
            confidence,
        }
    }
}

/// Whole-word match on text from [`word_text`], allowing a plural suffix.
fn matches_word(padded: &str, keyword: &str) -> bool {
    ["", "s", "es"]
        .iter()
        .any(|suffix| padded.contains(&format!(" {keyword}{suffix} ")))
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> IntentRouter {
        IntentRouter::new(&ToolCatalog::builtin())
    }

    #[test]
    fn test_workout_requests() {
        let router = router();
        assert_eq!(router.classify("Create a chest workout"), Intent::Workout);
        assert_eq!(router.classify("give me something for my quads and glutes"), Intent::Workout);
        assert_eq!(router.classify("30 min of push-ups and squats?"), Intent::Workout);
    }

    #[test]
    fn test_app_control_requests() {
        let router = router();
        assert_eq!(router.classify("Go to settings"), Intent::AppControl);
        assert_eq!(router.classify("show my workout history"), Intent::AppControl);
        assert_eq!(router.classify("delete my last workout"), Intent::AppControl);
        assert_eq!(router.classify("what's my chest volume?"), Intent::AppControl);
        assert_eq!(router.classify("open the progress screen"), Intent::AppControl);
    }

    #[test]
    fn test_general_conversation() {
        let router = router();
        let analysis = router.analyze("How are you today?");
        assert_eq!(analysis.intent, Intent::General);
        assert_eq!(analysis.confidence, 0.5);
        assert!(analysis.workout_keywords.is_empty());
        assert_eq!(router.classify(""), Intent::General);
    }

    #[test]
    fn test_word_boundaries() {
        let router = router();
        // "backpack" must not match "back", "rowing" must not match "row".
        assert_eq!(router.classify("I lost my backpack while rowing"), Intent::General);
    }

    #[test]
    fn test_tie_breaks_toward_workout() {
        let router = router();
        // One workout hit ("workout") against one description hit ("home").
        let analysis = router.analyze("workout at home");
        assert_eq!(analysis.workout_score, analysis.app_score);
        assert_eq!(analysis.intent, Intent::Workout);
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let router = router();
        let a = router.analyze("build a leg workout with dumbbells");
        let b = router.analyze("build a leg workout with dumbbells");
        assert_eq!(a, b);
        assert_eq!(a.workout_keywords, vec!["build", "leg", "workout"]);
        assert_eq!(a.confidence, 1.0);
    }

    #[test]
    fn test_workout_vocabulary_excluded_from_app_words() {
        let router = router();
        assert!(!router.tool_name_words.contains("workout"));
        assert!(!router.tool_description_words.contains("muscle"));
        assert!(router.tool_name_words.contains("delete"));
    }
}
