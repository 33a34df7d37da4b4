//! Workout value types shared by the composer, extractor and agent.
//!
//! Everything here serializes camelCase so the structures can be handed to a
//! UI layer (or fed back through the extractor) without a mapping step.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Fewest exercises a finished workout may contain.
pub const MIN_EXERCISES: usize = 3;

/// Most exercises a finished workout may contain.
pub const MAX_EXERCISES: usize = 6;

/// Warm-up and transition allowance per exercise, in minutes.
const MINUTES_PER_EXERCISE: u32 = 5;

/// Time per working set including rest, in minutes.
const MINUTES_PER_SET: u32 = 2;

// ─── Fitness Level ──────────────────────────────────────────────────────────

/// Training experience of the user. Drives the set/rep scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitnessLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl FitnessLevel {
    /// Fixed `(sets, reps)` lookup per level.
    pub fn set_scheme(self) -> (u32, u32) {
        match self {
            FitnessLevel::Beginner => (3, 8),
            FitnessLevel::Intermediate => (3, 10),
            FitnessLevel::Advanced => (4, 12),
        }
    }

    /// Parse a level from free text ("beginner", "Advanced", "novice").
    pub fn from_text(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "beginner" | "novice" | "new" => Some(FitnessLevel::Beginner),
            "intermediate" | "moderate" => Some(FitnessLevel::Intermediate),
            "advanced" | "expert" | "experienced" => Some(FitnessLevel::Advanced),
            _ => None,
        }
    }
}

impl fmt::Display for FitnessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FitnessLevel::Beginner => "beginner",
            FitnessLevel::Intermediate => "intermediate",
            FitnessLevel::Advanced => "advanced",
        };
        f.write_str(s)
    }
}

// ─── Equipment ──────────────────────────────────────────────────────────────

/// Equipment an exercise needs. `Bodyweight` is always considered available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Equipment {
    Bodyweight,
    Dumbbell,
    Barbell,
    Kettlebell,
    Machine,
    Cable,
    Bands,
}

impl Equipment {
    /// Map a free-text mention ("dumbbells", "no equipment") to equipment.
    pub fn from_text(text: &str) -> Option<Self> {
        let lower = text.trim().to_lowercase();
        let word = lower.trim_end_matches('s');
        match word {
            "bodyweight" | "body weight" | "no equipment" | "calisthenic" => {
                Some(Equipment::Bodyweight)
            }
            "dumbbell" | "db" => Some(Equipment::Dumbbell),
            "barbell" | "bar" => Some(Equipment::Barbell),
            "kettlebell" | "kb" => Some(Equipment::Kettlebell),
            "machine" | "gym machine" => Some(Equipment::Machine),
            "cable" => Some(Equipment::Cable),
            "band" | "resistance band" => Some(Equipment::Bands),
            _ => None,
        }
    }
}

impl fmt::Display for Equipment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Equipment::Bodyweight => "bodyweight",
            Equipment::Dumbbell => "dumbbell",
            Equipment::Barbell => "barbell",
            Equipment::Kettlebell => "kettlebell",
            Equipment::Machine => "machine",
            Equipment::Cable => "cable",
            Equipment::Bands => "bands",
        };
        f.write_str(s)
    }
}

// ─── Workout Structures ─────────────────────────────────────────────────────

/// One set of an exercise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutSet {
    pub reps: u32,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub rpe: Option<f32>,
    #[serde(default)]
    pub is_warmup: bool,
    #[serde(default)]
    pub is_executed: bool,
}

impl WorkoutSet {
    /// A planned, not yet executed, working set.
    pub fn working(reps: u32) -> Self {
        Self {
            reps,
            weight: None,
            rpe: None,
            is_warmup: false,
            is_executed: false,
        }
    }
}

/// One exercise in a workout, linked to a catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutExercise {
    pub catalog_id: String,
    pub name: String,
    pub sets: Vec<WorkoutSet>,
    /// Muscles this exercise is attributed to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_muscles: Vec<String>,
    /// Set when the name did not resolve to a catalog entry.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unmapped: bool,
}

impl WorkoutExercise {
    /// Build an exercise with `sets` identical working sets of `reps`.
    pub fn with_scheme(
        catalog_id: impl Into<String>,
        name: impl Into<String>,
        sets: u32,
        reps: u32,
    ) -> Self {
        Self {
            catalog_id: catalog_id.into(),
            name: name.into(),
            sets: (0..sets).map(|_| WorkoutSet::working(reps)).collect(),
            target_muscles: Vec::new(),
            unmapped: false,
        }
    }
}

/// A complete, structured workout plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedWorkout {
    pub name: String,
    pub exercises: Vec<WorkoutExercise>,
    pub estimated_duration_minutes: u32,
    pub target_muscles: BTreeSet<String>,
    pub difficulty: FitnessLevel,
    pub reasoning: String,
}

impl GeneratedWorkout {
    /// Duration estimate: `5×exercises + 2×exercises×sets` minutes.
    pub fn estimate_duration(exercise_count: usize, sets_per_exercise: u32) -> u32 {
        let n = exercise_count as u32;
        MINUTES_PER_EXERCISE * n + MINUTES_PER_SET * n * sets_per_exercise
    }

    /// Recompute the duration from the actual per-exercise set counts.
    pub fn recompute_duration(&mut self) {
        self.estimated_duration_minutes = self
            .exercises
            .iter()
            .map(|e| MINUTES_PER_EXERCISE + MINUTES_PER_SET * e.sets.len() as u32)
            .sum();
    }

    /// Whether the exercise count is within the allowed bounds.
    pub fn is_within_bounds(&self) -> bool {
        (MIN_EXERCISES..=MAX_EXERCISES).contains(&self.exercises.len())
    }

    /// Whether the workout already contains an exercise with this catalog id.
    pub fn contains_catalog_id(&self, catalog_id: &str) -> bool {
        self.exercises.iter().any(|e| e.catalog_id == catalog_id)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_scheme_lookup() {
        assert_eq!(FitnessLevel::Beginner.set_scheme(), (3, 8));
        assert_eq!(FitnessLevel::Intermediate.set_scheme(), (3, 10));
        assert_eq!(FitnessLevel::Advanced.set_scheme(), (4, 12));
    }

    #[test]
    fn test_estimate_duration_formula() {
        // 4 exercises × 3 sets: 5×4 + 2×4×3 = 44
        assert_eq!(GeneratedWorkout::estimate_duration(4, 3), 44);
        assert_eq!(GeneratedWorkout::estimate_duration(0, 3), 0);
    }

    #[test]
    fn test_recompute_duration_matches_formula_for_uniform_sets() {
        let mut workout = GeneratedWorkout {
            name: "Test".into(),
            exercises: vec![
                WorkoutExercise::with_scheme("push-ups", "Push-ups", 4, 12),
                WorkoutExercise::with_scheme("plank", "Plank", 4, 12),
                WorkoutExercise::with_scheme("bodyweight-squat", "Bodyweight Squat", 4, 12),
            ],
            estimated_duration_minutes: 0,
            target_muscles: BTreeSet::new(),
            difficulty: FitnessLevel::Advanced,
            reasoning: String::new(),
        };
        workout.recompute_duration();
        assert_eq!(
            workout.estimated_duration_minutes,
            GeneratedWorkout::estimate_duration(3, 4)
        );
        assert!(workout.is_within_bounds());
    }

    #[test]
    fn test_level_and_equipment_from_text() {
        assert_eq!(FitnessLevel::from_text(" Advanced "), Some(FitnessLevel::Advanced));
        assert_eq!(FitnessLevel::from_text("pro"), None);
        assert_eq!(Equipment::from_text("Dumbbells"), Some(Equipment::Dumbbell));
        assert_eq!(Equipment::from_text("no equipment"), Some(Equipment::Bodyweight));
        assert_eq!(Equipment::from_text("rowing machine"), None);
    }

    #[test]
    fn test_workout_serializes_camel_case() {
        let exercise = WorkoutExercise::with_scheme("plank", "Plank", 1, 30);
        let json = serde_json::to_value(&exercise).unwrap();
        assert_eq!(json["catalogId"], "plank");
        assert_eq!(json["sets"][0]["isWarmup"], false);
        assert!(json.get("unmapped").is_none());
    }
}
