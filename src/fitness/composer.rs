//! Workout composer: recovery-aware muscle targeting and exercise selection.
//!
//! Three stages, each usable on its own:
//! - `select_target_muscles`: explicit request (minus overworked muscles) or
//!   undertrained-then-recovered prioritization, capped at three
//! - `select_exercises`: up to two catalog entries per target, bodyweight
//!   backfill, capped at six
//! - `build_workout`: fixed set/rep scheme per level and a duration estimate
//!
//! `compose` runs selection and building and never fails: any internal error
//! yields the fixed bodyweight fallback routine.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::catalog::{ExerciseCatalog, ExerciseCatalogEntry};
use super::errors::ComposeError;
use super::recovery::RecoveryClassification;
use super::templates::fallback_workout;
use super::workout::{
    Equipment, FitnessLevel, GeneratedWorkout, WorkoutExercise, MAX_EXERCISES, MIN_EXERCISES,
};

/// Balanced default when no muscle qualifies.
const DEFAULT_TARGETS: &[&str] = &["chest", "back", "legs"];

/// Undertrained muscles taken before recovered ones.
const MAX_UNDERTRAINED_TARGETS: usize = 2;

/// Recovered muscles taken after the undertrained ones.
const MAX_RECOVERED_TARGETS: usize = 2;

// ─── Limits ─────────────────────────────────────────────────────────────────

/// Selection caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposerLimits {
    #[serde(default = "default_max_per_muscle")]
    pub max_per_muscle: usize,
    #[serde(default = "default_min_exercises")]
    pub min_exercises: usize,
    #[serde(default = "default_max_exercises")]
    pub max_exercises: usize,
    #[serde(default = "default_max_target_muscles")]
    pub max_target_muscles: usize,
}

fn default_max_per_muscle() -> usize {
    2
}
fn default_min_exercises() -> usize {
    MIN_EXERCISES
}
fn default_max_exercises() -> usize {
    MAX_EXERCISES
}
fn default_max_target_muscles() -> usize {
    3
}

impl Default for ComposerLimits {
    fn default() -> Self {
        Self {
            max_per_muscle: default_max_per_muscle(),
            min_exercises: default_min_exercises(),
            max_exercises: default_max_exercises(),
            max_target_muscles: default_max_target_muscles(),
        }
    }
}

// ─── Target Selection ───────────────────────────────────────────────────────

/// Where the target muscles came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionSource {
    Explicit,
    Recovery,
    Default,
}

/// Result of target-muscle selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSelection {
    /// Ordered, deduplicated, at most `max_target_muscles`.
    pub muscles: Vec<String>,
    pub source: SelectionSource,
    /// Undertrained muscles among `muscles`.
    pub undertrained: Vec<String>,
    /// Explicitly requested muscles removed for being overworked.
    pub dropped_overworked: Vec<String>,
    /// Every overworked muscle, avoided during backfill.
    pub avoided: BTreeSet<String>,
}

// ─── Composer ───────────────────────────────────────────────────────────────

/// Builds bounded workouts from a shared catalog.
#[derive(Debug, Clone)]
pub struct WorkoutComposer {
    catalog: Arc<ExerciseCatalog>,
    limits: ComposerLimits,
}

impl WorkoutComposer {
    pub fn new(catalog: Arc<ExerciseCatalog>, limits: ComposerLimits) -> Self {
        Self { catalog, limits }
    }

    pub fn limits(&self) -> ComposerLimits {
        self.limits
    }

    /// Choose at most `max_target_muscles` muscles to train.
    ///
    /// Explicit muscles win but overworked ones are removed. If that leaves
    /// nothing, selection falls through to the recovery-based order.
    pub fn select_target_muscles(
        &self,
        classification: &RecoveryClassification,
        explicit: Option<&[String]>,
    ) -> TargetSelection {
        let cap = self.limits.max_target_muscles;
        let avoided = classification.overworked.clone();
        let mut dropped_overworked = Vec::new();

        if let Some(requested) = explicit.filter(|r| !r.is_empty()) {
            let mut muscles: Vec<String> = Vec::new();
            for muscle in requested {
                if classification.is_overworked(muscle) {
                    if !dropped_overworked.contains(muscle) {
                        dropped_overworked.push(muscle.clone());
                    }
                } else if !muscles.contains(muscle) {
                    muscles.push(muscle.clone());
                }
            }
            muscles.truncate(cap);

            if !muscles.is_empty() {
                let undertrained = muscles
                    .iter()
                    .filter(|m| classification.undertrained.contains(*m))
                    .cloned()
                    .collect();
                return TargetSelection {
                    muscles,
                    source: SelectionSource::Explicit,
                    undertrained,
                    dropped_overworked,
                    avoided,
                };
            }
            tracing::info!(
                dropped = ?dropped_overworked,
                "all requested muscles are overworked, selecting by recovery"
            );
        }

        let undertrained: Vec<String> = classification
            .undertrained
            .iter()
            .take(MAX_UNDERTRAINED_TARGETS)
            .cloned()
            .collect();
        let mut muscles = undertrained.clone();
        muscles.extend(
            classification
                .recovered
                .iter()
                .take(MAX_RECOVERED_TARGETS)
                .cloned(),
        );
        muscles.truncate(cap);

        if !muscles.is_empty() {
            return TargetSelection {
                undertrained: undertrained.into_iter().filter(|m| muscles.contains(m)).collect(),
                muscles,
                source: SelectionSource::Recovery,
                dropped_overworked,
                avoided,
            };
        }

        let mut muscles: Vec<String> = DEFAULT_TARGETS
            .iter()
            .filter(|m| !classification.is_overworked(m))
            .map(|m| m.to_string())
            .collect();
        muscles.truncate(cap);
        TargetSelection {
            muscles,
            source: SelectionSource::Default,
            undertrained: Vec::new(),
            dropped_overworked,
            avoided,
        }
    }

    /// Pick catalog entries for the targets.
    ///
    /// Per muscle: entries working it (primary movers first) whose equipment
    /// is available, up to `max_per_muscle`. Bodyweight is always available.
    /// Short lists are backfilled with bodyweight entries, preferring ones
    /// that spare `avoid` muscles. The result is capped at `max_exercises`.
    pub fn select_exercises(
        &self,
        targets: &[String],
        avoid: &BTreeSet<String>,
        equipment: &[Equipment],
        level: FitnessLevel,
    ) -> Vec<&ExerciseCatalogEntry> {
        let available = |e: &ExerciseCatalogEntry| e.is_bodyweight() || equipment.contains(&e.equipment);
        let mut picked: Vec<&ExerciseCatalogEntry> = Vec::new();

        for muscle in targets {
            let mut candidates: Vec<&ExerciseCatalogEntry> = self
                .catalog
                .entries()
                .iter()
                .filter(|e| e.works(muscle) && available(*e))
                .filter(|e| !picked.iter().any(|p| p.id == e.id))
                .collect();
            candidates.sort_by_key(|e| (!e.primary_muscles.contains(muscle), level_rank(e, level)));
            picked.extend(candidates.into_iter().take(self.limits.max_per_muscle));
        }

        if picked.len() < self.limits.min_exercises {
            let spares = |e: &ExerciseCatalogEntry| e.primary_muscles.is_disjoint(avoid);
            for pass_spares_avoided in [true, false] {
                for entry in self.catalog.entries() {
                    if picked.len() >= self.limits.min_exercises {
                        break;
                    }
                    if entry.is_bodyweight()
                        && (!pass_spares_avoided || spares(entry))
                        && !picked.iter().any(|p| p.id == entry.id)
                    {
                        picked.push(entry);
                    }
                }
            }
        }

        picked.truncate(self.limits.max_exercises);
        picked
    }

    /// Turn selected entries into a workout with the level's set scheme.
    pub fn build_workout(
        &self,
        selection: &TargetSelection,
        exercises: &[&ExerciseCatalogEntry],
        level: FitnessLevel,
    ) -> Result<GeneratedWorkout, ComposeError> {
        if exercises.len() < self.limits.min_exercises {
            return Err(ComposeError::InsufficientExercises {
                found: exercises.len(),
                required: self.limits.min_exercises,
            });
        }

        let (sets, reps) = level.set_scheme();
        let exercises: Vec<WorkoutExercise> = exercises
            .iter()
            .take(self.limits.max_exercises)
            .map(|entry| {
                let mut exercise = WorkoutExercise::with_scheme(&entry.id, &entry.name, sets, reps);
                exercise.target_muscles = entry.primary_muscles.iter().cloned().collect();
                exercise
            })
            .collect();

        Ok(GeneratedWorkout {
            name: workout_name(&selection.muscles),
            estimated_duration_minutes: GeneratedWorkout::estimate_duration(exercises.len(), sets),
            target_muscles: selection.muscles.iter().cloned().collect(),
            difficulty: level,
            reasoning: explain(selection, exercises.len(), level),
            exercises,
        })
    }

    /// Select exercises for `selection` and build the workout. Falls back to
    /// the bodyweight routine instead of failing.
    pub fn compose(
        &self,
        selection: &TargetSelection,
        equipment: &[Equipment],
        level: FitnessLevel,
    ) -> GeneratedWorkout {
        let exercises = self.select_exercises(&selection.muscles, &selection.avoided, equipment, level);
        match self.build_workout(selection, &exercises, level) {
            Ok(workout) => {
                tracing::info!(
                    targets = ?selection.muscles,
                    exercises = workout.exercises.len(),
                    level = %level,
                    "composed workout"
                );
                workout
            }
            Err(e) => {
                tracing::warn!(error = %e, "composer failed, using fallback workout");
                fallback_workout(level)
            }
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Beginners see bodyweight and machine movements first.
fn level_rank(entry: &ExerciseCatalogEntry, level: FitnessLevel) -> u8 {
    match (level, entry.equipment) {
        (FitnessLevel::Beginner, Equipment::Bodyweight | Equipment::Machine) => 0,
        (FitnessLevel::Beginner, _) => 1,
        _ => 0,
    }
}

fn workout_name(muscles: &[String]) -> String {
    if muscles.is_empty() {
        return "Full Body Workout".to_string();
    }
    let titled: Vec<String> = muscles.iter().map(|m| title_case(m)).collect();
    format!("{} Focus", titled.join(" & "))
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>().replace('_', " "),
        None => String::new(),
    }
}

fn explain(selection: &TargetSelection, exercise_count: usize, level: FitnessLevel) -> String {
    let mut parts = Vec::new();
    match selection.source {
        SelectionSource::Explicit => {
            parts.push(format!("Honored your request for {}.", selection.muscles.join(", ")));
        }
        SelectionSource::Recovery if !selection.undertrained.is_empty() => {
            parts.push(format!(
                "Prioritized undertrained muscles: {}.",
                selection.undertrained.join(", ")
            ));
        }
        SelectionSource::Recovery => {
            parts.push("Focused on well-recovered muscles.".to_string());
        }
        SelectionSource::Default => {
            parts.push("No recovery data stood out, so this is a balanced session.".to_string());
        }
    }
    if !selection.dropped_overworked.is_empty() {
        parts.push(format!(
            "Left out {} because recent volume is high.",
            selection.dropped_overworked.join(", ")
        ));
    } else if !selection.avoided.is_empty() {
        let avoided: Vec<&str> = selection.avoided.iter().map(String::as_str).collect();
        parts.push(format!("Giving {} time to recover.", avoided.join(", ")));
    }
    let (sets, reps) = level.set_scheme();
    parts.push(format!(
        "Targeting {} with {exercise_count} exercises at {level} level ({sets}×{reps}).",
        if selection.muscles.is_empty() {
            "the whole body".to_string()
        } else {
            selection.muscles.join(", ")
        }
    ));
    parts.join(" ")
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::recovery::{MuscleVolumeMap, RecoveryAnalyzer};

    fn composer() -> WorkoutComposer {
        WorkoutComposer::new(
            Arc::new(ExerciseCatalog::builtin().unwrap()),
            ComposerLimits::default(),
        )
    }

    fn classify(pairs: &[(&str, f64)]) -> RecoveryClassification {
        let volumes: MuscleVolumeMap = pairs.iter().map(|(m, v)| (m.to_string(), *v)).collect();
        RecoveryAnalyzer::default().analyze(&volumes)
    }

    #[test]
    fn test_overworked_chest_excluded_from_targets() {
        let c = classify(&[("chest", 1200.0), ("back", 150.0), ("legs", 500.0)]);
        let selection = composer().select_target_muscles(&c, None);
        assert_eq!(selection.muscles, vec!["back".to_string(), "legs".to_string()]);
        assert_eq!(selection.source, SelectionSource::Recovery);
        assert_eq!(selection.undertrained, vec!["back".to_string()]);
    }

    #[test]
    fn test_targets_capped_at_three() {
        let c = classify(&[
            ("a", 0.0),
            ("b", 10.0),
            ("c", 20.0),
            ("d", 500.0),
            ("e", 600.0),
        ]);
        let selection = composer().select_target_muscles(&c, None);
        assert_eq!(selection.muscles, vec!["a", "b", "d"]);
    }

    #[test]
    fn test_explicit_request_filters_overworked() {
        let c = classify(&[("chest", 1500.0), ("shoulders", 300.0)]);
        let requested = vec!["chest".to_string(), "shoulders".to_string()];
        let selection = composer().select_target_muscles(&c, Some(&requested));
        assert_eq!(selection.muscles, vec!["shoulders".to_string()]);
        assert_eq!(selection.source, SelectionSource::Explicit);
        assert_eq!(selection.dropped_overworked, vec!["chest".to_string()]);
    }

    #[test]
    fn test_explicit_all_overworked_falls_through() {
        let c = classify(&[("chest", 1500.0), ("back", 100.0)]);
        let requested = vec!["chest".to_string()];
        let selection = composer().select_target_muscles(&c, Some(&requested));
        assert_eq!(selection.source, SelectionSource::Recovery);
        assert_eq!(selection.muscles, vec!["back".to_string()]);
        assert!(!selection.muscles.contains(&"chest".to_string()));
    }

    #[test]
    fn test_default_targets_skip_overworked() {
        let c = classify(&[("chest", 1500.0)]);
        let selection = composer().select_target_muscles(&c, None);
        assert_eq!(selection.source, SelectionSource::Default);
        assert_eq!(selection.muscles, vec!["back".to_string(), "legs".to_string()]);

        let empty = composer().select_target_muscles(&RecoveryClassification::default(), None);
        assert_eq!(empty.muscles, vec!["chest", "back", "legs"]);
    }

    #[test]
    fn test_overworked_never_selected_for_any_volume_map() {
        let comp = composer();
        let muscles = ["chest", "back", "legs", "shoulders", "core"];
        for seed in 0..64u32 {
            let pairs: Vec<(&str, f64)> = muscles
                .iter()
                .enumerate()
                .map(|(i, m)| (*m, f64::from((seed.wrapping_mul(37) + i as u32 * 411) % 1600)))
                .collect();
            let c = classify(&pairs);
            let selection = comp.select_target_muscles(&c, None);
            assert!(selection.muscles.len() <= 3);
            for m in &selection.muscles {
                assert!(!c.is_overworked(m), "seed {seed}: {m} overworked but selected");
            }
        }
    }

    #[test]
    fn test_select_exercises_two_per_muscle_bodyweight_only() {
        let comp = composer();
        let targets = vec!["back".to_string(), "legs".to_string()];
        let picked = comp.select_exercises(&targets, &BTreeSet::new(), &[], FitnessLevel::Intermediate);
        let ids: Vec<_> = picked.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["pull-ups", "inverted-row", "bodyweight-squat", "walking-lunge"]);
        assert!(picked.iter().all(|e| e.is_bodyweight()));
    }

    #[test]
    fn test_select_exercises_respects_equipment() {
        let comp = composer();
        let targets = vec!["chest".to_string()];
        let picked = comp.select_exercises(
            &targets,
            &BTreeSet::new(),
            &[Equipment::Barbell],
            FitnessLevel::Intermediate,
        );
        // two chest entries, then one bodyweight backfill
        assert_eq!(picked.len(), 3);
        assert_eq!(picked[0].id, "bench-press");
        assert!(picked.iter().all(|e| e.is_bodyweight() || e.equipment == Equipment::Barbell));
    }

    #[test]
    fn test_select_exercises_backfills_to_minimum_and_caps() {
        let comp = composer();
        let picked = comp.select_exercises(&[], &BTreeSet::new(), &[], FitnessLevel::Beginner);
        assert_eq!(picked.len(), 3);
        assert!(picked.iter().all(|e| e.is_bodyweight()));

        let many: Vec<String> = ["chest", "back", "legs", "core"].iter().map(|s| s.to_string()).collect();
        let capped = comp.select_exercises(&many, &BTreeSet::new(), &[], FitnessLevel::Advanced);
        assert_eq!(capped.len(), 6);
    }

    #[test]
    fn test_backfill_spares_avoided_muscles() {
        let comp = composer();
        let avoid: BTreeSet<String> = ["chest".to_string()].into_iter().collect();
        let picked = comp.select_exercises(&[], &avoid, &[], FitnessLevel::Intermediate);
        assert!(picked.iter().all(|e| !e.primary_muscles.contains("chest")));
    }

    #[test]
    fn test_build_workout_scheme_and_duration() {
        let comp = composer();
        let c = classify(&[("chest", 1200.0), ("back", 150.0), ("legs", 500.0)]);
        let selection = comp.select_target_muscles(&c, None);
        let workout = comp.compose(&selection, &[], FitnessLevel::Advanced);

        assert!(workout.is_within_bounds());
        assert!(workout.exercises.iter().all(|e| e.sets.len() == 4 && e.sets[0].reps == 12));
        let n = workout.exercises.len();
        assert_eq!(workout.estimated_duration_minutes, (5 * n + 2 * n * 4) as u32);
        assert!(workout.reasoning.contains("undertrained"));
        assert!(workout.reasoning.contains("chest"));
        assert_eq!(workout.name, "Back & Legs Focus");
    }

    #[test]
    fn test_compose_falls_back_when_catalog_too_small() {
        let tiny = ExerciseCatalog::from_json_str(
            r#"[{"id":"bench-press","name":"Bench Press","primaryMuscles":["chest"],"equipment":"barbell"}]"#,
        )
        .unwrap();
        let comp = WorkoutComposer::new(Arc::new(tiny), ComposerLimits::default());
        let selection = comp.select_target_muscles(&RecoveryClassification::default(), None);
        let workout = comp.compose(&selection, &[Equipment::Barbell], FitnessLevel::Beginner);
        assert_eq!(workout.name, "Bodyweight Fundamentals");
        assert_eq!(workout.exercises.len(), 3);
    }

    #[test]
    fn test_every_composed_workout_within_bounds() {
        let comp = composer();
        let all_equipment = [
            Equipment::Dumbbell,
            Equipment::Barbell,
            Equipment::Machine,
            Equipment::Cable,
        ];
        for muscle in ["chest", "back", "legs", "shoulders", "biceps", "triceps", "core", "calves", "neck"] {
            for equipment in [&[][..], &all_equipment[..]] {
                let c = classify(&[(muscle, 50.0)]);
                let selection = comp.select_target_muscles(&c, None);
                let w = comp.compose(&selection, equipment, FitnessLevel::Intermediate);
                assert!(w.is_within_bounds(), "{muscle}: {}", w.exercises.len());
            }
        }
    }
}
