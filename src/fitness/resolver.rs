//! Exercise name resolution: maps free-form names onto catalog entries.
//!
//! LLM output names exercises however it likes ("Bent-over Rows", "DB curls",
//! "Barbell Bench"). Resolution is order-based, first match wins:
//! 1. exact match against the curated alias table, catalog ids and names
//! 2. substring match against aliases (either direction)
//! 3. substring match against catalog display names (either direction)
//!
//! Names that resolve nowhere become ad hoc, unmapped exercises.

use std::sync::Arc;

use super::catalog::{ExerciseCatalog, ExerciseCatalogEntry};
use super::workout::WorkoutExercise;

/// Inputs shorter than this skip substring matching ("ab", "b").
const MIN_PARTIAL_LEN: usize = 3;

/// Muscle attributed to unmapped exercises with no other hint.
const DEFAULT_UNMAPPED_MUSCLE: &str = "full_body";

/// Free-form name → canonical catalog id. More specific phrasings come first
/// because substring matching walks the table in order.
const EXERCISE_ALIASES: &[(&str, &str)] = &[
    ("bent-over rows", "barbell-row"),
    ("bent over row", "barbell-row"),
    ("barbell rows", "barbell-row"),
    ("pendlay row", "barbell-row"),
    ("one arm dumbbell row", "dumbbell-row"),
    ("single arm row", "dumbbell-row"),
    ("dumbbell rows", "dumbbell-row"),
    ("cable rows", "seated-cable-row"),
    ("australian pull-ups", "inverted-row"),
    ("bodyweight rows", "inverted-row"),
    ("lat pull-downs", "lat-pulldown"),
    ("pulldowns", "lat-pulldown"),
    ("chin ups", "chin-ups"),
    ("chinups", "chin-ups"),
    ("pull ups", "pull-ups"),
    ("pullups", "pull-ups"),
    ("incline press", "incline-dumbbell-press"),
    ("flat bench", "bench-press"),
    ("barbell bench", "bench-press"),
    ("chest press", "bench-press"),
    ("bench", "bench-press"),
    ("pec fly", "dumbbell-fly"),
    ("chest flyes", "dumbbell-fly"),
    ("flyes", "dumbbell-fly"),
    ("cable flyes", "cable-crossover"),
    ("diamond pushups", "diamond-push-ups"),
    ("close grip push-ups", "diamond-push-ups"),
    ("pike pushups", "pike-push-ups"),
    ("pushups", "push-ups"),
    ("push ups", "push-ups"),
    ("press-ups", "push-ups"),
    ("military press", "overhead-press"),
    ("ohp", "overhead-press"),
    ("shoulder press", "dumbbell-shoulder-press"),
    ("side raises", "lateral-raise"),
    ("lateral raises", "lateral-raise"),
    ("rear delt pulls", "face-pull"),
    ("pull-aparts", "band-pull-apart"),
    ("back squats", "barbell-squat"),
    ("barbell squats", "barbell-squat"),
    ("goblet squats", "goblet-squat"),
    ("split squats", "bulgarian-split-squat"),
    ("air squats", "bodyweight-squat"),
    ("squats", "bodyweight-squat"),
    ("lunges", "walking-lunge"),
    ("rdl", "romanian-deadlift"),
    ("stiff leg deadlift", "romanian-deadlift"),
    ("deadlifts", "deadlift"),
    ("hamstring curls", "leg-curl"),
    ("hip thrusts", "glute-bridge"),
    ("glute bridges", "glute-bridge"),
    ("calf raises", "calf-raise"),
    ("kb swings", "kettlebell-swing"),
    ("hammer curls", "hammer-curl"),
    ("barbell curls", "barbell-curl"),
    ("bicep curls", "dumbbell-curl"),
    ("db curls", "dumbbell-curl"),
    ("curls", "dumbbell-curl"),
    ("skull crushers", "skull-crusher"),
    ("lying tricep extension", "skull-crusher"),
    ("rope pushdowns", "tricep-pushdown"),
    ("triceps pushdowns", "tricep-pushdown"),
    ("dips", "tricep-dips"),
    ("plank hold", "plank"),
    ("forearm plank", "plank"),
    ("sit ups", "crunches"),
    ("situps", "crunches"),
    ("leg raises", "hanging-leg-raise"),
    ("russian twists", "russian-twist"),
    ("mountain climber", "mountain-climbers"),
];

// ─── Resolution ─────────────────────────────────────────────────────────────

/// Outcome of resolving a free-form exercise name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExerciseResolution<'a> {
    /// Exact alias, id or display-name match.
    Alias(&'a ExerciseCatalogEntry),
    /// An alias contained the input, or the input contained an alias.
    Partial {
        entry: &'a ExerciseCatalogEntry,
        alias: String,
    },
    /// A catalog display name matched by containment.
    Fuzzy(&'a ExerciseCatalogEntry),
    /// Nothing matched.
    Unmapped,
}

impl<'a> ExerciseResolution<'a> {
    pub fn entry(&self) -> Option<&'a ExerciseCatalogEntry> {
        match self {
            ExerciseResolution::Alias(e) | ExerciseResolution::Fuzzy(e) => Some(e),
            ExerciseResolution::Partial { entry, .. } => Some(entry),
            ExerciseResolution::Unmapped => None,
        }
    }
}

// ─── Resolver ───────────────────────────────────────────────────────────────

/// Resolves exercise names against a shared catalog.
#[derive(Debug, Clone)]
pub struct ExerciseResolver {
    catalog: Arc<ExerciseCatalog>,
    /// Normalized alias → catalog id, in table order. Aliases pointing at ids
    /// missing from the catalog are dropped.
    aliases: Vec<(String, String)>,
}

impl ExerciseResolver {
    pub fn new(catalog: Arc<ExerciseCatalog>) -> Self {
        let aliases = EXERCISE_ALIASES
            .iter()
            .filter(|(_, id)| catalog.get(id).is_some())
            .map(|(alias, id)| (normalize_name(alias), id.to_string()))
            .collect();
        Self { catalog, aliases }
    }

    pub fn catalog(&self) -> &ExerciseCatalog {
        &self.catalog
    }

    /// Resolve a name to a catalog entry, or `None` when unmapped.
    pub fn resolve(&self, name: &str) -> Option<&ExerciseCatalogEntry> {
        self.resolve_detailed(name).entry()
    }

    /// Resolve a name and report which strategy matched.
    pub fn resolve_detailed(&self, name: &str) -> ExerciseResolution<'_> {
        let input = normalize_name(name);
        if input.is_empty() {
            return ExerciseResolution::Unmapped;
        }

        // 1. Exact alias / id / name
        if let Some((_, id)) = self.aliases.iter().find(|(alias, _)| *alias == input) {
            if let Some(entry) = self.catalog.get(id) {
                return ExerciseResolution::Alias(entry);
            }
        }
        if let Some(entry) = self.catalog.entries().iter().find(|e| {
            normalize_name(&e.id) == input || normalize_name(&e.name) == input
        }) {
            return ExerciseResolution::Alias(entry);
        }

        if input.len() < MIN_PARTIAL_LEN {
            return ExerciseResolution::Unmapped;
        }

        // 2. Alias containment, either direction
        for (alias, id) in &self.aliases {
            if alias.contains(&input) || input.contains(alias.as_str()) {
                if let Some(entry) = self.catalog.get(id) {
                    return ExerciseResolution::Partial {
                        entry,
                        alias: alias.clone(),
                    };
                }
            }
        }

        // 3. Display-name containment, either direction
        for entry in self.catalog.entries() {
            let display = normalize_name(&entry.name);
            if display.contains(&input) || input.contains(display.as_str()) {
                return ExerciseResolution::Fuzzy(entry);
            }
        }

        ExerciseResolution::Unmapped
    }

    /// Link an extracted exercise to the catalog.
    ///
    /// Resolved exercises take the canonical id and name, and the entry's
    /// primary muscles when the source gave none. Unresolved ones get a
    /// `custom-*` id, keep their own name, and are flagged `unmapped`.
    pub fn link_exercise(&self, mut exercise: WorkoutExercise) -> WorkoutExercise {
        match self.resolve_detailed(&exercise.name) {
            ExerciseResolution::Unmapped => {
                tracing::warn!(
                    exercise = %exercise.name,
                    "exercise not found in catalog, using ad hoc entry"
                );
                exercise.catalog_id = unmapped_catalog_id(&exercise.name);
                if exercise.target_muscles.is_empty() {
                    exercise.target_muscles = vec![DEFAULT_UNMAPPED_MUSCLE.to_string()];
                }
                exercise.unmapped = true;
            }
            resolution => {
                if let Some(entry) = resolution.entry() {
                    tracing::debug!(
                        input = %exercise.name,
                        catalog_id = %entry.id,
                        "resolved exercise"
                    );
                    exercise.catalog_id = entry.id.clone();
                    exercise.name = entry.name.clone();
                    if exercise.target_muscles.is_empty() {
                        exercise.target_muscles = entry.primary_muscles.iter().cloned().collect();
                    }
                    exercise.unmapped = false;
                }
            }
        }
        exercise
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Lowercase, trim, treat `-`/`_` as spaces and collapse whitespace. Leading
/// list markers and trailing punctuation are dropped.
pub fn normalize_name(name: &str) -> String {
    let lower = name.to_lowercase().replace(['-', '_'], " ");
    let trimmed = lower.trim_matches(|c: char| !c.is_alphanumeric());
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stable id for an exercise that is not in the catalog.
pub fn unmapped_catalog_id(name: &str) -> String {
    let slug = normalize_name(name).replace(' ', "-");
    if slug.is_empty() {
        "custom-exercise".to_string()
    } else {
        format!("custom-{slug}")
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
