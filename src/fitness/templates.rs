//! Canonical fixed workouts.
//!
//! Used in two places: the extractor's last-resort tier picks one from
//! body-part keywords in the text, and the composer falls back to the
//! bodyweight routine when it cannot build a plan.

use std::collections::BTreeSet;

use super::workout::{FitnessLevel, GeneratedWorkout, WorkoutExercise};

/// Body-part focus of a canonical workout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Chest,
    Legs,
    Shoulders,
    Arms,
    FullBody,
}

/// Keyword groups per template, checked in this order. Ties go to the
/// earlier template.
const TEMPLATE_KEYWORDS: &[(TemplateKind, &[&str])] = &[
    (TemplateKind::Chest, &["chest", "pec", "bench", "push up", "pushup"]),
    (
        TemplateKind::Legs,
        &["leg", "squat", "quad", "hamstring", "glute", "calf", "calves", "lunge"],
    ),
    (TemplateKind::Shoulders, &["shoulder", "delt", "overhead", "lateral raise"]),
    (TemplateKind::Arms, &["arm", "bicep", "tricep", "curl"]),
];

// ─── Matching ───────────────────────────────────────────────────────────────

/// Lowercase the text and keep only alphanumeric words, space-separated and
/// padded so that `" kw"` matches at a word start.
pub(crate) fn word_text(text: &str) -> String {
    let words: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    format!(" {} ", words.join(" "))
}

/// Whether `keyword` starts a word (or word sequence) in `padded`, which must
/// come from [`word_text`]. "curl" matches "curls", not "recurl".
pub(crate) fn has_keyword(padded: &str, keyword: &str) -> bool {
    padded.contains(&format!(" {keyword}"))
}

/// Pick a template from body-part keywords. Defaults to full body.
pub fn infer_template(text: &str) -> TemplateKind {
    let padded = word_text(text);
    let mut best = (TemplateKind::FullBody, 0usize);
    for (kind, keywords) in TEMPLATE_KEYWORDS {
        let hits = keywords.iter().filter(|kw| has_keyword(&padded, kw)).count();
        if hits > best.1 {
            best = (*kind, hits);
        }
    }
    best.0
}

// ─── Templates ──────────────────────────────────────────────────────────────

/// The canonical workout for a template kind.
pub fn canonical_workout(kind: TemplateKind) -> GeneratedWorkout {
    let (name, muscles, exercises): (&str, &[&str], &[(&str, &str)]) = match kind {
        TemplateKind::Chest => (
            "Chest Builder",
            &["chest", "triceps"],
            &[
                ("bench-press", "Bench Press"),
                ("incline-dumbbell-press", "Incline Dumbbell Press"),
                ("push-ups", "Push-ups"),
                ("dumbbell-fly", "Dumbbell Fly"),
            ],
        ),
        TemplateKind::Legs => (
            "Leg Day",
            &["legs", "glutes", "hamstrings"],
            &[
                ("barbell-squat", "Barbell Squat"),
                ("romanian-deadlift", "Romanian Deadlift"),
                ("walking-lunge", "Walking Lunge"),
                ("calf-raise", "Calf Raise"),
            ],
        ),
        TemplateKind::Shoulders => (
            "Shoulder Sculpt",
            &["shoulders"],
            &[
                ("overhead-press", "Overhead Press"),
                ("lateral-raise", "Lateral Raise"),
                ("face-pull", "Face Pull"),
                ("pike-push-ups", "Pike Push-ups"),
            ],
        ),
        TemplateKind::Arms => (
            "Arm Pump",
            &["biceps", "triceps"],
            &[
                ("dumbbell-curl", "Dumbbell Curl"),
                ("hammer-curl", "Hammer Curl"),
                ("skull-crusher", "Skull Crusher"),
                ("tricep-dips", "Tricep Dips"),
            ],
        ),
        TemplateKind::FullBody => (
            "Full Body Basics",
            &["chest", "back", "legs", "core"],
            &[
                ("bodyweight-squat", "Bodyweight Squat"),
                ("push-ups", "Push-ups"),
                ("inverted-row", "Inverted Row"),
                ("plank", "Plank"),
            ],
        ),
    };
    build(
        name,
        muscles,
        exercises,
        FitnessLevel::Intermediate,
        format!("Standard {} routine used when no exercise list could be read.", name.to_lowercase()),
    )
}

/// Fixed three-exercise bodyweight routine. Needs no equipment and no catalog.
pub fn fallback_workout(level: FitnessLevel) -> GeneratedWorkout {
    build(
        "Bodyweight Fundamentals",
        &["chest", "legs", "core"],
        &[
            ("push-ups", "Push-ups"),
            ("bodyweight-squat", "Bodyweight Squat"),
            ("plank", "Plank"),
        ],
        level,
        "Fallback bodyweight routine: a balanced plan that needs no equipment.".to_string(),
    )
}

fn build(
    name: &str,
    muscles: &[&str],
    exercises: &[(&str, &str)],
    level: FitnessLevel,
    reasoning: String,
) -> GeneratedWorkout {
    let (sets, reps) = level.set_scheme();
    let exercises: Vec<WorkoutExercise> = exercises
        .iter()
        .map(|(id, display)| WorkoutExercise::with_scheme(*id, *display, sets, reps))
        .collect();
    GeneratedWorkout {
        name: name.to_string(),
        estimated_duration_minutes: GeneratedWorkout::estimate_duration(exercises.len(), sets),
        exercises,
        target_muscles: muscles.iter().map(|m| m.to_string()).collect::<BTreeSet<_>>(),
        difficulty: level,
        reasoning,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_template_by_keywords() {
        assert_eq!(infer_template("something for my chest and pecs"), TemplateKind::Chest);
        assert_eq!(infer_template("Squats and lunges today"), TemplateKind::Legs);
        assert_eq!(infer_template("delts please"), TemplateKind::Shoulders);
        assert_eq!(infer_template("bicep curls"), TemplateKind::Arms);
        assert_eq!(infer_template("just move"), TemplateKind::FullBody);
    }

    #[test]
    fn test_infer_template_prefers_more_hits() {
        // one chest hit vs two leg hits
        assert_eq!(infer_template("bench, then squat and lunge"), TemplateKind::Legs);
    }

    #[test]
    fn test_keyword_matching_is_word_anchored() {
        let padded = word_text("That harms nobody");
        assert!(!has_keyword(&padded, "arm"));
        assert!(has_keyword(&word_text("Curls!"), "curl"));
    }

    #[test]
    fn test_canonical_workouts_are_within_bounds() {
        for kind in [
            TemplateKind::Chest,
            TemplateKind::Legs,
            TemplateKind::Shoulders,
            TemplateKind::Arms,
            TemplateKind::FullBody,
        ] {
            let w = canonical_workout(kind);
            assert!(w.is_within_bounds(), "{kind:?}");
            assert_eq!(w.estimated_duration_minutes, GeneratedWorkout::estimate_duration(4, 3));
        }
    }

    #[test]
    fn test_fallback_workout_is_three_bodyweight_exercises() {
        let w = fallback_workout(FitnessLevel::Advanced);
        let ids: Vec<_> = w.exercises.iter().map(|e| e.catalog_id.as_str()).collect();
        assert_eq!(ids, vec!["push-ups", "bodyweight-squat", "plank"]);
        assert!(w.exercises.iter().all(|e| e.sets.len() == 4 && e.sets[0].reps == 12));
    }
}
