//! Tiered recovery of workouts from unreliable model text.
//!
//! Strategies run in order and the first one that yields at least one
//! exercise wins:
//! 1. JSON found as-is (whole text, fenced blocks, balanced spans)
//! 2. The same candidates after normalization (comments, quotes, commas)
//! 3. Truncated JSON closed and trimmed back until it parses
//! 4. Prose patterns ("3 sets of 10 reps Push-ups", "Squats (4x8)", ...)
//! 5. Body-part keywords mapped to a canonical workout
//!
//! Exercises with no set information come back with an empty `sets` list;
//! callers fill them from the user's level. Names are not resolved here.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::templates::{canonical_workout, infer_template};
use super::workout::{FitnessLevel, GeneratedWorkout, WorkoutExercise, WorkoutSet};
use crate::inference::json_repair::{
    balanced_spans, fenced_blocks, normalize_json, repair_truncated_json,
};

/// Reps used when a set count is known but reps are not.
const DEFAULT_REPS: u32 = 10;

/// Upper bound on sets per exercise read from model output.
const MAX_SETS_PER_EXERCISE: u32 = 10;

/// Longest exercise name (in words) taken from prose.
const MAX_NAME_WORDS: usize = 4;

/// Name given to extracted workouts that carry none.
pub const DEFAULT_WORKOUT_NAME: &str = "Custom Workout";

// ─── Types ──────────────────────────────────────────────────────────────────

/// Which strategy produced an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionTier {
    Json,
    NormalizedJson,
    TruncationRepair,
    ProsePattern,
    KeywordFallback,
}

impl ExtractionTier {
    /// 1-based position in the strategy chain.
    pub fn number(self) -> u8 {
        match self {
            ExtractionTier::Json => 1,
            ExtractionTier::NormalizedJson => 2,
            ExtractionTier::TruncationRepair => 3,
            ExtractionTier::ProsePattern => 4,
            ExtractionTier::KeywordFallback => 5,
        }
    }

    /// How much the recovered structure can be trusted.
    pub fn base_confidence(self) -> f64 {
        match self {
            ExtractionTier::Json => 0.95,
            ExtractionTier::NormalizedJson => 0.85,
            ExtractionTier::TruncationRepair => 0.75,
            ExtractionTier::ProsePattern => 0.6,
            ExtractionTier::KeywordFallback => 0.4,
        }
    }
}

impl fmt::Display for ExtractionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtractionTier::Json => "json",
            ExtractionTier::NormalizedJson => "normalized_json",
            ExtractionTier::TruncationRepair => "truncation_repair",
            ExtractionTier::ProsePattern => "prose_pattern",
            ExtractionTier::KeywordFallback => "keyword_fallback",
        };
        f.write_str(s)
    }
}

/// A recovered workout and the tier that recovered it.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub workout: GeneratedWorkout,
    pub tier: ExtractionTier,
}

type Strategy = fn(&str) -> Option<GeneratedWorkout>;

const STRATEGIES: &[(ExtractionTier, Strategy)] = &[
    (ExtractionTier::Json, parse_embedded_json),
    (ExtractionTier::NormalizedJson, parse_normalized_json),
    (ExtractionTier::TruncationRepair, parse_truncated_json),
    (ExtractionTier::ProsePattern, parse_prose),
    (ExtractionTier::KeywordFallback, keyword_fallback),
];

// ─── Entry Point ────────────────────────────────────────────────────────────

/// Recover a workout from model text.
///
/// Returns `None` only for empty or whitespace-only text; any other input
/// reaches at least the keyword fallback.
pub fn extract_workout(raw: &str) -> Option<Extraction> {
    if raw.trim().is_empty() {
        return None;
    }

    for (tier, strategy) in STRATEGIES {
        if let Some(workout) = strategy(raw) {
            tracing::info!(
                tier = tier.number(),
                strategy = %tier,
                exercises = workout.exercises.len(),
                "extracted workout from model output"
            );
            return Some(Extraction {
                workout,
                tier: *tier,
            });
        }
        tracing::debug!(strategy = %tier, "extraction strategy found nothing");
    }
    None
}

// ─── JSON Tiers ─────────────────────────────────────────────────────────────

/// Substrings that might hold a complete JSON workout, most specific last.
fn json_candidates(text: &str) -> Vec<&str> {
    let mut candidates = vec![text.trim()];
    candidates.extend(fenced_blocks(text));
    candidates.extend(balanced_spans(text, '{', '}'));
    candidates.extend(balanced_spans(text, '[', ']'));
    candidates
}

fn parse_embedded_json(text: &str) -> Option<GeneratedWorkout> {
    json_candidates(text).into_iter().find_map(|candidate| {
        serde_json::from_str::<Value>(candidate)
            .ok()
            .and_then(|value| workout_from_value(&value))
    })
}

fn parse_normalized_json(text: &str) -> Option<GeneratedWorkout> {
    json_candidates(text).into_iter().find_map(|candidate| {
        serde_json::from_str::<Value>(&normalize_json(candidate))
            .ok()
            .and_then(|value| workout_from_value(&value))
    })
}

fn parse_truncated_json(text: &str) -> Option<GeneratedWorkout> {
    let mut candidates: Vec<&str> = fenced_blocks(text);
    for open in ['{', '['] {
        if let Some(start) = text.find(open) {
            candidates.push(&text[start..]);
        }
    }

    candidates.into_iter().find_map(|candidate| {
        let normalized = normalize_json(candidate);
        let trimmed = normalized.trim_start();
        if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
            return None;
        }
        repair_truncated_json(trimmed).and_then(|value| workout_from_value(&value))
    })
}

// ─── Tolerant Mapping ───────────────────────────────────────────────────────

/// First present, non-null field among `keys`.
fn field<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null())
}

fn field_str<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    field(map, keys)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Leading integer of a number or string: `8`, `"8"`, `"8-12"`, `"10 reps"`.
fn leading_number(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(|v| v.min(u32::MAX as u64) as u32)
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f.round() as u32)),
        Value::String(s) => {
            let digits: String = s.trim().chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

fn string_list(value: &Value) -> Vec<String> {
    let items: Vec<&str> = match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    items
        .into_iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Map any of the accepted JSON shapes to a workout. `None` when no
/// exercise with a name can be found.
fn workout_from_value(value: &Value) -> Option<GeneratedWorkout> {
    match value {
        Value::Array(items) => build_from_parts(None, items),
        Value::Object(map) => {
            if let Some(inner) = field(map, &["workout", "plan"]).filter(|v| v.is_object()) {
                return workout_from_value(inner);
            }
            let items = field(
                map,
                &["exercises", "exerciseList", "exercise_list", "workout", "plan"],
            )?
            .as_array()?;
            build_from_parts(Some(map), items)
        }
        _ => None,
    }
}

fn build_from_parts(meta: Option<&Map<String, Value>>, items: &[Value]) -> Option<GeneratedWorkout> {
    let exercises: Vec<WorkoutExercise> = items.iter().filter_map(exercise_from_value).collect();
    if exercises.is_empty() {
        return None;
    }

    let empty = Map::new();
    let meta = meta.unwrap_or(&empty);

    let mut target_muscles: BTreeSet<String> = field(meta, &["targetMuscles", "target_muscles", "muscles"])
        .map(string_list)
        .unwrap_or_default()
        .into_iter()
        .collect();
    if target_muscles.is_empty() {
        target_muscles = exercises
            .iter()
            .flat_map(|e| e.target_muscles.iter().cloned())
            .collect();
    }

    let mut workout = GeneratedWorkout {
        name: field_str(meta, &["name", "title", "workoutName", "workout_name"])
            .unwrap_or(DEFAULT_WORKOUT_NAME)
            .to_string(),
        exercises,
        estimated_duration_minutes: 0,
        target_muscles,
        difficulty: field_str(meta, &["difficulty", "level", "fitnessLevel", "fitness_level"])
            .and_then(FitnessLevel::from_text)
            .unwrap_or_default(),
        reasoning: field_str(meta, &["reasoning", "rationale", "notes", "description"])
            .unwrap_or_default()
            .to_string(),
    };

    match field(
        meta,
        &[
            "estimatedDurationMinutes",
            "estimated_duration_minutes",
            "durationMinutes",
            "duration_minutes",
            "duration",
        ],
    )
    .and_then(leading_number)
    {
        Some(minutes) => workout.estimated_duration_minutes = minutes,
        None => workout.recompute_duration(),
    }
    Some(workout)
}

fn exercise_from_value(value: &Value) -> Option<WorkoutExercise> {
    let map = match value {
        Value::String(name) => {
            let name = name.trim();
            return (!name.is_empty()).then(|| WorkoutExercise::with_scheme("", name, 0, 0));
        }
        Value::Object(map) => map,
        _ => return None,
    };

    let name = field_str(
        map,
        &["name", "exercise", "exerciseName", "exercise_name", "title"],
    )?;
    let exercise_reps = field(map, &["reps", "repetitions", "repRange", "rep_range"]).and_then(leading_number);

    let sets = match field(map, &["sets", "setList", "set_list"]) {
        Some(Value::Array(items)) => items
            .iter()
            .take(MAX_SETS_PER_EXERCISE as usize)
            .filter_map(|item| set_from_value(item, exercise_reps))
            .collect(),
        Some(count) => {
            let count = leading_number(count).unwrap_or(0).min(MAX_SETS_PER_EXERCISE);
            let reps = exercise_reps.unwrap_or(DEFAULT_REPS);
            (0..count).map(|_| WorkoutSet::working(reps)).collect()
        }
        None => Vec::new(),
    };

    Some(WorkoutExercise {
        catalog_id: field_str(map, &["catalogId", "catalog_id", "id"])
            .unwrap_or_default()
            .to_string(),
        name: name.to_string(),
        sets,
        target_muscles: field(
            map,
            &["targetMuscles", "target_muscles", "muscles", "primaryMuscles", "primary_muscles"],
        )
        .map(string_list)
        .unwrap_or_default(),
        unmapped: false,
    })
}

fn set_from_value(value: &Value, exercise_reps: Option<u32>) -> Option<WorkoutSet> {
    match value {
        Value::Object(map) => {
            let reps = field(map, &["reps", "repetitions"])
                .and_then(leading_number)
                .or(exercise_reps)
                .unwrap_or(DEFAULT_REPS);
            Some(WorkoutSet {
                reps,
                weight: field(map, &["weight", "weightKg", "weight_kg"]).and_then(Value::as_f64),
                rpe: field(map, &["rpe", "RPE"])
                    .and_then(Value::as_f64)
                    .map(|r| r as f32),
                is_warmup: field(map, &["isWarmup", "is_warmup", "warmup"])
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                is_executed: field(map, &["isExecuted", "is_executed"])
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            })
        }
        other => leading_number(other).map(WorkoutSet::working),
    }
}

// ─── Prose Tier ─────────────────────────────────────────────────────────────

/// "Do 3 sets of 10 reps Push-ups", "4 sets x 8-12 reps of Squats".
static SETS_OF_REPS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\d+)[ \t]*sets?[ \t]*(?:of|x|×)[ \t]*(\d+)(?:[ \t]*(?:-|–|to)[ \t]*\d+)?[ \t]*(?:reps?|repetitions)?[ \t]+([A-Za-z][A-Za-z' \-]*[A-Za-z])",
    )
    .unwrap()
});

/// "Squats: 3x10", "- Lunges - 3 sets of 12", "1. **Plank**: 3 x 30".
static NAME_COLON_SCHEME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:[-*•+]|\d+[.)])?[ \t]*\**[ \t]*([A-Za-z][A-Za-z' \-]*[A-Za-z])[ \t]*\**[ \t]*(?::|-|–)[ \t]*\**[ \t]*(\d+)[ \t]*(?:x|×|sets?[ \t]*(?:of|x|×)?)[ \t]*(\d+)",
    )
    .unwrap()
});

/// "Bench Press (4x8)", "Push-ups (3 × 12 reps)".
static NAME_PAREN_SCHEME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([A-Za-z][A-Za-z' \-]*[A-Za-z])[ \t]*\([ \t]*(\d+)[ \t]*[x×][ \t]*(\d+)[^)\n]*\)")
        .unwrap()
});

/// "**Exercise 2: Goblet Squat**" heading, with details on following lines.
static EXERCISE_HEADER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:#+[ \t]*)?\**[ \t]*Exercise[ \t]+\d+[ \t]*[:.\-][ \t]*([^*\n]+?)[ \t]*\**[ \t]*$")
        .unwrap()
});

static SETS_LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:[-*•][ \t]*)?\**sets?\**[ \t]*:[ \t]*\**[ \t]*(\d+)").unwrap()
});

static REPS_LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:[-*•][ \t]*)?\**reps?\**[ \t]*:[ \t]*\**[ \t]*(\d+)").unwrap()
});

/// Words stripped from either end of a prose name.
const FILLER_WORDS: &[&str] = &[
    "and", "by", "do", "each", "finally", "finish", "followed", "next", "of", "perform", "rep",
    "reps", "some", "start", "the", "then", "try", "with",
];

/// Which end of an over-long name to keep.
#[derive(Clone, Copy)]
enum KeepWords {
    Leading,
    Trailing,
}

fn clean_name(raw: &str, keep: KeepWords) -> Option<String> {
    let words: Vec<&str> = raw
        .split_whitespace()
        .map(|w| w.trim_matches('*'))
        .filter(|w| !w.is_empty())
        .collect();
    let is_filler = |w: &str| FILLER_WORDS.contains(&w.to_lowercase().as_str());

    let mut start = 0;
    let mut end = words.len();
    while start < end && is_filler(words[start]) {
        start += 1;
    }
    while end > start && is_filler(words[end - 1]) {
        end -= 1;
    }

    let words = &words[start..end];
    let words = match keep {
        KeepWords::Leading => &words[..words.len().min(MAX_NAME_WORDS)],
        KeepWords::Trailing => &words[words.len().saturating_sub(MAX_NAME_WORDS)..],
    };
    let name = words.join(" ");
    (name.chars().filter(|c| c.is_alphabetic()).count() >= 3).then_some(name)
}

fn parse_count(text: &str) -> Option<u32> {
    text.parse::<u32>().ok().map(|n| n.min(MAX_SETS_PER_EXERCISE))
}

struct ProseMatch {
    offset: usize,
    name: String,
    sets: Option<u32>,
    reps: Option<u32>,
}

fn parse_prose(text: &str) -> Option<GeneratedWorkout> {
    let mut found: Vec<ProseMatch> = Vec::new();

    for caps in SETS_OF_REPS_REGEX.captures_iter(text) {
        if let (Some(whole), Some(name)) = (caps.get(0), clean_name(&caps[3], KeepWords::Leading)) {
            found.push(ProseMatch {
                offset: whole.start(),
                name,
                sets: parse_count(&caps[1]),
                reps: caps[2].parse().ok(),
            });
        }
    }

    for regex in [&*NAME_COLON_SCHEME_REGEX, &*NAME_PAREN_SCHEME_REGEX] {
        for caps in regex.captures_iter(text) {
            if let (Some(whole), Some(name)) = (caps.get(0), clean_name(&caps[1], KeepWords::Trailing)) {
                found.push(ProseMatch {
                    offset: whole.start(),
                    name,
                    sets: parse_count(&caps[2]),
                    reps: caps[3].parse().ok(),
                });
            }
        }
    }

    let headers: Vec<_> = EXERCISE_HEADER_REGEX.captures_iter(text).collect();
    for (i, caps) in headers.iter().enumerate() {
        let (Some(whole), Some(name)) = (caps.get(0), clean_name(&caps[1], KeepWords::Leading)) else {
            continue;
        };
        let body_end = headers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(text.len());
        let body = &text[whole.end()..body_end];
        found.push(ProseMatch {
            offset: whole.start(),
            name,
            sets: SETS_LINE_REGEX.captures(body).and_then(|c| parse_count(&c[1])),
            reps: REPS_LINE_REGEX.captures(body).and_then(|c| c[1].parse().ok()),
        });
    }

    found.sort_by_key(|m| m.offset);
    let mut seen = HashSet::new();
    let exercises: Vec<WorkoutExercise> = found
        .into_iter()
        .filter(|m| seen.insert(m.name.to_lowercase()))
        .map(|m| match (m.sets, m.reps) {
            (None, None) => WorkoutExercise::with_scheme("", m.name, 0, 0),
            (sets, reps) => WorkoutExercise::with_scheme(
                "",
                m.name,
                sets.unwrap_or(FitnessLevel::default().set_scheme().0),
                reps.unwrap_or(DEFAULT_REPS),
            ),
        })
        .collect();

    if exercises.is_empty() {
        return None;
    }

    let mut workout = GeneratedWorkout {
        name: DEFAULT_WORKOUT_NAME.to_string(),
        exercises,
        estimated_duration_minutes: 0,
        target_muscles: BTreeSet::new(),
        difficulty: FitnessLevel::default(),
        reasoning: String::new(),
    };
    workout.recompute_duration();
    Some(workout)
}

// ─── Keyword Tier ───────────────────────────────────────────────────────────

fn keyword_fallback(text: &str) -> Option<GeneratedWorkout> {
    let kind = infer_template(text);
    tracing::debug!(template = ?kind, "no structure found, using canonical workout");
    Some(canonical_workout(kind))
}

// ─── Tests ──────────────────────────────────────────────────────────────────
