//! Reasoning state machine for workout turns.
//!
//! Steps run in a fixed order:
//! `analyze_intent → extract_parameters → validate_and_correct →
//! execute_workout_creation → generate_response → complete`.
//!
//! Every step takes the state by value and returns the next state. A failed
//! or panicking step leaves its input state untouched apart from
//! `error_state`, and the machine jumps to `generate_response`, which always
//! runs last and always sets the reply and confidence.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::LazyLock;

use futures::FutureExt;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::fitness::extractor::DEFAULT_WORKOUT_NAME;
use crate::fitness::templates::word_text;
use crate::fitness::{
    extract_workout, Equipment, ExerciseResolver, Extraction, ExtractionTier, FitnessLevel,
    GeneratedWorkout, MuscleVolumeMap, RecoveryAnalyzer, RecoveryClassification, TargetSelection,
    WorkoutComposer, WorkoutExercise, WorkoutSet,
};
use crate::inference::{
    ChatMessage, GenerationRequest, Generator, SamplingOverrides, SessionError, StreamSession,
};

use super::intent::{IntentAnalysis, IntentRouter};
use super::types::{HistoryEntry, HistoryRole, UserProfile};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Default bound on step transitions per run.
pub const DEFAULT_STEP_BUDGET: usize = 10;

const MIN_DURATION_MINUTES: u32 = 15;
const MAX_DURATION_MINUTES: u32 = 120;

/// Confidence of an unedited composer draft.
const DRAFT_CONFIDENCE: f64 = 0.7;
const CORRECTION_PENALTY: f64 = 0.1;
const UNMAPPED_PENALTY: f64 = 0.05;
const MIN_CONFIDENCE: f64 = 0.1;
const ERROR_CONFIDENCE: f64 = 0.2;

/// History entries included in the authoring prompt.
const AUTHORING_HISTORY_ENTRIES: usize = 6;

const AUTHORING_PROMPT: &str = "You are a strength coach writing a single workout. \
Reply with one JSON object and nothing else, shaped like \
{\"name\": string, \"exercises\": [{\"name\": string, \"sets\": number, \"reps\": number}], \
\"reasoning\": string}. Use between 3 and 6 exercises. Only use the listed equipment \
and never train a muscle listed under avoid.";

/// Spoken forms of muscle groups, mapped to catalog muscle ids.
const MUSCLE_SYNONYMS: &[(&str, &[&str])] = &[
    ("chest", &["chest"]),
    ("pec", &["chest"]),
    ("pecs", &["chest"]),
    ("pectorals", &["chest"]),
    ("back", &["back"]),
    ("lat", &["back"]),
    ("lats", &["back"]),
    ("leg", &["legs"]),
    ("legs", &["legs"]),
    ("quad", &["legs"]),
    ("quads", &["legs"]),
    ("quadriceps", &["legs"]),
    ("hamstring", &["hamstrings"]),
    ("hamstrings", &["hamstrings"]),
    ("glute", &["glutes"]),
    ("glutes", &["glutes"]),
    ("calf", &["calves"]),
    ("calves", &["calves"]),
    ("shoulder", &["shoulders"]),
    ("shoulders", &["shoulders"]),
    ("delt", &["shoulders"]),
    ("delts", &["shoulders"]),
    ("bicep", &["biceps"]),
    ("biceps", &["biceps"]),
    ("tricep", &["triceps"]),
    ("triceps", &["triceps"]),
    ("arm", &["biceps", "triceps"]),
    ("arms", &["biceps", "triceps"]),
    ("core", &["core"]),
    ("abs", &["core"]),
    ("abdominals", &["core"]),
    ("upper body", &["chest", "back", "shoulders"]),
    ("lower body", &["legs", "glutes", "hamstrings"]),
];

/// "30 min", "45-minute", "1.5 hours".
static DURATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,3}(?:\.\d+)?)\s*-?\s*(minutes?|mins?|hours?|hrs?|h)\b").unwrap()
});

// ─── Steps ──────────────────────────────────────────────────────────────────

/// Position in the reasoning chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningStep {
    AnalyzeIntent,
    ExtractParameters,
    ValidateAndCorrect,
    ExecuteWorkoutCreation,
    GenerateResponse,
    Complete,
}

impl ReasoningStep {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasoningStep::AnalyzeIntent => "analyze_intent",
            ReasoningStep::ExtractParameters => "extract_parameters",
            ReasoningStep::ValidateAndCorrect => "validate_and_correct",
            ReasoningStep::ExecuteWorkoutCreation => "execute_workout_creation",
            ReasoningStep::GenerateResponse => "generate_response",
            ReasoningStep::Complete => "complete",
        }
    }

    pub fn next(self) -> Self {
        match self {
            ReasoningStep::AnalyzeIntent => ReasoningStep::ExtractParameters,
            ReasoningStep::ExtractParameters => ReasoningStep::ValidateAndCorrect,
            ReasoningStep::ValidateAndCorrect => ReasoningStep::ExecuteWorkoutCreation,
            ReasoningStep::ExecuteWorkoutCreation => ReasoningStep::GenerateResponse,
            ReasoningStep::GenerateResponse | ReasoningStep::Complete => ReasoningStep::Complete,
        }
    }
}

impl fmt::Display for ReasoningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Errors ─────────────────────────────────────────────────────────────────

/// Why a step did not produce a next state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error("empty input")]
    EmptyInput,

    #[error("{step} ran before {missing} was available")]
    InvalidState {
        step: &'static str,
        missing: &'static str,
    },

    #[error("generator unavailable: {reason}")]
    GeneratorUnavailable { reason: String },

    #[error("turn aborted")]
    Aborted,

    #[error("step budget of {budget} exceeded")]
    BudgetExceeded { budget: usize },

    #[error("step panicked: {message}")]
    Panicked { message: String },
}

impl StepError {
    /// Short machine-readable reason stored in `error_state`.
    pub fn reason(&self) -> &'static str {
        match self {
            StepError::EmptyInput => "empty_input",
            StepError::InvalidState { .. } => "invalid_state",
            StepError::GeneratorUnavailable { .. } => "generator_unavailable",
            StepError::Aborted => "aborted",
            StepError::BudgetExceeded { .. } => "step_budget_exceeded",
            StepError::Panicked { .. } => "step_panicked",
        }
    }
}

impl From<SessionError> for StepError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Aborted => StepError::Aborted,
            SessionError::Inference(e) => StepError::GeneratorUnavailable {
                reason: e.to_string(),
            },
        }
    }
}

// ─── State ──────────────────────────────────────────────────────────────────

/// Parameters read from the request text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedParameters {
    /// Canonical muscle ids, in the order they were mentioned.
    pub muscles: Vec<String>,
    pub equipment: Vec<Equipment>,
    pub level: Option<FitnessLevel>,
    pub duration_minutes: Option<u32>,
}

/// Parameters after profile defaults, clamping and recovery checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedParameters {
    pub target: TargetSelection,
    /// Never empty: bodyweight when nothing else is available.
    pub equipment: Vec<Equipment>,
    pub level: FitnessLevel,
    pub duration_minutes: Option<u32>,
    pub classification: RecoveryClassification,
}

/// Everything one machine run knows. Created per turn and discarded after.
#[derive(Debug, Clone)]
pub struct ReasoningState {
    pub user_input: String,
    pub conversation_history: Vec<HistoryEntry>,
    pub user_id: String,
    pub intent_analysis: Option<IntentAnalysis>,
    pub extracted_parameters: Option<ExtractedParameters>,
    pub validated_parameters: Option<ValidatedParameters>,
    pub workout_data: Option<GeneratedWorkout>,
    pub response_content: String,
    pub confidence_score: f64,
    pub error_state: Option<String>,
    pub current_step: ReasoningStep,
    pub steps_completed: Vec<String>,
    pub needs_correction: bool,
    pub corrections: Vec<String>,
    /// `None` when the composer draft was used as is.
    pub extraction_tier: Option<ExtractionTier>,
    pub unmapped_exercises: usize,
}

impl ReasoningState {
    pub fn new(
        user_id: impl Into<String>,
        user_input: impl Into<String>,
        conversation_history: Vec<HistoryEntry>,
    ) -> Self {
        Self {
            user_input: user_input.into(),
            conversation_history,
            user_id: user_id.into(),
            intent_analysis: None,
            extracted_parameters: None,
            validated_parameters: None,
            workout_data: None,
            response_content: String::new(),
            confidence_score: 0.0,
            error_state: None,
            current_step: ReasoningStep::AnalyzeIntent,
            steps_completed: Vec::new(),
            needs_correction: false,
            corrections: Vec::new(),
            extraction_tier: None,
            unmapped_exercises: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error_state.is_none() && self.workout_data.is_some()
    }

    pub fn is_aborted(&self) -> bool {
        self.error_state.as_deref() == Some(StepError::Aborted.reason())
    }
}

/// Collaborators shared by every step. Read-only.
pub struct ReasoningContext<'a> {
    pub router: &'a IntentRouter,
    pub analyzer: &'a RecoveryAnalyzer,
    pub composer: &'a WorkoutComposer,
    pub resolver: &'a ExerciseResolver,
    /// `None` disables model authoring; the composer draft is used as is.
    pub generator: Option<&'a dyn Generator>,
    pub sampling: SamplingOverrides,
    pub volumes: &'a MuscleVolumeMap,
    pub profile: &'a UserProfile,
}

// ─── Machine ────────────────────────────────────────────────────────────────

/// Drives a [`ReasoningState`] through the steps within a transition budget.
#[derive(Debug, Clone, Copy)]
pub struct ReasoningMachine {
    step_budget: usize,
}

impl Default for ReasoningMachine {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_BUDGET)
    }
}

impl ReasoningMachine {
    pub fn new(step_budget: usize) -> Self {
        Self { step_budget }
    }

    pub fn step_budget(&self) -> usize {
        self.step_budget
    }

    /// Run to completion. Never fails: errors end up in `error_state` and
    /// the reply explains them.
    pub async fn run(
        &self,
        mut state: ReasoningState,
        ctx: &ReasoningContext<'_>,
        session: &mut StreamSession,
    ) -> ReasoningState {
        let mut transitions = 0usize;

        while state.current_step != ReasoningStep::Complete {
            let step = state.current_step;

            // generate_response is outside the budget so a reply always exists.
            if step != ReasoningStep::GenerateResponse {
                if transitions >= self.step_budget {
                    state = fail(state, step, StepError::BudgetExceeded { budget: self.step_budget });
                    continue;
                }
                if session.is_aborted() {
                    state = fail(state, step, StepError::Aborted);
                    continue;
                }
                transitions += 1;
            }

            let snapshot = state.clone();
            let outcome = AssertUnwindSafe(run_step(step, state, ctx, session))
                .catch_unwind()
                .await;

            state = match outcome {
                Ok(Ok(mut next)) => {
                    next.steps_completed.push(step.as_str().to_string());
                    next.current_step = step.next();
                    tracing::debug!(step = %step, "reasoning step completed");
                    next
                }
                Ok(Err(e)) => fail(snapshot, step, e),
                Err(payload) => fail(
                    snapshot,
                    step,
                    StepError::Panicked {
                        message: panic_message(payload.as_ref()),
                    },
                ),
            };
        }

        tracing::info!(
            user_id = %state.user_id,
            steps = ?state.steps_completed,
            error = state.error_state.as_deref().unwrap_or("none"),
            confidence = state.confidence_score,
            "reasoning complete"
        );
        state
    }
}

async fn run_step(
    step: ReasoningStep,
    state: ReasoningState,
    ctx: &ReasoningContext<'_>,
    session: &mut StreamSession,
) -> Result<ReasoningState, StepError> {
    match step {
        ReasoningStep::AnalyzeIntent => analyze_intent(state, ctx),
        ReasoningStep::ExtractParameters => extract_parameters(state),
        ReasoningStep::ValidateAndCorrect => validate_and_correct(state, ctx),
        ReasoningStep::ExecuteWorkoutCreation => execute_workout_creation(state, ctx, session).await,
        ReasoningStep::GenerateResponse => Ok(generate_response(state, session)),
        ReasoningStep::Complete => Ok(state),
    }
}

/// Record a failure and route to the reply.
fn fail(mut state: ReasoningState, step: ReasoningStep, error: StepError) -> ReasoningState {
    tracing::warn!(step = %step, reason = error.reason(), error = %error, "reasoning step failed");

    if step == ReasoningStep::GenerateResponse {
        // The reply itself failed: answer with the fixed apology.
        let reason = state
            .error_state
            .take()
            .unwrap_or_else(|| error.reason().to_string());
        state.confidence_score = error_confidence(&reason);
        state.response_content = apology(&reason).to_string();
        state.workout_data = None;
        state.error_state = Some(reason);
        state.current_step = ReasoningStep::Complete;
    } else {
        state.error_state = Some(error.reason().to_string());
        state.current_step = ReasoningStep::GenerateResponse;
    }
    state
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

// ─── analyze_intent ─────────────────────────────────────────────────────────

pub fn analyze_intent(
    mut state: ReasoningState,
    ctx: &ReasoningContext<'_>,
) -> Result<ReasoningState, StepError> {
    if state.user_input.trim().is_empty() {
        return Err(StepError::EmptyInput);
    }
    state.intent_analysis = Some(ctx.router.analyze(&state.user_input));
    Ok(state)
}

// ─── extract_parameters ─────────────────────────────────────────────────────

pub fn extract_parameters(mut state: ReasoningState) -> Result<ReasoningState, StepError> {
    let params = parse_parameters(&state.user_input);
    tracing::debug!(
        muscles = ?params.muscles,
        equipment = ?params.equipment,
        level = ?params.level,
        duration = ?params.duration_minutes,
        "extracted parameters"
    );
    state.extracted_parameters = Some(params);
    Ok(state)
}

/// Read muscles, equipment, level and duration from free text.
pub fn parse_parameters(text: &str) -> ExtractedParameters {
    let padded = word_text(text);
    let words: Vec<&str> = padded.split_whitespace().collect();

    ExtractedParameters {
        muscles: parse_muscles(&padded),
        equipment: parse_equipment(&words),
        level: words
            .iter()
            .filter(|w| **w != "new")
            .find_map(|w| FitnessLevel::from_text(w)),
        duration_minutes: parse_duration(text),
    }
}

fn parse_muscles(padded: &str) -> Vec<String> {
    let mut mentions: Vec<(usize, &[&str])> = MUSCLE_SYNONYMS
        .iter()
        .filter_map(|(word, muscles)| padded.find(&format!(" {word} ")).map(|pos| (pos, *muscles)))
        .collect();
    mentions.sort_by_key(|(pos, _)| *pos);

    let mut muscles: Vec<String> = Vec::new();
    for muscle in mentions.into_iter().flat_map(|(_, m)| m.iter()) {
        if !muscles.iter().any(|m| m == muscle) {
            muscles.push(muscle.to_string());
        }
    }
    muscles
}

fn parse_equipment(words: &[&str]) -> Vec<Equipment> {
    let mut found = Vec::new();
    for (i, word) in words.iter().enumerate() {
        let bigram = words.get(i + 1).map(|next| format!("{word} {next}"));
        let equipment = bigram
            .as_deref()
            .and_then(Equipment::from_text)
            .or_else(|| Equipment::from_text(word));
        if let Some(equipment) = equipment {
            if !found.contains(&equipment) {
                found.push(equipment);
            }
        }
    }
    found
}

fn parse_duration(text: &str) -> Option<u32> {
    if let Some(caps) = DURATION_REGEX.captures(text) {
        let amount: f64 = caps[1].parse().ok()?;
        let unit = caps[2].to_lowercase();
        let minutes = if unit.starts_with('h') { amount * 60.0 } else { amount };
        return Some(minutes.round() as u32);
    }
    let padded = word_text(text);
    (padded.contains(" an hour ") || padded.contains(" one hour ")).then_some(60)
}

// ─── validate_and_correct ───────────────────────────────────────────────────

pub fn validate_and_correct(
    mut state: ReasoningState,
    ctx: &ReasoningContext<'_>,
) -> Result<ReasoningState, StepError> {
    let params = state
        .extracted_parameters
        .clone()
        .ok_or(StepError::InvalidState {
            step: "validate_and_correct",
            missing: "extracted_parameters",
        })?;

    let level = params.level.unwrap_or(ctx.profile.level);
    let mut equipment = if params.equipment.is_empty() {
        ctx.profile.equipment.clone()
    } else {
        params.equipment.clone()
    };
    if equipment.is_empty() {
        equipment.push(Equipment::Bodyweight);
    }

    let duration_minutes = params.duration_minutes.map(|requested| {
        let clamped = requested.clamp(MIN_DURATION_MINUTES, MAX_DURATION_MINUTES);
        if clamped != requested {
            state
                .corrections
                .push(format!("Adjusted the session length from {requested} to {clamped} minutes."));
        }
        clamped
    });

    let classification = ctx.analyzer.analyze(ctx.volumes);
    let explicit = (!params.muscles.is_empty()).then_some(params.muscles.as_slice());
    let target = ctx.composer.select_target_muscles(&classification, explicit);

    if !target.dropped_overworked.is_empty() {
        state.needs_correction = true;
        for muscle in &target.dropped_overworked {
            state
                .corrections
                .push(format!("Skipped {muscle}: recent volume is high, so it needs recovery."));
        }
    }

    tracing::info!(
        targets = ?target.muscles,
        source = ?target.source,
        dropped = ?target.dropped_overworked,
        level = %level,
        "validated workout parameters"
    );

    state.validated_parameters = Some(ValidatedParameters {
        target,
        equipment,
        level,
        duration_minutes,
        classification,
    });
    Ok(state)
}

// ─── execute_workout_creation ───────────────────────────────────────────────

pub async fn execute_workout_creation(
    mut state: ReasoningState,
    ctx: &ReasoningContext<'_>,
    session: &mut StreamSession,
) -> Result<ReasoningState, StepError> {
    let validated = state
        .validated_parameters
        .clone()
        .ok_or(StepError::InvalidState {
            step: "execute_workout_creation",
            missing: "validated_parameters",
        })?;

    let draft = ctx
        .composer
        .compose(&validated.target, &validated.equipment, validated.level);

    let authored = match ctx.generator {
        Some(generator) => {
            author_workout(&state, &validated, &draft, generator, ctx.sampling, session).await?
        }
        None => None,
    };

    let limits = ctx.composer.limits();
    let workout = match authored {
        Some(extraction) => {
            state.extraction_tier = Some(extraction.tier);
            let (workout, removed) = reconcile(
                extraction.workout,
                &draft,
                &validated,
                ctx.resolver,
                limits.min_exercises,
                limits.max_exercises,
            );
            if !removed.is_empty() {
                state.needs_correction = true;
                state.corrections.extend(removed);
            }
            workout
        }
        None => {
            tracing::info!("using composer draft");
            draft
        }
    };

    let workout = fit_duration(workout, validated.duration_minutes, limits.min_exercises);
    state.unmapped_exercises = workout.exercises.iter().filter(|e| e.unmapped).count();

    tracing::info!(
        name = %workout.name,
        exercises = workout.exercises.len(),
        minutes = workout.estimated_duration_minutes,
        tier = ?state.extraction_tier.map(ExtractionTier::number),
        unmapped = state.unmapped_exercises,
        "workout created"
    );
    state.workout_data = Some(workout);
    Ok(state)
}

/// Ask the generator for a workout and recover whatever it wrote. Chunks are
/// collected, not delivered. `None` means the reply held no usable text.
async fn author_workout(
    state: &ReasoningState,
    validated: &ValidatedParameters,
    draft: &GeneratedWorkout,
    generator: &dyn Generator,
    sampling: SamplingOverrides,
    session: &mut StreamSession,
) -> Result<Option<Extraction>, StepError> {
    session.ensure_active()?;

    let request = GenerationRequest::new(authoring_messages(state, validated, draft))
        .with_sampling(sampling)
        .json();

    let cancel = session.cancel_token();
    let stream = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(StepError::Aborted),
        result = generator.stream(request) => result.map_err(|e| StepError::GeneratorUnavailable {
            reason: e.to_string(),
        })?,
    };

    let generation = session.collect(stream, false).await?;
    Ok(extract_workout(&generation.text))
}

fn authoring_messages(
    state: &ReasoningState,
    validated: &ValidatedParameters,
    draft: &GeneratedWorkout,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(AUTHORING_PROMPT)];

    let skip = state
        .conversation_history
        .len()
        .saturating_sub(AUTHORING_HISTORY_ENTRIES);
    messages.extend(state.conversation_history.iter().skip(skip).map(|entry| match entry.role {
        HistoryRole::User => ChatMessage::user(entry.text.as_str()),
        HistoryRole::Assistant => ChatMessage::assistant(entry.text.as_str()),
    }));

    let avoid: Vec<&str> = validated
        .classification
        .overworked
        .iter()
        .map(String::as_str)
        .collect();
    let equipment: Vec<String> = validated.equipment.iter().map(ToString::to_string).collect();
    let suggestions: Vec<&str> = draft.exercises.iter().map(|e| e.name.as_str()).collect();

    let mut brief = format!(
        "Request: {}\nTarget muscles: {}\nAvoid: {}\nEquipment: {}\nLevel: {}\nSuggested exercises: {}",
        state.user_input,
        validated.target.muscles.join(", "),
        if avoid.is_empty() { "none".to_string() } else { avoid.join(", ") },
        equipment.join(", "),
        validated.level,
        suggestions.join(", "),
    );
    if let Some(minutes) = validated.duration_minutes {
        brief.push_str(&format!("\nSession length: {minutes} minutes"));
    }
    messages.push(ChatMessage::user(brief));
    messages
}

/// Bring an authored workout in line with the catalog and recovery state.
/// Returns the workout and a note per removed exercise.
fn reconcile(
    authored: GeneratedWorkout,
    draft: &GeneratedWorkout,
    validated: &ValidatedParameters,
    resolver: &ExerciseResolver,
    min_exercises: usize,
    max_exercises: usize,
) -> (GeneratedWorkout, Vec<String>) {
    let classification = &validated.classification;
    let works_overworked = |exercise: &WorkoutExercise| match resolver.catalog().get(&exercise.catalog_id) {
        Some(entry) => entry.primary_muscles.iter().any(|m| classification.is_overworked(m)),
        None => exercise.target_muscles.iter().any(|m| classification.is_overworked(m)),
    };

    let mut removed = Vec::new();
    let mut exercises: Vec<WorkoutExercise> = Vec::new();
    for exercise in authored.exercises {
        let linked = resolver.link_exercise(exercise);
        if exercises.iter().any(|e| e.catalog_id == linked.catalog_id) {
            continue;
        }
        if works_overworked(&linked) {
            tracing::info!(exercise = %linked.name, "dropped exercise for overworked muscle");
            removed.push(format!(
                "Removed {}: it mainly works a muscle that needs recovery.",
                linked.name
            ));
            continue;
        }
        exercises.push(linked);
    }

    if exercises.len() < min_exercises {
        for rested_only in [true, false] {
            for candidate in &draft.exercises {
                if exercises.len() >= min_exercises {
                    break;
                }
                if exercises.iter().any(|e| e.catalog_id == candidate.catalog_id)
                    || (rested_only && works_overworked(candidate))
                {
                    continue;
                }
                exercises.push(candidate.clone());
            }
        }
    }
    exercises.truncate(max_exercises);

    let (sets, reps) = validated.level.set_scheme();
    for exercise in &mut exercises {
        if exercise.sets.is_empty() {
            exercise.sets = (0..sets).map(|_| WorkoutSet::working(reps)).collect();
        }
    }

    let name = authored.name.trim();
    let mut workout = GeneratedWorkout {
        name: if name.is_empty() || name == DEFAULT_WORKOUT_NAME {
            draft.name.clone()
        } else {
            name.to_string()
        },
        exercises,
        estimated_duration_minutes: 0,
        target_muscles: draft.target_muscles.clone(),
        difficulty: validated.level,
        reasoning: if authored.reasoning.trim().is_empty() {
            draft.reasoning.clone()
        } else {
            authored.reasoning
        },
    };
    workout.recompute_duration();
    (workout, removed)
}

/// Drop trailing exercises until the estimate fits `limit`, keeping at
/// least `min_exercises`.
fn fit_duration(mut workout: GeneratedWorkout, limit: Option<u32>, min_exercises: usize) -> GeneratedWorkout {
    workout.recompute_duration();
    if let Some(limit) = limit {
        while workout.estimated_duration_minutes > limit && workout.exercises.len() > min_exercises {
            workout.exercises.pop();
            workout.recompute_duration();
        }
    }
    workout
}

// ─── generate_response ──────────────────────────────────────────────────────

pub fn generate_response(mut state: ReasoningState, session: &mut StreamSession) -> ReasoningState {
    if state.error_state.is_none() && state.workout_data.is_none() {
        state.error_state = Some("invalid_state".to_string());
    }

    if let Some(reason) = state.error_state.clone() {
        state.response_content = apology(&reason).to_string();
        state.confidence_score = error_confidence(&reason);
        state.workout_data = None;
    } else if let Some(workout) = &state.workout_data {
        state.response_content = render_workout(workout, &state.corrections);
        state.confidence_score = score(
            state.extraction_tier,
            state.needs_correction,
            state.unmapped_exercises,
        );
    }

    session.emit(&state.response_content);
    state
}

fn score(tier: Option<ExtractionTier>, needs_correction: bool, unmapped: usize) -> f64 {
    let mut score = tier.map_or(DRAFT_CONFIDENCE, ExtractionTier::base_confidence);
    if needs_correction {
        score -= CORRECTION_PENALTY;
    }
    score -= UNMAPPED_PENALTY * unmapped as f64;
    score.clamp(MIN_CONFIDENCE, 1.0)
}

fn error_confidence(reason: &str) -> f64 {
    if reason == StepError::Aborted.reason() {
        0.0
    } else {
        ERROR_CONFIDENCE
    }
}

fn apology(reason: &str) -> &'static str {
    match reason {
        "aborted" => "",
        "empty_input" => {
            "I didn't catch a request there. Tell me which muscles you'd like to train \
             and I'll put a workout together."
        }
        "generator_unavailable" => {
            "Sorry, I couldn't reach the workout generator just now. Please try again in a moment."
        }
        "step_budget_exceeded" => {
            "Sorry, putting that workout together took too many steps. Please try again."
        }
        _ => "Sorry, something went wrong while building your workout. Please try again.",
    }
}

fn render_workout(workout: &GeneratedWorkout, corrections: &[String]) -> String {
    let mut out = format!(
        "**{}** ({} exercises, about {} min, {})\n\n",
        workout.name,
        workout.exercises.len(),
        workout.estimated_duration_minutes,
        workout.difficulty
    );
    for (i, exercise) in workout.exercises.iter().enumerate() {
        out.push_str(&format!("{}. {}: {}\n", i + 1, exercise.name, describe_sets(exercise)));
    }
    if !workout.reasoning.is_empty() {
        out.push('\n');
        out.push_str(&workout.reasoning);
        out.push('\n');
    }
    if !corrections.is_empty() {
        out.push_str("\nAdjustments:\n");
        for correction in corrections {
            out.push_str(&format!("- {correction}\n"));
        }
    }
    out.trim_end().to_string()
}

fn describe_sets(exercise: &WorkoutExercise) -> String {
    let reps: Vec<u32> = exercise.sets.iter().map(|s| s.reps).collect();
    match reps.first() {
        Some(&first) if reps.iter().all(|&r| r == first) => format!("{} × {first}", reps.len()),
        Some(_) => {
            let list: Vec<String> = reps.iter().map(u32::to_string).collect();
            format!("{} reps", list.join("/"))
        }
        None => "as you like".to_string(),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::agent_core::tool_registry::ToolCatalog;
    use crate::fitness::{ComposerLimits, ExerciseCatalog, RecoveryThresholds};
    use crate::test_support::{recorder, Script, ScriptedGenerator};
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        router: IntentRouter,
        analyzer: RecoveryAnalyzer,
        composer: WorkoutComposer,
        resolver: ExerciseResolver,
        volumes: MuscleVolumeMap,
        profile: UserProfile,
    }

    impl Fixture {
        fn new(volumes: &[(&str, f64)]) -> Self {
            let catalog = Arc::new(ExerciseCatalog::builtin().unwrap());
            Self {
                router: IntentRouter::new(&ToolCatalog::builtin()),
                analyzer: RecoveryAnalyzer::new(RecoveryThresholds::default()),
                composer: WorkoutComposer::new(catalog.clone(), ComposerLimits::default()),
                resolver: ExerciseResolver::new(catalog),
                volumes: volumes.iter().map(|(m, v)| (m.to_string(), *v)).collect(),
                profile: UserProfile::default(),
            }
        }

        fn ctx<'a>(&'a self, generator: Option<&'a dyn Generator>) -> ReasoningContext<'a> {
            ReasoningContext {
                router: &self.router,
                analyzer: &self.analyzer,
                composer: &self.composer,
                resolver: &self.resolver,
                generator,
                sampling: SamplingOverrides::default(),
                volumes: &self.volumes,
                profile: &self.profile,
            }
        }
    }

    async fn run(fixture: &Fixture, generator: Option<&dyn Generator>, input: &str) -> ReasoningState {
        let mut session = StreamSession::detached();
        ReasoningMachine::default()
            .run(ReasoningState::new("u1", input, Vec::new()), &fixture.ctx(generator), &mut session)
            .await
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
    }

    const ALL_STEPS: [&str; 5] = [
        "analyze_intent",
        "extract_parameters",
        "validate_and_correct",
        "execute_workout_creation",
        "generate_response",
    ];

    #[test]
    fn test_parse_parameters() {
        let params =
            parse_parameters("Give me a 30 min upper body workout with dumbbells, I'm a beginner");
        assert_eq!(params.muscles, vec!["chest", "back", "shoulders"]);
        assert_eq!(params.equipment, vec![Equipment::Dumbbell]);
        assert_eq!(params.level, Some(FitnessLevel::Beginner));
        assert_eq!(params.duration_minutes, Some(30));

        let params = parse_parameters("quads then pecs, and some arms. 1.5 hours, no equipment");
        assert_eq!(params.muscles, vec!["legs", "chest", "biceps", "triceps"]);
        assert_eq!(params.equipment, vec![Equipment::Bodyweight]);
        assert_eq!(params.duration_minutes, Some(90));
        assert_eq!(params.level, None);
    }

    #[test]
    fn test_parse_parameters_ignores_partial_words() {
        let params = parse_parameters("I'm new here, my backpack is heavy");
        assert!(params.muscles.is_empty());
        assert_eq!(params.level, None);
        assert_eq!(params.duration_minutes, None);
    }

    #[tokio::test]
    async fn test_recovery_scenario_without_generator() {
        let fixture = Fixture::new(&[("chest", 1200.0), ("back", 150.0), ("legs", 500.0)]);
        let state = run(&fixture, None, "Build me a workout").await;

        assert!(state.succeeded());
        assert_eq!(state.steps_completed, ALL_STEPS);
        assert_eq!(state.current_step, ReasoningStep::Complete);

        let validated = state.validated_parameters.as_ref().unwrap();
        assert_eq!(validated.target.muscles, vec!["back", "legs"]);

        let workout = state.workout_data.as_ref().unwrap();
        assert!(workout.is_within_bounds());
        assert!(!workout.target_muscles.contains("chest"));
        assert!(!workout.contains_catalog_id("push-ups"));
        assert_close(state.confidence_score, 0.7);
        assert!(state.response_content.contains(&workout.name));
    }

    #[tokio::test]
    async fn test_overworked_explicit_muscle_is_corrected() {
        let fixture = Fixture::new(&[("chest", 1200.0)]);
        let state = run(&fixture, None, "chest and legs workout please").await;

        assert!(state.succeeded());
        assert!(state.needs_correction);
        assert!(state.corrections.iter().any(|c| c.contains("chest")));
        assert_eq!(state.validated_parameters.unwrap().target.muscles, vec!["legs"]);
        assert_close(state.confidence_score, 0.6);
        assert!(state.response_content.contains("Adjustments"));
    }

    #[tokio::test]
    async fn test_authored_workout_is_reconciled() {
        let fixture = Fixture::new(&[("chest", 1200.0)]);
        let generator = ScriptedGenerator::new(vec![Script::text(
            r#"{"name": "Pull Focus", "exercises": [
                {"name": "Bent-over Rows", "sets": 4, "reps": 8},
                {"name": "Pull-ups", "sets": 3, "reps": 6},
                {"name": "Bench Press", "sets": 3, "reps": 10}
            ], "reasoning": "Your back is fresh."}"#,
        )]);
        let state = run(&fixture, Some(&generator), "back workout").await;

        assert!(state.succeeded());
        assert_eq!(state.extraction_tier, Some(ExtractionTier::Json));
        let workout = state.workout_data.as_ref().unwrap();
        assert_eq!(workout.name, "Pull Focus");
        assert!(workout.contains_catalog_id("barbell-row"));
        assert!(workout.contains_catalog_id("pull-ups"));
        assert!(!workout.contains_catalog_id("bench-press"));
        assert!(workout.is_within_bounds());
        assert!(state.corrections.iter().any(|c| c.contains("Bench Press")));
        assert_close(state.confidence_score, 0.85);

        let requests = generator.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].json_output);
        assert!(requests[0].tools.is_none());
    }

    #[tokio::test]
    async fn test_authoring_chunks_are_not_forwarded() {
        let fixture = Fixture::new(&[]);
        let generator = ScriptedGenerator::new(vec![Script::chunks(&[
            r#"{"exercises": [{"name": "Push-ups"}, "#,
            r#"{"name": "Plank"}, {"name": "Bodyweight Squat"}]}"#,
        ])]);
        let (callback, seen) = recorder();
        let mut session = StreamSession::new(Some(callback), None);
        let state = ReasoningMachine::default()
            .run(
                ReasoningState::new("u1", "full body workout", Vec::new()),
                &fixture.ctx(Some(&generator)),
                &mut session,
            )
            .await;

        assert!(state.succeeded());
        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![state.response_content.clone()]);
        // Sets were missing, so the level scheme (3×10) fills them.
        let workout = state.workout_data.unwrap();
        assert!(workout.exercises.iter().all(|e| e.sets.len() == 3 && e.sets[0].reps == 10));
    }

    #[tokio::test]
    async fn test_prose_reply_and_unmapped_exercise() {
        let fixture = Fixture::new(&[]);
        let generator = ScriptedGenerator::new(vec![Script::text("Do 3 sets of 10 reps Push-ups")]);
        let state = run(&fixture, Some(&generator), "quick chest workout").await;
        assert_eq!(state.extraction_tier, Some(ExtractionTier::ProsePattern));
        let workout = state.workout_data.as_ref().unwrap();
        assert_eq!(workout.exercises[0].catalog_id, "push-ups");
        assert!(workout.is_within_bounds());
        assert_close(state.confidence_score, 0.6);

        let generator = ScriptedGenerator::new(vec![Script::text(
            r#"{"exercises": [{"name": "Push-ups", "sets": 3, "reps": 10},
                {"name": "Bodyweight Squat", "sets": 3, "reps": 12},
                {"name": "Zercher Carry Hold", "sets": 2, "reps": 30}]}"#,
        )]);
        let state = run(&fixture, Some(&generator), "make me a workout").await;
        assert_eq!(state.unmapped_exercises, 1);
        let workout = state.workout_data.as_ref().unwrap();
        assert!(workout.contains_catalog_id("custom-zercher-carry-hold"));
        assert_close(state.confidence_score, 0.9);
    }

    #[tokio::test]
    async fn test_duration_is_clamped_and_fitted() {
        let fixture = Fixture::new(&[]);
        let state = run(&fixture, None, "5 min full body workout").await;
        let validated = state.validated_parameters.as_ref().unwrap();
        assert_eq!(validated.duration_minutes, Some(15));
        assert!(state.corrections.iter().any(|c| c.contains("15 minutes")));
        // Nothing fits in 15 minutes, but the minimum is kept.
        assert_eq!(state.workout_data.unwrap().exercises.len(), 3);
        assert!(!state.needs_correction);
    }

    #[tokio::test]
    async fn test_generator_failure() {
        let fixture = Fixture::new(&[]);
        let generator = ScriptedGenerator::new(vec![Script::Fail]);
        let state = run(&fixture, Some(&generator), "leg workout").await;

        assert_eq!(state.error_state.as_deref(), Some("generator_unavailable"));
        assert!(state.workout_data.is_none());
        assert_close(state.confidence_score, 0.2);
        assert_eq!(
            state.steps_completed,
            vec!["analyze_intent", "extract_parameters", "validate_and_correct", "generate_response"]
        );
        assert!(state.response_content.starts_with("Sorry"));
    }

    #[tokio::test]
    async fn test_panicking_step_is_contained() {
        let fixture = Fixture::new(&[]);
        let generator = ScriptedGenerator::new(vec![Script::Panic]);
        let state = run(&fixture, Some(&generator), "leg workout").await;

        assert_eq!(state.error_state.as_deref(), Some("step_panicked"));
        assert_eq!(state.current_step, ReasoningStep::Complete);
        assert_eq!(state.steps_completed.last().map(String::as_str), Some("generate_response"));
        assert!(!state.response_content.is_empty());
    }

    #[tokio::test]
    async fn test_step_budget_exceeded() {
        let fixture = Fixture::new(&[]);
        let mut session = StreamSession::detached();
        let state = ReasoningMachine::new(2)
            .run(ReasoningState::new("u1", "leg workout", Vec::new()), &fixture.ctx(None), &mut session)
            .await;

        assert_eq!(state.error_state.as_deref(), Some("step_budget_exceeded"));
        assert_eq!(
            state.steps_completed,
            vec!["analyze_intent", "extract_parameters", "generate_response"]
        );
        assert_close(state.confidence_score, 0.2);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let fixture = Fixture::new(&[]);
        let state = run(&fixture, None, "   ").await;
        assert_eq!(state.error_state.as_deref(), Some("empty_input"));
        assert_eq!(state.steps_completed, vec!["generate_response"]);
        assert!(state.intent_analysis.is_none());
    }

    #[tokio::test]
    async fn test_cancel_during_authoring() {
        let fixture = Fixture::new(&[]);
        let generator = ScriptedGenerator::new(vec![Script::Hang(vec!["{\"exercises\": [".into()])]);
        let (callback, seen) = recorder();
        let cancel = CancellationToken::new();
        let mut session = StreamSession::new(Some(callback), Some(cancel.clone()));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let state = ReasoningMachine::default()
            .run(
                ReasoningState::new("u1", "leg workout", Vec::new()),
                &fixture.ctx(Some(&generator)),
                &mut session,
            )
            .await;

        assert!(state.is_aborted());
        assert!(state.response_content.is_empty());
        assert_eq!(state.confidence_score, 0.0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let fixture = Fixture::new(&[]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut session = StreamSession::new(None, Some(cancel));
        let state = ReasoningMachine::default()
            .run(ReasoningState::new("u1", "leg workout", Vec::new()), &fixture.ctx(None), &mut session)
            .await;
        assert!(state.is_aborted());
        assert_eq!(state.steps_completed, vec!["generate_response"]);
    }

    #[test]
    fn test_steps_are_independent_reducers() {
        let fixture = Fixture::new(&[]);
        let ctx = fixture.ctx(None);
        let state = ReasoningState::new("u1", "arms", Vec::new());

        let err = validate_and_correct(state.clone(), &ctx).unwrap_err();
        assert_eq!(err.reason(), "invalid_state");

        let extracted = extract_parameters(state.clone()).unwrap();
        assert_eq!(extracted.extracted_parameters.as_ref().unwrap().muscles, vec!["biceps", "triceps"]);
        // The input value is untouched.
        assert!(state.extracted_parameters.is_none());
    }
}
