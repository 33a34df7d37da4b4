//! Turn orchestrator: routes one user turn to the pipeline that answers it.
//!
//! 1. **Route**: the intent router classifies the text
//! 2. **Workout**: the reasoning machine builds and explains a plan
//! 3. **App control**: the model selects tools, the dispatcher runs them,
//!    and the model summarizes the results
//! 4. **General**: the model answers directly, streamed to the caller
//!
//! Every turn goes through one [`StreamSession`], so cancellation and chunk
//! delivery behave the same on all paths. Nothing but [`TurnResult`] and
//! [`ConfirmationOutcome`] reaches the caller.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::fitness::{ExerciseCatalog, ExerciseResolver, RecoveryAnalyzer, WorkoutComposer};
use crate::inference::{
    ChatMessage, ChunkCallback, Generation, GenerationRequest, Generator, SessionError,
    StreamSession, ToolCall,
};
use crate::settings::{AgentSettings, SettingsError};

use super::confirmation::PendingConfirmation;
use super::conversation::ConversationSession;
use super::intent::IntentRouter;
use super::reasoning::{ReasoningContext, ReasoningMachine, ReasoningState};
use super::services::DomainServices;
use super::tool_dispatcher::{summarize_result, DispatchOutcome, ToolDispatcher};
use super::tool_registry::ToolCatalog;
use super::types::{ConfirmationOutcome, Intent, TurnRequest, TurnResult};

// ─── Prompts ────────────────────────────────────────────────────────────────

const GENERAL_PROMPT: &str = "You are RepCoach, a friendly strength-training assistant. \
Answer briefly and plainly. If the user asks for a workout, offer to build one.";

const APP_CONTROL_PROMPT: &str = "You are RepCoach, the assistant inside a workout tracking app. \
Use the provided tools to carry out the user's request. Call only tools from the list, \
with arguments that match their parameters. After tool results arrive, summarize them \
for the user in one or two sentences.";

const UNAVAILABLE_REPLY: &str =
    "Sorry, I couldn't reach the language model just now. Please try again in a moment.";

const NO_ACTION_REPLY: &str = "I couldn't find an app action matching that request.";

const EMPTY_REPLY: &str = "Sorry, I don't have a good answer to that. Could you put it another way?";

// ─── Confidence ─────────────────────────────────────────────────────────────

const GENERAL_CONFIDENCE: f64 = 0.8;
const ACTION_CONFIDENCE: f64 = 0.9;
const PARTIAL_CONFIDENCE: f64 = 0.5;
const FAILURE_CONFIDENCE: f64 = 0.2;

// ─── CoachAgent ─────────────────────────────────────────────────────────────

/// The conversational agent. Immutable after construction and shareable
/// across tasks; per-conversation state lives in [`ConversationSession`].
pub struct CoachAgent {
    settings: AgentSettings,
    router: IntentRouter,
    analyzer: RecoveryAnalyzer,
    composer: WorkoutComposer,
    resolver: ExerciseResolver,
    dispatcher: ToolDispatcher,
    generator: Arc<dyn Generator>,
    machine: ReasoningMachine,
}

impl CoachAgent {
    /// Build an agent over the built-in tool set.
    pub fn new(
        settings: AgentSettings,
        catalog: Arc<ExerciseCatalog>,
        generator: Arc<dyn Generator>,
        services: Arc<dyn DomainServices>,
    ) -> Result<Self, SettingsError> {
        settings.validate()?;

        let tools = Arc::new(ToolCatalog::builtin());
        let router = IntentRouter::new(&tools);
        let dispatcher = ToolDispatcher::new(
            tools,
            services,
            std::time::Duration::from_secs(settings.confirmation_ttl_secs),
        );

        tracing::info!(
            exercises = catalog.len(),
            step_budget = settings.step_budget,
            generator_authoring = settings.generator_authoring,
            "coach agent ready"
        );

        Ok(Self {
            router,
            analyzer: RecoveryAnalyzer::new(settings.recovery),
            composer: WorkoutComposer::new(Arc::clone(&catalog), settings.composer),
            resolver: ExerciseResolver::new(catalog),
            dispatcher,
            generator,
            machine: ReasoningMachine::new(settings.step_budget),
            settings,
        })
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// A fresh conversation sized by the configured history limit.
    pub fn new_session(&self, session_id: impl Into<String>) -> ConversationSession {
        ConversationSession::new(session_id, self.settings.max_history_turns)
    }

    /// Answer one turn. Never fails: errors become a low-confidence reply,
    /// cancellation becomes an aborted result.
    ///
    /// History is read at the start and the finished turn is appended at the
    /// end, so callers must not run two turns of one session concurrently.
    pub async fn process_turn(
        &self,
        conversation: &mut ConversationSession,
        request: TurnRequest,
        on_chunk: Option<ChunkCallback>,
        cancel: Option<CancellationToken>,
    ) -> TurnResult {
        let started = Instant::now();
        let mut session = StreamSession::new(on_chunk, cancel);

        // Blank input goes down the workout path, which answers it.
        let intent = if request.text.trim().is_empty() {
            Intent::Workout
        } else {
            self.router.classify(&request.text)
        };
        tracing::info!(
            session_id = %conversation.session_id(),
            user_id = %request.user_id,
            intent = %intent,
            "turn started"
        );

        let mut steps = Vec::new();
        let outcome = match intent {
            Intent::Workout => Ok(self.workout_turn(conversation, &request, &mut session).await),
            Intent::AppControl => {
                self.app_control_turn(conversation, &request, &mut session, &mut steps).await
            }
            Intent::General => {
                self.general_turn(conversation, &request, &mut session, &mut steps).await
            }
        };

        let mut result = match outcome {
            Ok(result) => result,
            Err(SessionError::Aborted) => TurnResult::aborted(intent, steps),
            Err(SessionError::Inference(e)) => {
                tracing::warn!(intent = %intent, error = %e, "generation failed");
                session.emit(UNAVAILABLE_REPLY);
                let mut result =
                    TurnResult::reply(intent, UNAVAILABLE_REPLY, false, FAILURE_CONFIDENCE);
                result.steps_completed = steps;
                result
            }
        };

        if session.is_aborted() && !result.aborted {
            if let Some(pending) = result.pending_confirmation.take() {
                self.dispatcher.decline(&pending);
            }
            result = TurnResult::aborted(intent, std::mem::take(&mut result.steps_completed));
        }

        let reply = (!result.aborted).then(|| result.content.clone());
        conversation.record(request.text, reply);

        tracing::info!(
            session_id = %conversation.session_id(),
            intent = %intent,
            success = result.success,
            aborted = result.aborted,
            confidence = result.confidence,
            chunks = session.chunks_emitted(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "turn finished"
        );
        result
    }

    /// Execute a destructive action the user approved. Works once per
    /// confirmation; replays, expired and unknown tokens are refused.
    pub async fn confirm_action(&self, pending: PendingConfirmation) -> ConfirmationOutcome {
        match self.dispatcher.confirm(&pending).await {
            Ok((tool, result)) => ConfirmationOutcome {
                success: true,
                message: format!("Done. {}", summarize_result(&tool, &result)),
            },
            Err(e) => {
                tracing::warn!(token = %pending.token(), error = %e, "confirmation failed");
                ConfirmationOutcome {
                    success: false,
                    message: e.to_string(),
                }
            }
        }
    }

    /// Drop a pending action without running it.
    pub fn decline_action(&self, pending: PendingConfirmation) -> ConfirmationOutcome {
        if self.dispatcher.decline(&pending) {
            ConfirmationOutcome {
                success: true,
                message: "Okay, nothing was changed.".to_string(),
            }
        } else {
            ConfirmationOutcome {
                success: false,
                message: "That request is no longer pending.".to_string(),
            }
        }
    }

    // ─── Workout ────────────────────────────────────────────────────────────

    async fn workout_turn(
        &self,
        conversation: &ConversationSession,
        request: &TurnRequest,
        session: &mut StreamSession,
    ) -> TurnResult {
        let profile = request.profile.clone().unwrap_or_default();
        let ctx = ReasoningContext {
            router: &self.router,
            analyzer: &self.analyzer,
            composer: &self.composer,
            resolver: &self.resolver,
            generator: self.settings.generator_authoring.then_some(self.generator.as_ref()),
            sampling: self.settings.sampling.authoring(),
            volumes: &request.muscle_volumes,
            profile: &profile,
        };

        let state = ReasoningState::new(
            request.user_id.as_str(),
            request.text.as_str(),
            conversation.history(),
        );
        let state = self.machine.run(state, &ctx, session).await;

        if state.is_aborted() {
            return TurnResult::aborted(Intent::Workout, state.steps_completed);
        }

        let success = state.succeeded();
        TurnResult {
            workout_data: state.workout_data,
            steps_completed: state.steps_completed,
            ..TurnResult::reply(
                Intent::Workout,
                state.response_content,
                success,
                state.confidence_score,
            )
        }
    }

    // ─── General ────────────────────────────────────────────────────────────

    async fn general_turn(
        &self,
        conversation: &ConversationSession,
        request: &TurnRequest,
        session: &mut StreamSession,
        steps: &mut Vec<String>,
    ) -> Result<TurnResult, SessionError> {
        let messages = self.prompt(GENERAL_PROMPT, conversation, &request.text);
        let generation = self
            .generate(
                session,
                GenerationRequest::new(messages).with_sampling(self.settings.sampling.conversation()),
                true,
            )
            .await?;
        steps.push("respond".to_string());

        // Tool calls are ignored here; only text counts as an answer.
        let mut result = if generation.text.trim().is_empty() {
            tracing::warn!(
                tool_calls = generation.tool_calls.len(),
                "general reply was empty, using fallback"
            );
            session.emit(EMPTY_REPLY);
            TurnResult::reply(Intent::General, EMPTY_REPLY, false, FAILURE_CONFIDENCE)
        } else {
            TurnResult::reply(Intent::General, generation.text, true, GENERAL_CONFIDENCE)
        };
        result.steps_completed = std::mem::take(steps);
        Ok(result)
    }

    // ─── App Control ────────────────────────────────────────────────────────

    async fn app_control_turn(
        &self,
        conversation: &ConversationSession,
        request: &TurnRequest,
        session: &mut StreamSession,
        steps: &mut Vec<String>,
    ) -> Result<TurnResult, SessionError> {
        let messages = self.prompt(APP_CONTROL_PROMPT, conversation, &request.text);
        let selection = GenerationRequest::new(messages.clone())
            .with_tools(self.dispatcher.catalog().to_openai_tools())
            .with_sampling(self.settings.sampling.tool_selection());
        let generation = self.generate(session, selection, false).await?;
        steps.push("select_tools".to_string());

        if generation.tool_calls.is_empty() {
            // The model answered without tools; pass its text through.
            let text = generation.text.trim();
            let (content, success, confidence) = if text.is_empty() {
                (NO_ACTION_REPLY.to_string(), false, FAILURE_CONFIDENCE)
            } else {
                (text.to_string(), true, PARTIAL_CONFIDENCE)
            };
            session.emit(&content);
            let mut result = TurnResult::reply(Intent::AppControl, content, success, confidence);
            result.steps_completed = std::mem::take(steps);
            return Ok(result);
        }

        let mut executed: Vec<(ToolCall, Value)> = Vec::new();
        let mut navigation_target = None;
        let mut notes = Vec::new();

        for call in &generation.tool_calls {
            session.ensure_active()?;
            match self.dispatcher.dispatch(call).await {
                DispatchOutcome::NeedsConfirmation(pending) => {
                    // Nothing after a destructive call runs until the user decides.
                    steps.push("dispatch".to_string());
                    let prompt = pending.confirmation_prompt().to_string();
                    // Calls that already ran are reported ahead of the question.
                    let mut content: String = executed
                        .iter()
                        .map(|(call, result)| summarize_result(&call.name, result) + "\n")
                        .collect();
                    content.push_str(&prompt);
                    session.emit(&content);
                    tracing::info!(
                        tool = %pending.target_function(),
                        token = %pending.token(),
                        already_executed = executed.len(),
                        "awaiting confirmation"
                    );
                    return Ok(TurnResult {
                        navigation_target,
                        steps_completed: std::mem::take(steps),
                        requires_confirmation: true,
                        confirmation_prompt: Some(prompt),
                        pending_confirmation: Some(pending),
                        ..TurnResult::reply(Intent::AppControl, content, true, ACTION_CONFIDENCE)
                    });
                }
                DispatchOutcome::Navigate { target } => navigation_target = Some(target),
                DispatchOutcome::Executed { result, .. } => executed.push((call.clone(), result)),
                DispatchOutcome::Rejected { tool, reason } => {
                    notes.push(format!("I can't run '{tool}': {reason}."));
                }
                DispatchOutcome::Failed { tool, error } => {
                    notes.push(format!("'{tool}' didn't work: {error}."));
                }
            }
        }
        steps.push("dispatch".to_string());

        let mut content = String::new();
        if !executed.is_empty() {
            content = self.summarize(session, messages, &executed).await?;
            steps.push("summarize".to_string());
        } else if let Some(target) = &navigation_target {
            content = format!("Opening {target}.");
            session.emit(&content);
        }

        for note in &notes {
            let line = if content.is_empty() {
                note.clone()
            } else {
                format!("\n{note}")
            };
            session.emit(&line);
            content.push_str(&line);
        }

        let success = !executed.is_empty() || navigation_target.is_some();
        let confidence = match (success, notes.is_empty()) {
            (true, true) => ACTION_CONFIDENCE,
            (true, false) => PARTIAL_CONFIDENCE,
            (false, _) => FAILURE_CONFIDENCE,
        };

        Ok(TurnResult {
            navigation_target,
            steps_completed: std::mem::take(steps),
            ..TurnResult::reply(Intent::AppControl, content, success, confidence)
        })
    }

    /// Feed executed results back to the model for a short summary, falling
    /// back to a deterministic one when that generation fails.
    async fn summarize(
        &self,
        session: &mut StreamSession,
        mut messages: Vec<ChatMessage>,
        executed: &[(ToolCall, Value)],
    ) -> Result<String, SessionError> {
        let calls: Vec<ToolCall> = executed.iter().map(|(call, _)| call.clone()).collect();
        messages.push(ChatMessage::assistant_tool_calls(&calls));
        for (call, result) in executed {
            messages.push(ChatMessage::tool_result(call.id.as_str(), result.to_string()));
        }

        let request =
            GenerationRequest::new(messages).with_sampling(self.settings.sampling.conversation());
        match self.generate(session, request, true).await {
            Ok(generation) if !generation.text.trim().is_empty() => Ok(generation.text),
            Err(SessionError::Aborted) => Err(SessionError::Aborted),
            other => {
                if let Err(e) = other {
                    tracing::warn!(error = %e, "summary generation failed, using fallback");
                }
                let fallback = executed
                    .iter()
                    .map(|(call, result)| summarize_result(&call.name, result))
                    .collect::<Vec<_>>()
                    .join("\n");
                session.emit(&fallback);
                Ok(fallback)
            }
        }
    }

    // ─── Generation ─────────────────────────────────────────────────────────

    /// System prompt, recent history within the token budget, then the turn.
    fn prompt(&self, system: &str, conversation: &ConversationSession, text: &str) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(system)];
        messages.extend(conversation.to_chat_messages(self.settings.history_token_budget));
        messages.push(ChatMessage::user(text));
        messages
    }

    /// Start a generation and drain it through the session, racing both the
    /// connection and every chunk against cancellation.
    async fn generate(
        &self,
        session: &mut StreamSession,
        request: GenerationRequest,
        deliver: bool,
    ) -> Result<Generation, SessionError> {
        session.ensure_active()?;
        let cancel = session.cancel_token();
        let stream = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SessionError::Aborted),
            result = self.generator.stream(request) => result?,
        };
        session.collect(stream, deliver).await
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
