//! ToolDispatcher: routes model-proposed tool calls to domain services.
//!
//! Order of checks for every call:
//! 1. The name must be declared, otherwise the call is rejected.
//! 2. Arguments must match the declared schema.
//! 3. Destructive tools never run here: they produce a
//!    [`PendingConfirmation`] and wait for [`ToolDispatcher::confirm`].
//! 4. Navigation is answered client-side.
//! 5. Everything else calls the domain service.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::inference::types::ToolCall;

use super::confirmation::{ConfirmationLedger, PendingConfirmation};
use super::errors::AgentError;
use super::services::DomainServices;
use super::tool_registry::{ToolCatalog, ToolDeclaration, ToolKind};

/// What happened to one proposed call.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Not executed: unknown tool or invalid arguments.
    Rejected { tool: String, reason: String },
    /// Destructive call parked until the user confirms.
    NeedsConfirmation(PendingConfirmation),
    /// Client-side navigation.
    Navigate { target: String },
    /// The domain service ran.
    Executed { tool: String, result: Value },
    /// The domain service returned an error.
    Failed { tool: String, error: String },
}

/// Validates and executes tool calls against a static catalog.
pub struct ToolDispatcher {
    catalog: Arc<ToolCatalog>,
    services: Arc<dyn DomainServices>,
    ledger: ConfirmationLedger,
}

impl ToolDispatcher {
    pub fn new(
        catalog: Arc<ToolCatalog>,
        services: Arc<dyn DomainServices>,
        confirmation_ttl: Duration,
    ) -> Self {
        Self {
            catalog,
            services,
            ledger: ConfirmationLedger::new(confirmation_ttl),
        }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Number of destructive calls waiting for a decision.
    pub fn pending_count(&self) -> usize {
        self.ledger.len()
    }

    /// Look up and schema-check a call without running it.
    pub fn validate(&self, call: &ToolCall) -> Result<&ToolDeclaration, AgentError> {
        let declaration = self.catalog.get(&call.name).ok_or_else(|| AgentError::UnknownTool {
            name: call.name.clone(),
        })?;
        declaration.validate(&call.arguments)?;
        Ok(declaration)
    }

    /// Handle one proposed call.
    pub async fn dispatch(&self, call: &ToolCall) -> DispatchOutcome {
        let declaration = match self.validate(call) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "tool call rejected");
                return DispatchOutcome::Rejected {
                    tool: call.name.clone(),
                    reason: e.to_string(),
                };
            }
        };

        match declaration.kind {
            ToolKind::Destructive => {
                let prompt = declaration.confirmation_prompt(&call.arguments);
                let pending = self.ledger.issue(&call.name, call.arguments.clone(), prompt);
                DispatchOutcome::NeedsConfirmation(pending)
            }
            ToolKind::Navigation => {
                let target = call
                    .arguments
                    .get("screen")
                    .and_then(Value::as_str)
                    .unwrap_or("home")
                    .to_string();
                tracing::info!(target = %target, "navigation requested");
                DispatchOutcome::Navigate { target }
            }
            ToolKind::Query | ToolKind::Mutation => match self.execute(&call.name, &call.arguments).await {
                Ok(result) => DispatchOutcome::Executed {
                    tool: call.name.clone(),
                    result,
                },
                Err(e) => DispatchOutcome::Failed {
                    tool: call.name.clone(),
                    error: e.to_string(),
                },
            },
        }
    }

    /// Execute a previously issued confirmation, exactly once.
    ///
    /// The ledger's stored call is executed, not the caller's copy. Returns
    /// the executed tool name and its result.
    pub async fn confirm(&self, pending: &PendingConfirmation) -> Result<(String, Value), AgentError> {
        let stored = self.ledger.take(pending)?;
        tracing::info!(token = %stored.token(), tool = %stored.target_function(), "confirmed");
        let result = self.execute(stored.target_function(), stored.args()).await?;
        Ok((stored.target_function().to_string(), result))
    }

    /// Discard a pending confirmation. Returns whether it was outstanding.
    pub fn decline(&self, pending: &PendingConfirmation) -> bool {
        self.ledger.discard(pending)
    }

    async fn execute(&self, tool: &str, args: &Value) -> Result<Value, AgentError> {
        let start = Instant::now();
        let result = self.services.invoke(tool, args).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                tracing::info!(tool, elapsed_ms, "tool executed");
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(tool, elapsed_ms, error = %format!("{e:#}"), "tool failed");
                Err(AgentError::DomainServiceError {
                    tool: tool.to_string(),
                    reason: format!("{e:#}"),
                })
            }
        }
    }
}

// ─── Result Summaries ───────────────────────────────────────────────────────

/// Results up to this many characters are quoted whole.
const RESULT_QUOTE_CHARS: usize = 140;

/// Characters of a longer result kept as a preview.
const RESULT_PREVIEW_CHARS: usize = 100;

/// One line describing what a tool returned, used when the model cannot
/// summarize it.
pub fn summarize_result(tool: &str, result: &Value) -> String {
    let rendered = result.to_string();
    let total = rendered.chars().count();
    if total <= RESULT_QUOTE_CHARS {
        return format!("[{tool} returned: {rendered}]");
    }
    let preview: String = rendered.chars().take(RESULT_PREVIEW_CHARS).collect();
    format!("[{tool} returned {total} chars: {preview}...]")
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::services::InMemoryDomainServices;
    use serde_json::json;

    fn setup() -> (ToolDispatcher, Arc<InMemoryDomainServices>) {
        let services = Arc::new(InMemoryDomainServices::with_sample_data());
        let dispatcher = ToolDispatcher::new(
            Arc::new(ToolCatalog::builtin()),
            services.clone(),
            Duration::from_secs(300),
        );
        (dispatcher, services)
    }

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments,
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_rejected_without_domain_call() {
        let (dispatcher, services) = setup();
        let outcome = dispatcher.dispatch(&call("hack_database", json!({"drop": true}))).await;
        assert!(matches!(outcome, DispatchOutcome::Rejected { ref tool, .. } if tool == "hack_database"));
        assert!(services.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_arguments_rejected() {
        let (dispatcher, services) = setup();
        let outcome = dispatcher.dispatch(&call("get_workout_details", json!({}))).await;
        match outcome {
            DispatchOutcome::Rejected { reason, .. } => assert!(reason.contains("workout_id")),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(services.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_destructive_call_waits_for_confirmation() {
        let (dispatcher, services) = setup();
        let outcome = dispatcher
            .dispatch(&call("delete_workout", json!({"workout_id": "w-2"})))
            .await;
        let DispatchOutcome::NeedsConfirmation(pending) = outcome else {
            panic!("expected confirmation");
        };
        assert_eq!(pending.confirmation_prompt(), "Delete workout 'w-2'? This cannot be undone.");
        assert!(services.invocations().is_empty());
        assert_eq!(services.workout_ids().len(), 3);

        let (tool, result) = dispatcher.confirm(&pending).await.unwrap();
        assert_eq!(tool, "delete_workout");
        assert_eq!(result["deleted"], "w-2");
        assert_eq!(services.workout_ids(), vec!["w-1", "w-3"]);

        // Second confirm is refused and does not reach the service.
        assert!(dispatcher.confirm(&pending).await.is_err());
        assert_eq!(services.invocations().len(), 1);
    }

    #[tokio::test]
    async fn test_declined_confirmation_never_executes() {
        let (dispatcher, services) = setup();
        let DispatchOutcome::NeedsConfirmation(pending) =
            dispatcher.dispatch(&call("clear_workout_history", json!({}))).await
        else {
            panic!("expected confirmation");
        };
        assert!(dispatcher.decline(&pending));
        assert!(dispatcher.confirm(&pending).await.is_err());
        assert!(services.invocations().is_empty());
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_navigation_is_client_side() {
        let (dispatcher, services) = setup();
        let outcome = dispatcher.dispatch(&call("navigate_to", json!({"screen": "progress"}))).await;
        assert_eq!(outcome, DispatchOutcome::Navigate { target: "progress".into() });
        assert!(services.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_query_and_failure() {
        let (dispatcher, _services) = setup();
        let outcome = dispatcher.dispatch(&call("get_profile", json!({}))).await;
        assert!(matches!(outcome, DispatchOutcome::Executed { ref result, .. } if result["level"] == "intermediate"));

        let outcome = dispatcher
            .dispatch(&call("get_workout_details", json!({"workout_id": "w-404"})))
            .await;
        assert!(matches!(outcome, DispatchOutcome::Failed { ref error, .. } if error.contains("not found")));
    }

    #[test]
    fn test_summarize_result_quotes_short_and_previews_long() {
        let short = summarize_result("get_profile", &json!({"level": "beginner"}));
        assert_eq!(short, r#"[get_profile returned: {"level":"beginner"}]"#);

        let sessions: Vec<String> = (0..50).map(|i| format!("session_{i}")).collect();
        let long = summarize_result("get_workout_history", &json!({ "sessions": sessions }));
        assert!(long.starts_with("[get_workout_history returned "));
        assert!(long.contains(" chars: {\"sessions\""));
        assert!(long.ends_with("...]"));
    }

    #[test]
    fn test_summarize_result_multibyte_preview() {
        let report = "═".repeat(200);
        let summary = summarize_result("get_muscle_volume", &json!({ "report": report }));
        assert!(summary.ends_with("═...]"));
    }
}
