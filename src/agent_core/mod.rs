//! Agent Core: orchestration layer for RepCoach.
//!
//! Submodules:
//! - `intent`: Lexical intent routing (workout / app control / general)
//! - `reasoning`: Workout reasoning state machine, one pure reducer per step
//! - `tool_registry`: Declared app-control tools and their parameter schemas
//! - `tool_dispatcher`: Validates and runs model-proposed tool calls
//! - `confirmation`: Two-phase propose/confirm ledger for destructive tools
//! - `services`: The domain-service seam behind the tools
//! - `conversation`: Bounded, caller-owned conversation memory
//! - `orchestrator`: `CoachAgent`, the turn and confirmation entry points
//! - `types`: Shared types across the agent core
//! - `errors`: Agent-level error types

pub mod confirmation;
pub mod conversation;
pub mod errors;
pub mod intent;
pub mod orchestrator;
pub mod reasoning;
pub mod services;
pub mod tool_dispatcher;
pub mod tool_registry;
pub mod types;

// Re-exports for convenience
pub use confirmation::{ConfirmationLedger, PendingConfirmation};
pub use conversation::ConversationSession;
pub use errors::AgentError;
pub use intent::{IntentAnalysis, IntentRouter};
pub use orchestrator::CoachAgent;
pub use reasoning::{ReasoningMachine, ReasoningState, ReasoningStep, StepError};
pub use services::{DomainServices, InMemoryDomainServices};
pub use tool_dispatcher::{DispatchOutcome, ToolDispatcher};
pub use tool_registry::{ToolCatalog, ToolDeclaration, ToolKind};
pub use types::{
    ConfirmationOutcome, HistoryEntry, HistoryRole, Intent, TurnRequest, TurnResult, UserProfile,
};
