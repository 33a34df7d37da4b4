//! Two-phase confirmation for destructive tool calls.
//!
//! Proposing a destructive call issues a [`PendingConfirmation`] and records
//! it in the [`ConfirmationLedger`]. Confirming takes the entry out of the
//! ledger, so a token works at most once. Only the ledger's copy is ever
//! executed: a caller-supplied confirmation is just a lookup key, and an
//! altered or fabricated one matches nothing.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::errors::AgentError;

/// Default lifetime of a pending confirmation.
pub const DEFAULT_CONFIRMATION_TTL_SECS: u64 = 300;

// ─── PendingConfirmation ────────────────────────────────────────────────────

/// A destructive call awaiting an explicit human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingConfirmation {
    token: Uuid,
    target_function: String,
    args: Value,
    confirmation_prompt: String,
    issued_at: DateTime<Utc>,
}

impl PendingConfirmation {
    pub fn token(&self) -> Uuid {
        self.token
    }

    pub fn target_function(&self) -> &str {
        &self.target_function
    }

    pub fn args(&self) -> &Value {
        &self.args
    }

    pub fn confirmation_prompt(&self) -> &str {
        &self.confirmation_prompt
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

// ─── ConfirmationLedger ─────────────────────────────────────────────────────

/// Outstanding confirmations, keyed by token.
///
/// The lock is only held for map operations, never across an await.
pub struct ConfirmationLedger {
    entries: Mutex<HashMap<Uuid, PendingConfirmation>>,
    ttl: Duration,
}

impl Default for ConfirmationLedger {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(DEFAULT_CONFIRMATION_TTL_SECS))
    }
}

impl ConfirmationLedger {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::from_std(ttl).unwrap_or(Duration::MAX),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, PendingConfirmation>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, pending: &PendingConfirmation, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(pending.issued_at) >= self.ttl
    }

    /// Record a new pending call and return the caller's copy.
    pub fn issue(&self, target_function: &str, args: Value, prompt: String) -> PendingConfirmation {
        let now = Utc::now();
        let pending = PendingConfirmation {
            token: Uuid::new_v4(),
            target_function: target_function.to_string(),
            args,
            confirmation_prompt: prompt,
            issued_at: now,
        };

        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, p| !self.is_expired(p, now));
        if entries.len() < before {
            tracing::debug!(purged = before - entries.len(), "purged expired confirmations");
        }
        entries.insert(pending.token, pending.clone());

        tracing::info!(
            token = %pending.token,
            tool = target_function,
            "destructive call awaiting confirmation"
        );
        pending
    }

    /// Remove and return the ledger's entry for this token.
    ///
    /// Fails for unknown, already-consumed, or expired tokens. Expired
    /// entries are removed too.
    pub fn take(&self, pending: &PendingConfirmation) -> Result<PendingConfirmation, AgentError> {
        let stored = self.lock().remove(&pending.token).ok_or_else(|| {
            AgentError::ConfirmationError {
                reason: "unknown or already used confirmation".into(),
            }
        })?;

        if self.is_expired(&stored, Utc::now()) {
            tracing::warn!(token = %stored.token, tool = %stored.target_function, "confirmation expired");
            return Err(AgentError::ConfirmationError {
                reason: "confirmation expired".into(),
            });
        }
        Ok(stored)
    }

    /// Drop a pending entry. Returns whether it was outstanding.
    pub fn discard(&self, pending: &PendingConfirmation) -> bool {
        let removed = self.lock().remove(&pending.token).is_some();
        if removed {
            tracing::info!(token = %pending.token, tool = %pending.target_function, "confirmation declined");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue(ledger: &ConfirmationLedger) -> PendingConfirmation {
        ledger.issue("delete_workout", json!({"workout_id": "w-1"}), "Delete workout 'w-1'?".into())
    }

    #[test]
    fn test_take_is_exactly_once() {
        let ledger = ConfirmationLedger::default();
        let pending = issue(&ledger);
        assert_eq!(ledger.len(), 1);

        let stored = ledger.take(&pending).unwrap();
        assert_eq!(stored, pending);
        assert!(ledger.is_empty());
        assert!(ledger.take(&pending).is_err());
    }

    #[test]
    fn test_forged_token_rejected() {
        let ledger = ConfirmationLedger::default();
        let pending = issue(&ledger);

        let mut forged = serde_json::to_value(&pending).unwrap();
        forged["token"] = json!(Uuid::new_v4());
        let forged: PendingConfirmation = serde_json::from_value(forged).unwrap();
        assert!(ledger.take(&forged).is_err());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_altered_args_are_ignored() {
        let ledger = ConfirmationLedger::default();
        let pending = issue(&ledger);

        let mut altered = serde_json::to_value(&pending).unwrap();
        altered["args"] = json!({"workout_id": "w-999"});
        altered["targetFunction"] = json!("clear_workout_history");
        let altered: PendingConfirmation = serde_json::from_value(altered).unwrap();

        let stored = ledger.take(&altered).unwrap();
        assert_eq!(stored.target_function(), "delete_workout");
        assert_eq!(stored.args()["workout_id"], "w-1");
    }

    #[test]
    fn test_expired_confirmation_rejected() {
        let ledger = ConfirmationLedger::new(std::time::Duration::ZERO);
        let pending = issue(&ledger);
        let err = ledger.take(&pending).unwrap_err();
        assert!(err.to_string().contains("expired"));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_discard() {
        let ledger = ConfirmationLedger::default();
        let pending = issue(&ledger);
        assert!(ledger.discard(&pending));
        assert!(!ledger.discard(&pending));
        assert!(ledger.take(&pending).is_err());
    }

    #[test]
    fn test_serializes_camel_case() {
        let ledger = ConfirmationLedger::default();
        let json = serde_json::to_value(issue(&ledger)).unwrap();
        assert_eq!(json["targetFunction"], "delete_workout");
        assert!(json.get("confirmationPrompt").is_some());
        assert!(json.get("issuedAt").is_some());
    }
}
