//! ConversationSession: bounded, caller-owned conversation memory.
//!
//! Responsibilities:
//! - Keep the most recent `max_turns` turns; the oldest turn is evicted first
//! - Render history as `Vec<ChatMessage>` within an approximate token budget
//!
//! Sessions are plain values passed to each turn, so there is no global
//! registry keyed by session id.

use std::collections::VecDeque;

use uuid::Uuid;

use crate::inference::types::ChatMessage;

use super::types::HistoryEntry;

/// Default number of turns a session remembers.
pub const DEFAULT_MAX_TURNS: usize = 20;

/// Role label and formatting cost of one rendered message.
const MESSAGE_FRAMING_TOKENS: u32 = 4;

/// Bytes of English text per token. Errs toward overestimating.
const BYTES_PER_TOKEN: f64 = 3.2;

// ─── Turn ───────────────────────────────────────────────────────────────────

/// One exchange. `assistant` is `None` for aborted turns.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Turn {
    user: String,
    assistant: Option<String>,
}

impl Turn {
    fn messages(&self) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::user(self.user.as_str())];
        if let Some(reply) = &self.assistant {
            messages.push(ChatMessage::assistant(reply.as_str()));
        }
        messages
    }

    /// Approximate prompt tokens of the rendered turn.
    fn estimated_tokens(&self) -> u32 {
        let text = |t: &str| MESSAGE_FRAMING_TOKENS + (t.len() as f64 / BYTES_PER_TOKEN).ceil() as u32;
        text(&self.user) + self.assistant.as_deref().map_or(0, text)
    }
}

// ─── ConversationSession ────────────────────────────────────────────────────

/// Recent turns of one conversation.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    session_id: String,
    max_turns: usize,
    turns: VecDeque<Turn>,
}

impl ConversationSession {
    /// A session holding at most `max_turns` turns (at least one).
    pub fn new(session_id: impl Into<String>, max_turns: usize) -> Self {
        let max_turns = max_turns.max(1);
        Self {
            session_id: session_id.into(),
            max_turns,
            turns: VecDeque::with_capacity(max_turns),
        }
    }

    /// A session with a random id and the default size.
    pub fn anonymous() -> Self {
        Self::new(Uuid::new_v4().to_string(), DEFAULT_MAX_TURNS)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Record a finished turn, evicting the oldest when full.
    pub fn record(&mut self, user: impl Into<String>, assistant: Option<String>) {
        if self.turns.len() == self.max_turns {
            self.turns.pop_front();
            tracing::debug!(session_id = %self.session_id, "evicted oldest turn");
        }
        self.turns.push_back(Turn {
            user: user.into(),
            assistant: assistant.filter(|a| !a.is_empty()),
        });
    }

    /// All remembered entries, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.turns
            .iter()
            .flat_map(|turn| {
                std::iter::once(HistoryEntry::user(turn.user.as_str()))
                    .chain(turn.assistant.as_deref().map(HistoryEntry::assistant))
            })
            .collect()
    }

    /// The newest whole turns whose estimated size fits `max_tokens`,
    /// rendered oldest first.
    pub fn to_chat_messages(&self, max_tokens: u32) -> Vec<ChatMessage> {
        let mut used = 0u32;
        let mut kept: Vec<Vec<ChatMessage>> = Vec::new();

        for turn in self.turns.iter().rev() {
            let cost = turn.estimated_tokens();
            if used + cost > max_tokens {
                break;
            }
            used += cost;
            kept.push(turn.messages());
        }

        if kept.len() < self.turns.len() {
            tracing::debug!(
                session_id = %self.session_id,
                kept_turns = kept.len(),
                total_turns = self.turns.len(),
                budget = max_tokens,
                "history trimmed to token budget"
            );
        }
        kept.into_iter().rev().flatten().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::types::HistoryRole;
    use crate::inference::types::Role;

    #[test]
    fn test_oldest_turn_evicted_first() {
        let mut session = ConversationSession::new("s1", 2);
        session.record("one", Some("reply one".into()));
        session.record("two", Some("reply two".into()));
        session.record("three", None);

        assert_eq!(session.len(), 2);
        let history = session.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0], HistoryEntry::user("two"));
        assert_eq!(history[1].role, HistoryRole::Assistant);
        assert_eq!(history[2], HistoryEntry::user("three"));
    }

    #[test]
    fn test_zero_capacity_keeps_one_turn() {
        let mut session = ConversationSession::new("s1", 0);
        session.record("a", None);
        session.record("b", None);
        assert_eq!(session.max_turns(), 1);
        assert_eq!(session.history(), vec![HistoryEntry::user("b")]);
    }

    #[test]
    fn test_chat_messages_respect_token_budget() {
        let mut session = ConversationSession::new("s1", 10);
        session.record("x".repeat(400), Some("y".repeat(400)));
        session.record("latest question", Some("latest answer".into()));

        let all = session.to_chat_messages(10_000);
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].role, Role::User);

        let recent = session.to_chat_messages(50);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text(), "latest question");
        assert_eq!(recent[1].text(), "latest answer");

        assert!(session.to_chat_messages(0).is_empty());
    }

    #[test]
    fn test_turn_estimate_counts_both_sides() {
        let question = Turn {
            user: "Hello, world!".into(),
            assistant: None,
        };
        // 4 framing + ceil(13 / 3.2)
        assert_eq!(question.estimated_tokens(), 9);

        let answered = Turn {
            assistant: Some("a".repeat(32)),
            ..question
        };
        assert_eq!(answered.estimated_tokens(), 9 + 4 + 10);
    }

    #[test]
    fn test_empty_reply_is_not_remembered() {
        let mut session = ConversationSession::anonymous();
        session.record("hello", Some(String::new()));
        assert_eq!(session.history(), vec![HistoryEntry::user("hello")]);
        session.clear();
        assert!(session.is_empty());
    }
}
