//! Conversation session state.
//!
//! A session is an append-only message history plus the flag recording
//! whether the last turn handed control back to a human.

use crate::message::Message;
use chrono::{DateTime, Utc};
use courier_core::ConversationSessionId;
use serde::{Deserialize, Serialize};

/// A conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    /// Unique session identifier.
    pub id: ConversationSessionId,
    messages: Vec<Message>,
    awaiting_human: bool,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last active.
    pub last_active_at: DateTime<Utc>,
}

impl ConversationSession {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationSessionId::new(),
            messages: Vec::new(),
            awaiting_human: false,
            created_at: now,
            last_active_at: now,
        }
    }

    /// Appends a message to the history.
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.last_active_at = Utc::now();
    }

    /// The full history, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// True if the last turn could not be completed autonomously.
    #[must_use]
    pub fn awaiting_human(&self) -> bool {
        self.awaiting_human
    }

    pub(crate) fn set_awaiting_human(&mut self, awaiting_human: bool) {
        self.awaiting_human = awaiting_human;
    }

    /// Returns the number of messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Returns the last message, if any.
    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_creation() {
        let session = ConversationSession::new();

        assert!(session.messages().is_empty());
        assert!(!session.awaiting_human());
        assert_eq!(session.created_at, session.last_active_at);
    }

    #[test]
    fn session_add_message() {
        let mut session = ConversationSession::new();
        session.add_message(Message::user("Hello!"));

        assert_eq!(session.message_count(), 1);
        assert_eq!(session.last_message().unwrap().content, "Hello!");
        assert!(session.last_active_at >= session.created_at);
    }

    #[test]
    fn session_serde_roundtrip() {
        let mut session = ConversationSession::new();
        session.add_message(Message::user("Test"));
        session.set_awaiting_human(true);

        let json = serde_json::to_string(&session).expect("serialize");
        let parsed: ConversationSession = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(session.id, parsed.id);
        assert_eq!(parsed.message_count(), 1);
        assert!(parsed.awaiting_human());
    }
}
