//! Append-only conversation history.

use crate::llm::{Message, Role};
use crate::types::ConversationKey;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use time::OffsetDateTime;

/// Ordered message history for one [`ConversationKey`].
///
/// Messages are only ever appended. [`Conversation::append`] assigns each
/// message the next ordinal, so ordinals increase strictly across turns and
/// are never rewritten.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub key: ConversationKey,
    messages: Vec<Message>,
    next_ordinal: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Conversation {
    #[must_use]
    pub fn new(key: ConversationKey) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            key,
            messages: Vec::new(),
            next_ordinal: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message, assigning it the next ordinal. Returns that ordinal.
    pub fn append(&mut self, mut message: Message) -> u64 {
        let ordinal = self.next_ordinal;
        message.ordinal = ordinal;
        self.messages.push(message);
        self.next_ordinal += 1;
        self.updated_at = OffsetDateTime::now_utc();
        ordinal
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn last_ordinal(&self) -> Option<u64> {
        self.messages.last().map(|m| m.ordinal)
    }

    /// Tool-use ids that have no matching tool result yet, in emission order.
    #[must_use]
    pub fn unresolved_tool_calls(&self) -> Vec<&str> {
        let answered: HashSet<&str> = self
            .messages
            .iter()
            .flat_map(Message::tool_result_ids)
            .collect();

        self.messages
            .iter()
            .flat_map(Message::tool_use_ids)
            .filter(|id| !answered.contains(id))
            .collect()
    }

    /// Every tool call in the history has been answered.
    #[must_use]
    pub fn is_turn_complete(&self) -> bool {
        self.unresolved_tool_calls().is_empty()
    }

    /// The last `limit` user and assistant text messages, oldest first.
    /// Tool plumbing is skipped.
    #[must_use]
    pub fn recent_chat(&self, limit: usize) -> Vec<&Message> {
        let mut recent: Vec<&Message> = self
            .messages
            .iter()
            .rev()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
            .filter(|m| m.tool_use_ids().next().is_none())
            .take(limit)
            .collect();
        recent.reverse();
        recent
    }
}
