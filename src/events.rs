//! Turn progress events.
//!
//! The agent loop can report what it is doing to an optional
//! `mpsc::Sender<AgentEventEnvelope>`. Sends never block: when the receiver
//! lags, events are dropped rather than stalling the turn.
//!
//! A typical turn:
//! 1. `RoundStart` - A model call is about to be made
//! 2. `ToolCallStart` / `ToolCallEnd` - One pair per requested tool call
//! 3. `Failover` - Only when the primary model failed and the backup took over
//! 4. `Done` or `Failed`

use crate::types::{ConversationKey, TokenUsage, ToolResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A model call is about to be made
    RoundStart { round: u32, model: String },

    ToolCallStart {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    ToolCallEnd {
        id: String,
        name: String,
        result: ToolResult,
    },

    /// The primary model failed and the turn continues on the backup
    Failover {
        from_model: String,
        to_model: String,
        /// Error class of the primary failure (`transient` or `auth`)
        reason: String,
    },

    Done {
        rounds: u32,
        tool_calls: u32,
        degraded: bool,
        budget_exhausted: bool,
        usage: TokenUsage,
    },

    /// The turn ended without an answer. `error` is safe to show to users.
    Failed { error: String },
}

impl AgentEvent {
    #[must_use]
    pub const fn round_start(round: u32, model: String) -> Self {
        Self::RoundStart { round, model }
    }

    #[must_use]
    pub const fn failed(error: String) -> Self {
        Self::Failed { error }
    }
}

/// Per-turn event sequence numbers, shared by clones.
#[derive(Clone, Debug)]
pub struct SequenceCounter(Arc<AtomicU64>);

impl SequenceCounter {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(0)))
    }

    #[must_use]
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// An [`AgentEvent`] tagged with the conversation it belongs to.
///
/// The event is flattened in JSON, so `type` sits next to `event_id`,
/// `sequence`, `timestamp` and `key`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentEventEnvelope {
    pub event_id: uuid::Uuid,
    /// Increases by one per event within a turn, starting at 0
    pub sequence: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub key: ConversationKey,
    #[serde(flatten)]
    pub event: AgentEvent,
}

impl AgentEventEnvelope {
    #[must_use]
    pub fn wrap(event: AgentEvent, key: &ConversationKey, seq: &SequenceCounter) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4(),
            sequence: seq.next(),
            timestamp: OffsetDateTime::now_utc(),
            key: key.clone(),
            event,
        }
    }
}
