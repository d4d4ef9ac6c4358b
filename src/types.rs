//! Core types shared by the gateway, the agent loop and the tools.
//!
//! - [`ConversationKey`]: identifies a conversation across channels
//! - [`AgentConfig`]: immutable per-agent configuration
//! - [`TokenUsage`]: token consumption statistics
//! - [`ToolCall`] / [`ToolResult`]: one tool invocation and its answer
//! - [`TurnBudget`]: per-turn limits derived from [`AgentConfig`]

use crate::error::ToolErrorKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

/// Identifies a conversation: the channel it arrived on plus the channel's
/// own conversation id (chat id, browser session, bridge jid).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey {
    pub channel_id: String,
    pub conversation_id: String,
}

impl ConversationKey {
    #[must_use]
    pub fn new(channel_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            conversation_id: conversation_id.into(),
        }
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.channel_id, self.conversation_id)
    }
}

/// Configuration for one logical agent.
///
/// Built once (usually by [`Config::agent_config`](crate::Config::agent_config))
/// and shared read-only by every turn the agent runs.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Workspace the tools operate in
    pub workspace: PathBuf,
    /// Primary model identifier, e.g. `anthropic/claude-opus-4-5`
    pub model: String,
    /// Model tried once when the primary fails with a transient or auth error
    pub backup_model: Option<String>,
    /// Maximum output tokens per model call
    pub max_tokens: u32,
    pub temperature: f32,
    /// Maximum tool calls resolved per turn
    pub max_tool_iterations: u32,
    /// Replaces the generated system prompt when set
    pub system_prompt: Option<String>,
    /// Wall-clock limit for a whole turn, model calls and tools included
    pub turn_timeout: Duration,
    /// Ceiling on input + output tokens consumed by one turn
    pub max_turn_tokens: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            model: "anthropic/claude-opus-4-5".to_string(),
            backup_model: None,
            max_tokens: 8192,
            temperature: 0.7,
            max_tool_iterations: 20,
            system_prompt: None,
            turn_timeout: Duration::from_secs(600),
            max_turn_tokens: None,
        }
    }
}

/// Token usage statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub const fn add(&mut self, other: &Self) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }

    #[must_use]
    pub const fn total(&self) -> u64 {
        self.input_tokens as u64 + self.output_tokens as u64
    }
}

/// A tool invocation requested by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back on the result
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
    /// Ordinal of the assistant message that carried this call
    pub origin_ordinal: u64,
}

/// Result of one tool call, fed back to the model as a tool message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the [`ToolCall`] this answers
    #[serde(default)]
    pub tool_call_id: String,
    /// Name of the tool that was called
    #[serde(default)]
    pub name: String,
    /// Whether the tool execution succeeded
    pub success: bool,
    /// Output content, or the error description when `success` is false
    pub output: String,
    /// Set when the call failed; `None` on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolErrorKind>,
    /// Output exceeded the sandbox cap and was cut
    #[serde(default)]
    pub truncated: bool,
    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Duration of the tool execution in milliseconds
    pub duration_ms: Option<u64>,
}

impl ToolResult {
    #[must_use]
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            tool_call_id: String::new(),
            name: String::new(),
            success: true,
            output: output.into(),
            error: None,
            truncated: false,
            data: None,
            duration_ms: None,
        }
    }

    #[must_use]
    pub fn success_with_data(output: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            ..Self::success(output)
        }
    }

    /// A failed call. Tools return this for expected failures (missing file,
    /// bad arguments); the executor uses [`ToolResult::failure`] for the rest.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::failure(ToolErrorKind::Runtime, message)
    }

    #[must_use]
    pub fn failure(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(kind),
            ..Self::success(message)
        }
    }

    /// Attach the call id and tool name this result answers.
    #[must_use]
    pub fn for_call(mut self, call: &ToolCall) -> Self {
        self.tool_call_id.clone_from(&call.id);
        self.name.clone_from(&call.name);
        self
    }

    #[must_use]
    pub const fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Cap `output` at `max_chars` characters, marking the result truncated.
    #[must_use]
    pub fn truncate_output(mut self, max_chars: usize) -> Self {
        let total = self.output.chars().count();
        if total > max_chars {
            let cut = self
                .output
                .char_indices()
                .nth(max_chars)
                .map_or(self.output.len(), |(idx, _)| idx);
            self.output.truncate(cut);
            self.output.push_str(&format!(
                "\n... (output truncated, {} more characters)",
                total - max_chars
            ));
            self.truncated = true;
        }
        self
    }
}

/// Limits for the turn in progress.
///
/// Created from [`AgentConfig`] when a turn starts and dropped when it ends.
#[derive(Clone, Debug)]
pub struct TurnBudget {
    remaining_iterations: u32,
    tokens_used: u64,
    token_limit: Option<u64>,
    deadline: Instant,
}

impl TurnBudget {
    #[must_use]
    pub fn new(config: &AgentConfig) -> Self {
        Self::starting_at(config, Instant::now())
    }

    #[must_use]
    pub fn starting_at(config: &AgentConfig, start: Instant) -> Self {
        Self {
            remaining_iterations: config.max_tool_iterations,
            tokens_used: 0,
            token_limit: config.max_turn_tokens,
            deadline: start + config.turn_timeout,
        }
    }

    #[must_use]
    pub const fn remaining_iterations(&self) -> u32 {
        self.remaining_iterations
    }

    #[must_use]
    pub const fn iterations_exhausted(&self) -> bool {
        self.remaining_iterations == 0
    }

    /// Count one resolved tool call. Stays at zero once reached.
    pub const fn consume_iteration(&mut self) {
        self.remaining_iterations = self.remaining_iterations.saturating_sub(1);
    }

    pub const fn record_usage(&mut self, usage: &TokenUsage) {
        self.tokens_used = self.tokens_used.saturating_add(usage.total());
    }

    #[must_use]
    pub const fn tokens_used(&self) -> u64 {
        self.tokens_used
    }

    #[must_use]
    pub const fn tokens_exhausted(&self) -> bool {
        match self.token_limit {
            Some(limit) => self.tokens_used >= limit,
            None => false,
        }
    }

    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    #[must_use]
    pub fn deadline_passed(&self) -> bool {
        Instant::now() >= self.deadline
    }
}
