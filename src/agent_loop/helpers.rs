use crate::events::{AgentEvent, AgentEventEnvelope, SequenceCounter};
use crate::types::{AgentConfig, ConversationKey};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::mpsc;

/// Reply used when the model returns neither text nor tool calls.
pub(super) const EMPTY_RESPONSE_FALLBACK: &str =
    "I've completed processing but have no response to give.";

/// Assistant note appended when a turn runs out of tool iterations.
pub(super) const ITERATION_BUDGET_NOTE: &str =
    "Iteration budget exhausted: I stopped using tools before finishing. Ask me to continue if you need more.";

/// Send an event without waiting. A full or closed channel drops the event.
pub(super) fn send_event(
    tx: Option<&mpsc::Sender<AgentEventEnvelope>>,
    key: &ConversationKey,
    seq: &SequenceCounter,
    event: AgentEvent,
) {
    let Some(tx) = tx else {
        return;
    };
    if tx
        .try_send(AgentEventEnvelope::wrap(event, key, seq))
        .is_err()
    {
        log::debug!("Event receiver lagging or closed, dropping event for {key}");
    }
}

/// System prompt for a model call: the configured override, or the
/// default assistant identity with the workspace and current time.
pub(super) fn system_prompt(config: &AgentConfig, now: OffsetDateTime) -> String {
    if let Some(prompt) = &config.system_prompt {
        return prompt.clone();
    }

    let now = now.format(&Rfc3339).unwrap_or_default();
    format!(
        "You are a personal AI assistant. You can run shell commands, read, write and edit files, \
         list directories and search the web.\n\n\
         Current time: {now}\n\
         Workspace: {}\n\n\
         Answer directly for normal conversation. Use tools only when they help, and keep file \
         operations inside the workspace.",
        config.workspace.display()
    )
}
