use super::helpers::ITERATION_BUDGET_NOTE;
use super::types::TurnState;
use super::{AgentLoop, Turn};
use crate::conversation::Conversation;
use crate::error::AgentError;
use crate::events::AgentEvent;
use crate::llm::Message;
use crate::types::ToolCall;
use log::{debug, warn};

impl AgentLoop {
    /// Resolve every pending call in emission order, one tool-result message
    /// each, then decide whether the model gets another round.
    pub(super) async fn await_tools(
        &self,
        turn: &mut Turn<'_>,
        conversation: &mut Conversation,
        calls: Vec<ToolCall>,
    ) -> TurnState {
        for call in &calls {
            self.emit(
                turn,
                AgentEvent::ToolCallStart {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.arguments.clone(),
                },
            );

            // Once cancelled, the executor answers the remaining calls with
            // `Cancelled` results without running them
            let result = self
                .executor
                .execute_until(call, &self.sandbox, turn.cancel, Some(turn.budget.deadline()))
                .await;

            if result.success {
                debug!(
                    "Tool {} succeeded for {} in {:?}ms",
                    call.name, turn.key, result.duration_ms
                );
            } else {
                warn!(
                    "Tool {} failed for {} ({:?}): {}",
                    call.name,
                    turn.key,
                    result.error,
                    truncate_for_log(&result.output)
                );
            }

            conversation.append(Message::tool_result(&result));
            turn.budget.consume_iteration();
            turn.summary.tool_calls = turn.summary.tool_calls.saturating_add(1);

            self.emit(
                turn,
                AgentEvent::ToolCallEnd {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    result,
                },
            );
        }

        if turn.cancel.is_cancelled() {
            return TurnState::Failed(AgentError::Cancelled);
        }

        if turn.budget.iterations_exhausted() {
            warn!(
                "Iteration budget exhausted for {} after {} tool call(s)",
                turn.key, turn.summary.tool_calls
            );
            conversation.append(Message::assistant(ITERATION_BUDGET_NOTE));
            return TurnState::Done {
                reply: ITERATION_BUDGET_NOTE.to_string(),
                budget_exhausted: true,
            };
        }

        TurnState::AwaitingModel
    }
}

fn truncate_for_log(output: &str) -> &str {
    match output.char_indices().nth(200) {
        Some((idx, _)) => &output[..idx],
        None => output,
    }
}
