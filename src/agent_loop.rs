//! The think, act, observe cycle for one user turn.
//!
//! A turn starts in `AwaitingModel` after the user message is appended. Each
//! model response either ends the turn with an answer or moves it to
//! `AwaitingTool`, where every requested call is resolved in order before the
//! model is asked again. The loop stops on:
//!
//! - a final answer (`Done`)
//! - the tool iteration budget reaching zero (`Done` with a budget note)
//! - a provider failure that failover could not absorb (`Failed`)
//! - the turn deadline or token ceiling (`Failed(BudgetExhausted)`)
//! - cancellation (`Failed(Cancelled)`)
//!
//! History is append-only and every tool call is answered before the next
//! model call, so a conversation is consistent whenever a turn returns.

mod builder;
mod helpers;
mod llm;
mod tool_execution;
mod types;

#[cfg(test)]
pub(crate) mod test_utils;
#[cfg(test)]
mod tests;

pub use builder::AgentLoopBuilder;
pub use types::{TurnOutcome, TurnSummary};

use self::helpers::{EMPTY_RESPONSE_FALLBACK, ITERATION_BUDGET_NOTE, send_event, system_prompt};
use self::types::TurnState;
use crate::conversation::Conversation;
use crate::error::{AgentError, BudgetKind};
use crate::events::{AgentEvent, AgentEventEnvelope, SequenceCounter};
use crate::llm::{ChatRequest, LlmProvider, Message, ModelResponse, select_response};
use crate::sandbox::SandboxConfig;
use crate::tools::{ToolExecutor, ToolRegistry};
use crate::types::{AgentConfig, ConversationKey, ToolCall, TurnBudget};
use log::{info, warn};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Runs turns for one logical agent.
///
/// The loop holds no per-conversation state; the same instance serves every
/// conversation routed to it, concurrently.
pub struct AgentLoop {
    primary: Arc<dyn LlmProvider>,
    backup: Option<Arc<dyn LlmProvider>>,
    executor: ToolExecutor,
    sandbox: Arc<SandboxConfig>,
    config: Arc<AgentConfig>,
    events: Option<mpsc::Sender<AgentEventEnvelope>>,
}

/// Mutable state of the turn in progress.
struct Turn<'a> {
    key: ConversationKey,
    cancel: &'a CancellationToken,
    budget: TurnBudget,
    seq: SequenceCounter,
    summary: TurnSummary,
    /// Set after the first failover; the rest of the turn uses the backup
    failed_over: bool,
}

impl AgentLoop {
    #[must_use]
    pub fn builder() -> AgentLoopBuilder {
        AgentLoopBuilder::new()
    }

    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        self.executor.registry()
    }

    #[must_use]
    pub const fn sandbox(&self) -> &Arc<SandboxConfig> {
        &self.sandbox
    }

    /// Run one turn: append `user_text` to `conversation` and drive the model
    /// and tools until the turn ends.
    ///
    /// Never fails outright; failures are reported in [`TurnOutcome::Failed`]
    /// with the conversation left in its last consistent state.
    pub async fn run_turn(
        &self,
        conversation: &mut Conversation,
        user_text: &str,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let mut turn = Turn {
            key: conversation.key.clone(),
            cancel,
            budget: TurnBudget::new(&self.config),
            seq: SequenceCounter::new(),
            summary: TurnSummary::default(),
            failed_over: false,
        };

        conversation.append(Message::user(user_text));

        info!(
            "Starting turn for {} (model={}, iterations={})",
            turn.key,
            self.config.model,
            turn.budget.remaining_iterations()
        );

        let mut state = TurnState::AwaitingModel;
        loop {
            state = match state {
                TurnState::AwaitingModel => self.await_model(&mut turn, conversation).await,
                TurnState::AwaitingTool(calls) => {
                    self.await_tools(&mut turn, conversation, calls).await
                }
                TurnState::Done {
                    reply,
                    budget_exhausted,
                } => {
                    info!(
                        "Turn for {} done (rounds={}, tool_calls={}, degraded={})",
                        turn.key, turn.summary.rounds, turn.summary.tool_calls, turn.summary.degraded
                    );
                    self.emit(
                        &turn,
                        AgentEvent::Done {
                            rounds: turn.summary.rounds,
                            tool_calls: turn.summary.tool_calls,
                            degraded: turn.summary.degraded,
                            budget_exhausted,
                            usage: turn.summary.usage,
                        },
                    );
                    return TurnOutcome::Done {
                        reply,
                        budget_exhausted,
                        summary: turn.summary,
                    };
                }
                TurnState::Failed(error) => {
                    warn!("Turn for {} failed: {error}", turn.key);
                    self.emit(&turn, AgentEvent::failed(error.user_message().to_string()));
                    return TurnOutcome::Failed {
                        error,
                        summary: turn.summary,
                    };
                }
            };
        }
    }

    async fn await_model(&self, turn: &mut Turn<'_>, conversation: &mut Conversation) -> TurnState {
        if turn.cancel.is_cancelled() {
            return TurnState::Failed(AgentError::Cancelled);
        }
        if turn.budget.deadline_passed() {
            return TurnState::Failed(AgentError::BudgetExhausted(BudgetKind::Deadline));
        }
        if turn.budget.tokens_exhausted() {
            return TurnState::Failed(AgentError::BudgetExhausted(BudgetKind::Tokens));
        }

        // With no iterations left the model is not offered any tools
        let tools_allowed = !turn.budget.iterations_exhausted();
        let request = ChatRequest {
            model: self.current_model(turn).to_string(),
            system: system_prompt(&self.config, OffsetDateTime::now_utc()),
            messages: conversation.messages().to_vec(),
            tools: tools_allowed.then(|| self.executor.registry().to_llm_tools()),
            max_tokens: self.config.max_tokens,
            temperature: Some(self.config.temperature),
        };

        self.emit(
            turn,
            AgentEvent::round_start(turn.summary.rounds.saturating_add(1), request.model.clone()),
        );

        let cancel = turn.cancel;
        let deadline = turn.budget.deadline();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return TurnState::Failed(AgentError::Cancelled),
            () = tokio::time::sleep_until(deadline) => {
                return TurnState::Failed(AgentError::BudgetExhausted(BudgetKind::Deadline));
            }
            result = self.invoke(turn, request) => result,
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => return TurnState::Failed(AgentError::Provider(e)),
        };

        turn.summary.rounds = turn.summary.rounds.saturating_add(1);
        turn.summary.usage.add(&response.usage);
        turn.budget.record_usage(&response.usage);

        match select_response(&response) {
            ModelResponse::Final(text) => {
                let reply = text.unwrap_or_else(|| EMPTY_RESPONSE_FALLBACK.to_string());
                conversation.append(Message::assistant(&reply));
                TurnState::Done {
                    reply,
                    budget_exhausted: false,
                }
            }
            ModelResponse::ToolCalls(requests) if !tools_allowed => {
                warn!(
                    "Model requested {} tool call(s) for {} with no iterations left, ignoring",
                    requests.len(),
                    turn.key
                );
                conversation.append(Message::assistant(ITERATION_BUDGET_NOTE));
                TurnState::Done {
                    reply: ITERATION_BUDGET_NOTE.to_string(),
                    budget_exhausted: true,
                }
            }
            ModelResponse::ToolCalls(_) if turn.budget.tokens_exhausted() => {
                TurnState::Failed(AgentError::BudgetExhausted(BudgetKind::Tokens))
            }
            ModelResponse::ToolCalls(mut requests) => {
                for request in &mut requests {
                    if request.id.is_empty() {
                        request.id = format!("call_{}", uuid::Uuid::new_v4().simple());
                    }
                }

                let ordinal = conversation.append(Message::assistant_with_tool_calls(&requests));
                let calls = requests
                    .into_iter()
                    .map(|r| ToolCall {
                        id: r.id,
                        name: r.name,
                        arguments: r.input,
                        origin_ordinal: ordinal,
                    })
                    .collect();
                TurnState::AwaitingTool(calls)
            }
        }
    }

    fn emit(&self, turn: &Turn<'_>, event: AgentEvent) {
        send_event(self.events.as_ref(), &turn.key, &turn.seq, event);
    }
}
