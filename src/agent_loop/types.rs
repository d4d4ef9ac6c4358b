use crate::error::AgentError;
use crate::types::{TokenUsage, ToolCall};

/// Where a turn currently is.
#[derive(Debug)]
pub(super) enum TurnState {
    AwaitingModel,
    AwaitingTool(Vec<ToolCall>),
    Done {
        reply: String,
        budget_exhausted: bool,
    },
    Failed(AgentError),
}

/// Counters collected over one turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TurnSummary {
    /// Model calls that returned a response
    pub rounds: u32,
    /// Tool calls resolved, failed ones included
    pub tool_calls: u32,
    pub usage: TokenUsage,
    /// The backup model answered at least one round
    pub degraded: bool,
}

/// How a turn ended.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnOutcome {
    Done {
        reply: String,
        /// The turn stopped on the iteration budget and `reply` is the budget note
        budget_exhausted: bool,
        summary: TurnSummary,
    },
    Failed {
        error: AgentError,
        summary: TurnSummary,
    },
}

impl TurnOutcome {
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    /// Final answer, if the turn produced one.
    #[must_use]
    pub fn reply(&self) -> Option<&str> {
        match self {
            Self::Done { reply, .. } => Some(reply),
            Self::Failed { .. } => None,
        }
    }

    #[must_use]
    pub const fn error(&self) -> Option<&AgentError> {
        match self {
            Self::Done { .. } => None,
            Self::Failed { error, .. } => Some(error),
        }
    }

    #[must_use]
    pub const fn summary(&self) -> &TurnSummary {
        match self {
            Self::Done { summary, .. } | Self::Failed { summary, .. } => summary,
        }
    }

    #[must_use]
    pub const fn degraded(&self) -> bool {
        self.summary().degraded
    }
}
