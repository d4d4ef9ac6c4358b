//! Error taxonomy.
//!
//! Provider, tool and loop failures are typed so the agent loop can decide
//! between failover, surfacing the failure to the model as data, and ending
//! the turn. Infrastructure code (config, stores, tool bodies) uses
//! [`anyhow::Result`] and is mapped into these types at the boundaries.

use crate::types::ConversationKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified failure of a single model invocation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Rate limit, request timeout, 5xx, or a network failure. Eligible for failover.
    #[error("transient provider error: {0}")]
    Transient(String),
    /// Credentials rejected (401/403). Eligible for failover to the backup model.
    #[error("provider rejected credentials: {0}")]
    Auth(String),
    /// Any other 4xx, an unparseable response, or missing provider configuration.
    #[error("fatal provider error: {0}")]
    Fatal(String),
}

impl ProviderError {
    /// Whether the agent loop may retry this invocation on the backup model.
    #[must_use]
    pub const fn allows_failover(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Auth(_))
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Transient(_) => "transient",
            Self::Auth(_) => "auth",
            Self::Fatal(_) => "fatal",
        }
    }

    /// Classify a `reqwest` transport failure.
    ///
    /// Connection, timeout and body errors are transient; a request that could
    /// not even be built is fatal.
    #[must_use]
    pub fn from_transport(error: &reqwest::Error) -> Self {
        if error.is_builder() {
            Self::Fatal(format!("failed to build request: {error}"))
        } else if error.is_decode() {
            Self::Fatal(format!("failed to decode response: {error}"))
        } else {
            Self::Transient(format!("request failed: {error}"))
        }
    }
}

/// Kind of failure recorded on a [`ToolResult`](crate::ToolResult).
///
/// Tool failures never end a turn; they are shown to the model as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    Timeout,
    SandboxViolation,
    UnknownTool,
    Runtime,
    Cancelled,
}

/// Pre-execution rejection raised by a tool's sandbox check.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SandboxError {
    #[error("path '{path}' is outside the workspace {workspace}")]
    OutsideWorkspace { path: String, workspace: String },
    #[error("command blocked by safety guard: {0}")]
    DeniedCommand(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid denied command pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl SandboxError {
    #[must_use]
    pub const fn kind(&self) -> ToolErrorKind {
        match self {
            Self::OutsideWorkspace { .. } | Self::DeniedCommand(_) => {
                ToolErrorKind::SandboxViolation
            }
            Self::InvalidInput(_) | Self::InvalidPattern { .. } => ToolErrorKind::Runtime,
        }
    }
}

/// Which turn budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetKind {
    Deadline,
    Tokens,
}

impl std::fmt::Display for BudgetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deadline => write!(f, "turn deadline"),
            Self::Tokens => write!(f, "token budget"),
        }
    }
}

/// Turn-fatal failure returned by the agent loop.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("{0} exhausted")]
    BudgetExhausted(BudgetKind),
    #[error("turn cancelled")]
    Cancelled,
}

impl AgentError {
    /// Message safe to show an end user. Never includes provider details.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Provider(ProviderError::Transient(_)) => {
                "Sorry, the assistant is temporarily unavailable. Please try again in a moment."
            }
            Self::Provider(ProviderError::Auth(_) | ProviderError::Fatal(_)) => {
                "Sorry, the assistant could not process this request."
            }
            Self::BudgetExhausted(BudgetKind::Deadline) => {
                "Sorry, this request took too long and was stopped."
            }
            Self::BudgetExhausted(BudgetKind::Tokens) => {
                "Sorry, this request used up its processing budget and was stopped."
            }
            Self::Cancelled => "The request was cancelled.",
        }
    }
}

/// Failure of [`GatewayRouter::route`](crate::GatewayRouter::route).
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Another turn for the same conversation is still running.
    #[error("conversation {0} already has a turn in flight")]
    RouterConflict(ConversationKey),
    #[error("no adapter registered for channel '{0}'")]
    UnknownChannel(String),
    #[error("sender '{sender}' is not allowed on channel '{channel}'")]
    SenderNotAllowed { channel: String, sender: String },
    #[error("session store failure for {key}: {source}")]
    Store {
        key: ConversationKey,
        #[source]
        source: anyhow::Error,
    },
}

impl GatewayError {
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::RouterConflict(_) => {
                "I'm still working on your previous message. Please wait for it to finish."
            }
            Self::UnknownChannel(_) | Self::Store { .. } => {
                "Sorry, something went wrong on our side. Please try again later."
            }
            Self::SenderNotAllowed { .. } => "You are not allowed to use this assistant.",
        }
    }
}
