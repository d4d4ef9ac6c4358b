//! nanogate - a personal AI-assistant gateway.
//!
//! Messages arrive from front-end channels, are routed to an agent, and are
//! answered by an LLM that may call tools along the way:
//!
//! - Channel adapters for a local web chat, Telegram and a WhatsApp bridge
//! - A gateway router with per-conversation exclusion and persistence
//! - A budgeted agent loop (iterations, tokens, deadline) with one-shot
//!   failover to a backup model
//! - OpenAI-compatible providers, Azure OpenAI included
//! - Sandboxed workspace tools: shell, files, web search
//!
//! # Example
//!
//! ```ignore
//! use nanogate::{AgentLoop, ChannelEvent, Config, GatewayRouter, InMemoryStore};
//! use std::sync::Arc;
//!
//! let config = Config::load_default()?;
//! let agent = AgentLoop::builder()
//!     .config(config.agent_config())
//!     .provider_registry(config.provider_registry())
//!     .tools(config.tool_registry())
//!     .sandbox(config.sandbox_config()?)
//!     .build()?;
//!
//! let mut router = GatewayRouter::new(Arc::new(agent), Arc::new(InMemoryStore::new()));
//! for adapter in config.channel_adapters() {
//!     router = router.with_adapter(adapter);
//! }
//!
//! let response = router
//!     .handle(ChannelEvent::new("web", "session-1", "client-1", "What's 2+2?"))
//!     .await;
//! println!("{}", response.text);
//! ```

#![forbid(unsafe_code)]

mod agent_loop;
pub mod channels;
pub mod config;
mod conversation;
pub mod error;
pub mod events;
mod gateway;
pub mod llm;
pub mod primitive_tools;
pub mod providers;
mod sandbox;
mod stores;
mod tools;
mod types;
pub mod web;

pub use agent_loop::{AgentLoop, AgentLoopBuilder, TurnOutcome, TurnSummary};
pub use channels::{Attachment, ChannelAdapter, ChannelEvent, ChannelResponse, ResponseStatus};
pub use config::Config;
pub use conversation::Conversation;
pub use error::{AgentError, BudgetKind, GatewayError, ProviderError, SandboxError, ToolErrorKind};
pub use events::{AgentEvent, AgentEventEnvelope};
pub use gateway::GatewayRouter;
pub use llm::LlmProvider;
pub use sandbox::SandboxConfig;
pub use stores::{FileStore, InMemoryStore, SessionStore};
pub use tools::{Tool, ToolContext, ToolExecutor, ToolRegistry};
pub use types::{AgentConfig, ConversationKey, TokenUsage, ToolCall, ToolResult, TurnBudget};
