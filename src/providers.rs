//! LLM backends.
//!
//! Every backend speaks the Chat Completions wire shape. [`ProviderRegistry`]
//! holds the configured backends and builds a [`Provider`] for a model id.

pub mod azure;
pub mod openai;
pub mod registry;
mod wire;

pub use azure::AzureProvider;
pub use openai::OpenAIProvider;
pub use registry::{Provider, ProviderKind, ProviderRegistry, ProviderSpec};
