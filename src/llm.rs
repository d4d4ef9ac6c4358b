pub mod types;

pub use types::*;

use crate::error::ProviderError;
use async_trait::async_trait;

/// A chat-completion backend.
///
/// Implementations shape the request for their wire format, classify every
/// failure into a [`ProviderError`], and never touch the conversation.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// # Errors
    /// Returns a classified error when the call fails or the response cannot be parsed.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;

    fn provider(&self) -> &str;
}
