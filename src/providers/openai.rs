//! OpenAI-compatible Chat Completions backend.
//!
//! Serves every family that exposes the `OpenAI` wire shape: `OpenAI` itself,
//! Anthropic, `OpenRouter`, Groq, Zhipu, Gemini and self-hosted vLLM.

use super::registry::{ProviderKind, ProviderSpec};
use super::wire::{ApiMessage, ApiTool, build_api_messages, classify_status, convert_tools, parse_response};
use crate::error::ProviderError;
use crate::llm::{ChatRequest, ChatResponse, LlmProvider};
use async_trait::async_trait;
use serde::Serialize;

/// Bearer-authenticated Chat Completions client for one backend family.
#[derive(Clone)]
pub struct OpenAIProvider {
    client: reqwest::Client,
    kind: ProviderKind,
    api_key: String,
    base_url: String,
}

impl OpenAIProvider {
    /// Create a provider for `kind` with its default base URL.
    #[must_use]
    pub fn new(kind: ProviderKind, api_key: impl Into<String>) -> Self {
        Self::with_base_url(kind, api_key, kind.default_base_url().unwrap_or_default())
    }

    /// Create a provider against a custom base URL.
    #[must_use]
    pub fn with_base_url(
        kind: ProviderKind,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            kind,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn from_spec(spec: &ProviderSpec) -> Self {
        match spec.api_base.as_deref().filter(|b| !b.is_empty()) {
            Some(base) => Self::with_base_url(spec.kind, &spec.api_key, base),
            None => Self::new(spec.kind, &spec.api_key),
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub const fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Model id as this backend expects it.
    ///
    /// `OpenRouter` routes on the full `vendor/model` id; direct backends get
    /// the id with their own prefix removed.
    #[must_use]
    pub fn wire_model<'a>(&self, model: &'a str) -> &'a str {
        let Some((prefix, rest)) = model.split_once('/') else {
            return model;
        };
        if self.kind.prefixes().contains(&prefix) {
            rest
        } else {
            model
        }
    }
}

#[derive(Serialize)]
struct ApiChatRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ApiTool]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        if self.base_url.is_empty() {
            return Err(ProviderError::Fatal(format!(
                "{} has no base URL configured",
                self.kind
            )));
        }

        let model = self.wire_model(&request.model);
        let messages = build_api_messages(&request);
        let tools = convert_tools(request.tools.as_deref());

        let api_request = ApiChatRequest {
            model,
            messages: &messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: tools.as_deref(),
            tool_choice: tools.as_ref().map(|_| "auto"),
        };

        tracing::debug!(
            provider = %self.kind,
            model,
            max_tokens = request.max_tokens,
            "LLM request"
        );

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .json(&api_request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&e))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_transport(&e))?;

        tracing::debug!(
            provider = %self.kind,
            status = %status,
            body_len = bytes.len(),
            "LLM response"
        );

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes);
            let error = classify_status(self.kind.name(), status, &body);
            tracing::warn!(provider = %self.kind, status = %status, class = error.kind(), "LLM request failed");
            return Err(error);
        }

        parse_response(self.kind.name(), &bytes)
    }

    fn provider(&self) -> &str {
        self.kind.name()
    }
}
