use super::{AzureProvider, OpenAIProvider};
use crate::error::ProviderError;
use crate::llm::{ChatRequest, ChatResponse, LlmProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Backend families the gateway can talk to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Anthropic,
    OpenRouter,
    Groq,
    Zhipu,
    Gemini,
    Vllm,
    Azure,
}

impl ProviderKind {
    pub const ALL: [Self; 8] = [
        Self::OpenAI,
        Self::Anthropic,
        Self::OpenRouter,
        Self::Groq,
        Self::Zhipu,
        Self::Gemini,
        Self::Vllm,
        Self::Azure,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::OpenRouter => "openrouter",
            Self::Groq => "groq",
            Self::Zhipu => "zhipu",
            Self::Gemini => "gemini",
            Self::Vllm => "vllm",
            Self::Azure => "azure",
        }
    }

    /// Model-id prefixes that name this backend explicitly.
    #[must_use]
    pub const fn prefixes(self) -> &'static [&'static str] {
        match self {
            Self::OpenAI => &["openai"],
            Self::Anthropic => &["anthropic"],
            Self::OpenRouter => &["openrouter"],
            Self::Groq => &["groq"],
            Self::Zhipu => &["zhipu", "zai"],
            Self::Gemini => &["gemini"],
            Self::Vllm => &["vllm", "hosted_vllm"],
            Self::Azure => &["azure"],
        }
    }

    /// Base URL used when the config does not set `apiBase`.
    #[must_use]
    pub const fn default_base_url(self) -> Option<&'static str> {
        match self {
            Self::OpenAI => Some("https://api.openai.com/v1"),
            Self::Anthropic => Some("https://api.anthropic.com/v1"),
            Self::OpenRouter => Some("https://openrouter.ai/api/v1"),
            Self::Groq => Some("https://api.groq.com/openai/v1"),
            Self::Zhipu => Some("https://open.bigmodel.cn/api/paas/v4"),
            Self::Gemini => Some("https://generativelanguage.googleapis.com/v1beta/openai"),
            Self::Vllm | Self::Azure => None,
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.prefixes().contains(&prefix))
    }

    /// Guess the backend from well-known model family names.
    fn from_keyword(model: &str) -> Option<Self> {
        let name = model.rsplit('/').next().unwrap_or(model).to_lowercase();
        if name.contains("claude") {
            Some(Self::Anthropic)
        } else if name.contains("gpt") || name.starts_with("o1") {
            Some(Self::OpenAI)
        } else if name.contains("gemini") {
            Some(Self::Gemini)
        } else if name.contains("glm") || name.contains("zhipu") {
            Some(Self::Zhipu)
        } else if name.contains("groq") || name.contains("llama") {
            Some(Self::Groq)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Settings for one backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderSpec {
    pub kind: ProviderKind,
    pub enabled: bool,
    pub api_key: String,
    pub api_base: Option<String>,
    /// Azure only.
    pub api_version: Option<String>,
    /// Azure only: deployment used when the model id names none.
    pub deployment: Option<String>,
}

impl ProviderSpec {
    #[must_use]
    pub fn new(kind: ProviderKind, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        Self {
            kind,
            enabled: !api_key.is_empty(),
            api_key,
            api_base: None,
            api_version: None,
            deployment: None,
        }
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self.enabled = true;
        self
    }

    #[must_use]
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    #[must_use]
    pub fn with_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.deployment = Some(deployment.into());
        self
    }

    /// Whether requests can be routed here.
    ///
    /// vLLM needs a base URL, Azure only needs to be enabled (an incomplete
    /// Azure setup fails at call time), every other backend needs a key.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        if !self.enabled {
            return false;
        }
        match self.kind {
            ProviderKind::Vllm => self.api_base.as_deref().is_some_and(|b| !b.is_empty()),
            ProviderKind::Azure => true,
            _ => !self.api_key.is_empty(),
        }
    }
}

/// Provider settings by backend, with model-id resolution.
#[derive(Clone, Debug, Default)]
pub struct ProviderRegistry {
    specs: BTreeMap<ProviderKind, ProviderSpec>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the settings for `spec.kind`.
    pub fn insert(&mut self, spec: ProviderSpec) -> &mut Self {
        self.specs.insert(spec.kind, spec);
        self
    }

    #[must_use]
    pub fn get(&self, kind: ProviderKind) -> Option<&ProviderSpec> {
        self.specs.get(&kind)
    }

    fn usable(&self, kind: ProviderKind) -> bool {
        self.get(kind).is_some_and(ProviderSpec::is_usable)
    }

    /// Pick the backend for `model`.
    ///
    /// `azure/` ids always go to Azure. An explicit `vendor/` prefix wins when
    /// that vendor is usable, then family keywords, then `OpenRouter`, then vLLM.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Fatal`] when no usable backend matches.
    pub fn resolve(&self, model: &str) -> Result<ProviderKind, ProviderError> {
        if model.starts_with("azure/") {
            return if self.usable(ProviderKind::Azure) {
                Ok(ProviderKind::Azure)
            } else {
                Err(ProviderError::Fatal(format!(
                    "model '{model}' needs Azure OpenAI, which is not configured"
                )))
            };
        }

        let explicit = model
            .split_once('/')
            .and_then(|(prefix, _)| ProviderKind::from_prefix(prefix));

        [
            explicit,
            ProviderKind::from_keyword(model),
            Some(ProviderKind::OpenRouter),
            Some(ProviderKind::Vllm),
        ]
        .into_iter()
        .flatten()
        .find(|kind| *kind != ProviderKind::Azure && self.usable(*kind))
        .ok_or_else(|| ProviderError::Fatal(format!("no configured provider for model '{model}'")))
    }

    /// Resolve `model` and build a client for it.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Fatal`] when resolution fails.
    pub fn build(&self, model: &str) -> Result<Provider, ProviderError> {
        let kind = self.resolve(model)?;
        let spec = self
            .get(kind)
            .ok_or_else(|| ProviderError::Fatal(format!("{kind} is not configured")))?;

        tracing::info!(model, provider = %kind, "Resolved model provider");

        Ok(match kind {
            ProviderKind::Azure => Provider::Azure(AzureProvider::from_spec(spec)),
            _ => Provider::OpenAI(OpenAIProvider::from_spec(spec)),
        })
    }
}

/// Every backend the gateway supports.
#[derive(Clone)]
pub enum Provider {
    OpenAI(OpenAIProvider),
    Azure(AzureProvider),
}

#[async_trait]
impl LlmProvider for Provider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        match self {
            Self::OpenAI(p) => p.chat(request).await,
            Self::Azure(p) => p.chat(request).await,
        }
    }

    fn provider(&self) -> &str {
        match self {
            Self::OpenAI(p) => p.provider(),
            Self::Azure(p) => p.provider(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(kinds: &[ProviderKind]) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        for kind in kinds {
            let spec = match kind {
                ProviderKind::Vllm => {
                    ProviderSpec::new(*kind, "").with_api_base("http://localhost:8000/v1")
                }
                _ => ProviderSpec::new(*kind, "key"),
            };
            registry.insert(spec);
        }
        registry
    }

    #[test]
    fn test_azure_prefix_requires_azure() {
        let with = registry(&[ProviderKind::Azure, ProviderKind::OpenRouter]);
        let without = registry(&[ProviderKind::OpenRouter]);

        assert_eq!(with.resolve("azure/gpt-5.1-chat"), Ok(ProviderKind::Azure));
        assert!(matches!(
            without.resolve("azure/gpt-5.1-chat"),
            Err(ProviderError::Fatal(_))
        ));
    }

    #[test]
    fn test_explicit_prefix_wins_when_usable() {
        let reg = registry(&[ProviderKind::Groq, ProviderKind::OpenRouter]);

        assert_eq!(reg.resolve("groq/llama-3.3-70b"), Ok(ProviderKind::Groq));
        // Anthropic has no key, so the prefix is ignored and OpenRouter takes it
        assert_eq!(
            reg.resolve("anthropic/claude-opus-4-5"),
            Ok(ProviderKind::OpenRouter)
        );
    }

    #[test]
    fn test_keyword_matching() {
        let reg = registry(&[
            ProviderKind::Anthropic,
            ProviderKind::OpenAI,
            ProviderKind::Gemini,
            ProviderKind::Zhipu,
            ProviderKind::Groq,
        ]);

        assert_eq!(reg.resolve("claude-sonnet-4-5"), Ok(ProviderKind::Anthropic));
        assert_eq!(reg.resolve("gpt-4o"), Ok(ProviderKind::OpenAI));
        assert_eq!(reg.resolve("o1-mini"), Ok(ProviderKind::OpenAI));
        assert_eq!(reg.resolve("gemini-2.0-flash"), Ok(ProviderKind::Gemini));
        assert_eq!(reg.resolve("glm-4.7-flash"), Ok(ProviderKind::Zhipu));
        assert_eq!(reg.resolve("llama-3.1-8b"), Ok(ProviderKind::Groq));
    }

    #[test]
    fn test_zai_prefix_maps_to_zhipu() {
        let reg = registry(&[ProviderKind::Zhipu]);
        assert_eq!(reg.resolve("zai/glm-4.7"), Ok(ProviderKind::Zhipu));
    }

    #[test]
    fn test_falls_back_to_vllm() {
        let reg = registry(&[ProviderKind::Vllm]);
        assert_eq!(reg.resolve("my-local-model"), Ok(ProviderKind::Vllm));
    }

    #[test]
    fn test_nothing_usable_fails() {
        let mut reg = ProviderRegistry::new();
        reg.insert(ProviderSpec::new(ProviderKind::OpenAI, ""));

        assert!(matches!(reg.resolve("gpt-4o"), Err(ProviderError::Fatal(_))));
    }

    #[test]
    fn test_disabled_provider_is_inert() {
        let mut spec = ProviderSpec::new(ProviderKind::OpenAI, "key");
        spec.enabled = false;
        assert!(!spec.is_usable());
    }

    #[test]
    fn test_build_picks_backend() -> anyhow::Result<()> {
        let reg = registry(&[ProviderKind::Azure, ProviderKind::OpenAI]);

        assert!(matches!(reg.build("azure/gpt-4o")?, Provider::Azure(_)));
        let provider = reg.build("gpt-4o")?;
        assert_eq!(provider.provider(), "openai");
        Ok(())
    }
}
