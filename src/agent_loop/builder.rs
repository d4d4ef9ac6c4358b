use crate::events::AgentEventEnvelope;
use crate::llm::LlmProvider;
use crate::providers::ProviderRegistry;
use crate::sandbox::SandboxConfig;
use crate::tools::{ToolExecutor, ToolRegistry};
use crate::types::AgentConfig;
use anyhow::{Context, Result, bail};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::AgentLoop;

/// Builder for constructing an `AgentLoop`.
///
/// Providers are either set directly or resolved from a
/// [`ProviderRegistry`] for the configured primary and backup models.
///
/// # Example
///
/// ```ignore
/// let agent = AgentLoop::builder()
///     .config(config.agent_config())
///     .provider_registry(config.provider_registry())
///     .tools(tools)
///     .build()?;
/// ```
#[derive(Default)]
pub struct AgentLoopBuilder {
    config: Option<AgentConfig>,
    primary: Option<Arc<dyn LlmProvider>>,
    backup: Option<Arc<dyn LlmProvider>>,
    registry: Option<ProviderRegistry>,
    tools: Option<ToolRegistry>,
    sandbox: Option<SandboxConfig>,
    events: Option<mpsc::Sender<AgentEventEnvelope>>,
}

impl AgentLoopBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Provider for the primary model.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.primary = Some(provider);
        self
    }

    /// Provider for the backup model. Requires `backup_model` in the config.
    #[must_use]
    pub fn backup_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.backup = Some(provider);
        self
    }

    /// Resolve providers not set explicitly from this registry.
    #[must_use]
    pub fn provider_registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Sandbox for tool calls. Defaults to the config's workspace, unrestricted.
    #[must_use]
    pub fn sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// Stream turn events to `tx`.
    #[must_use]
    pub fn events(mut self, tx: mpsc::Sender<AgentEventEnvelope>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Build the agent loop.
    ///
    /// # Errors
    ///
    /// Returns an error if no provider can be found for the primary model, or
    /// if a backup model and backup provider are not configured together.
    pub fn build(self) -> Result<AgentLoop> {
        let config = self.config.unwrap_or_default();

        let primary: Arc<dyn LlmProvider> = match (self.primary, &self.registry) {
            (Some(provider), _) => provider,
            (None, Some(registry)) => Arc::new(
                registry
                    .build(&config.model)
                    .with_context(|| format!("no provider for model '{}'", config.model))?,
            ),
            (None, None) => bail!("agent loop needs a provider or a provider registry"),
        };

        let backup: Option<Arc<dyn LlmProvider>> =
            match (&config.backup_model, self.backup, &self.registry) {
                (None, None, _) => None,
                (None, Some(_), _) => bail!("backup provider set without a backup model"),
                (Some(_), Some(provider), _) => Some(provider),
                (Some(model), None, Some(registry)) => Some(Arc::new(
                    registry
                        .build(model)
                        .with_context(|| format!("no provider for backup model '{model}'"))?,
                )),
                (Some(model), None, None) => {
                    bail!("backup model '{model}' has no provider")
                }
            };

        let sandbox = self
            .sandbox
            .unwrap_or_else(|| SandboxConfig::new(config.workspace.clone()));

        Ok(AgentLoop {
            primary,
            backup,
            executor: ToolExecutor::new(self.tools.unwrap_or_default()),
            sandbox: Arc::new(sandbox),
            config: Arc::new(config),
            events: self.events,
        })
    }
}
