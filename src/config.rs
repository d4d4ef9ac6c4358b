//! Configuration file loading.
//!
//! The gateway reads one JSON file, `~/.nanobot/config.json` by default, with
//! camelCase keys. Every key is optional:
//!
//! ```json
//! {
//!   "agents": { "defaults": { "model": "openrouter/anthropic/claude-opus-4-5", "maxToolIterations": 20 } },
//!   "providers": { "openrouter": { "apiKey": "sk-or-..." } },
//!   "channels": { "telegram": { "enabled": true, "token": "...", "allowFrom": ["alice"] } },
//!   "tools": { "exec": { "timeout": 60, "restrictToWorkspace": true } }
//! }
//! ```
//!
//! Azure OpenAI settings may also come from the environment; see
//! [`Config::azure_openai`].

use crate::channels::{ChannelAdapter, TelegramAdapter, WebAdapter, WhatsAppAdapter};
use crate::primitive_tools;
use crate::providers::{ProviderKind, ProviderRegistry, ProviderSpec};
use crate::sandbox::SandboxConfig;
use crate::tools::ToolRegistry;
use crate::types::AgentConfig;
use crate::web::{BraveSearchProvider, WebSearchTool};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Root of the configuration file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub agents: AgentsConfig,
    pub channels: ChannelsConfig,
    pub providers: ProvidersConfig,
    pub gateway: GatewayConfig,
    pub tools: ToolsConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentsConfig {
    pub defaults: AgentDefaults,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentDefaults {
    /// `~` expands to the home directory
    pub workspace: String,
    pub model: String,
    pub backup_model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_tool_iterations: u32,
    pub system_prompt: Option<String>,
    /// Seconds
    pub turn_timeout: u64,
    pub max_turn_tokens: Option<u64>,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: "~/.nanobot/workspace".to_string(),
            model: "anthropic/claude-opus-4-5".to_string(),
            backup_model: None,
            max_tokens: 8192,
            temperature: 0.7,
            max_tool_iterations: 20,
            system_prompt: None,
            turn_timeout: 600,
            max_turn_tokens: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelsConfig {
    pub whatsapp: WhatsAppConfig,
    pub telegram: TelegramConfig,
    pub web: WebConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WhatsAppConfig {
    pub enabled: bool,
    pub bridge_url: String,
    /// Phone numbers
    pub allow_from: Vec<String>,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bridge_url: "ws://localhost:3001".to_string(),
            allow_from: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TelegramConfig {
    pub enabled: bool,
    /// Bot token from `@BotFather`
    pub token: String,
    /// User ids or usernames
    pub allow_from: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Client ids
    pub allow_from: Vec<String>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 18790,
            allow_from: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderConfig {
    pub api_key: String,
    pub api_base: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AzureOpenAIConfig {
    pub enabled: bool,
    pub api_key: String,
    pub endpoint: String,
    pub api_version: String,
    pub deployment_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProvidersConfig {
    pub anthropic: ProviderConfig,
    pub openai: ProviderConfig,
    pub openrouter: ProviderConfig,
    pub groq: ProviderConfig,
    pub zhipu: ProviderConfig,
    pub vllm: ProviderConfig,
    pub gemini: ProviderConfig,
    pub azure_openai: AzureOpenAIConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 18790,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToolsConfig {
    pub web: WebToolsConfig,
    pub exec: ExecToolConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebToolsConfig {
    pub search: WebSearchConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebSearchConfig {
    /// Brave Search API key; web search is off when empty
    pub api_key: String,
    pub max_results: usize,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            max_results: 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecToolConfig {
    /// Seconds
    pub timeout: u64,
    /// Block paths and commands outside the workspace
    pub restrict_to_workspace: bool,
    /// Extra command regexes refused on top of the built-in guard
    pub deny_patterns: Vec<String>,
}

impl Default for ExecToolConfig {
    fn default() -> Self {
        Self {
            timeout: 60,
            restrict_to_workspace: false,
            deny_patterns: Vec::new(),
        }
    }
}

impl Config {
    /// `~/.nanobot/config.json`, if the home directory is known.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".nanobot").join("config.json"))
    }

    /// Load from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid config JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Load the default config file, falling back to defaults when it does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be loaded.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            Some(path) => {
                log::info!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not valid config JSON.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("failed to parse config JSON")
    }

    /// Workspace path with `~` expanded.
    #[must_use]
    pub fn workspace_path(&self) -> PathBuf {
        expand_home(&self.agents.defaults.workspace)
    }

    #[must_use]
    pub fn agent_config(&self) -> AgentConfig {
        let defaults = &self.agents.defaults;
        AgentConfig {
            workspace: self.workspace_path(),
            model: defaults.model.clone(),
            backup_model: defaults.backup_model.clone().filter(|m| !m.is_empty()),
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            max_tool_iterations: defaults.max_tool_iterations,
            system_prompt: defaults.system_prompt.clone(),
            turn_timeout: Duration::from_secs(defaults.turn_timeout),
            max_turn_tokens: defaults.max_turn_tokens,
        }
    }

    /// Sandbox for the workspace tools.
    ///
    /// # Errors
    /// Returns an error if an entry of `tools.exec.denyPatterns` is not a
    /// valid regex.
    pub fn sandbox_config(&self) -> Result<SandboxConfig> {
        let exec = &self.tools.exec;
        let mut sandbox = SandboxConfig::new(self.workspace_path())
            .with_timeout(Duration::from_secs(exec.timeout))
            .with_restrict_to_workspace(exec.restrict_to_workspace);
        for pattern in &exec.deny_patterns {
            sandbox = sandbox
                .deny_command(pattern)
                .context("Invalid tools.exec.denyPatterns entry")?;
        }
        Ok(sandbox)
    }

    /// Azure OpenAI settings with environment overrides applied, or `None`
    /// when Azure is neither enabled in the file nor set in the environment.
    ///
    /// Recognized variables, first non-empty wins:
    ///
    /// - key: `AZURE_OPENAI_KEY`, `AZURE_OPENAI_API_KEY`, `AZURE_API_KEY`
    /// - endpoint: `AZURE_OPENAI_ENDPOINT`, `AZURE_API_BASE`
    /// - version: `AZURE_OPENAI_API_VERSION`, `AZURE_API_VERSION`
    /// - deployment: `AZURE_OPENAI_DEPLOYMENT_NAME`
    #[must_use]
    pub fn azure_openai(&self) -> Option<AzureOpenAIConfig> {
        self.azure_openai_with(|name| std::env::var(name).ok())
    }

    /// [`azure_openai`](Self::azure_openai) with a custom variable lookup.
    #[must_use]
    pub fn azure_openai_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Option<AzureOpenAIConfig> {
        let first = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| lookup(name).filter(|v| !v.is_empty()))
        };
        let api_key = first(&["AZURE_OPENAI_KEY", "AZURE_OPENAI_API_KEY", "AZURE_API_KEY"]);
        let endpoint = first(&["AZURE_OPENAI_ENDPOINT", "AZURE_API_BASE"]);
        let api_version = first(&["AZURE_OPENAI_API_VERSION", "AZURE_API_VERSION"]);
        let deployment = first(&["AZURE_OPENAI_DEPLOYMENT_NAME"]);

        let file = &self.providers.azure_openai;
        let env_set =
            api_key.is_some() || endpoint.is_some() || api_version.is_some() || deployment.is_some();
        if !file.enabled && !env_set {
            return None;
        }

        Some(AzureOpenAIConfig {
            enabled: true,
            api_key: api_key.unwrap_or_else(|| file.api_key.clone()),
            endpoint: endpoint.unwrap_or_else(|| file.endpoint.clone()),
            api_version: api_version.unwrap_or_else(|| file.api_version.clone()),
            deployment_name: deployment.unwrap_or_else(|| file.deployment_name.clone()),
        })
    }

    /// Registry of every configured backend, Azure environment overrides
    /// included.
    #[must_use]
    pub fn provider_registry(&self) -> ProviderRegistry {
        self.provider_registry_with(|name| std::env::var(name).ok())
    }

    /// [`provider_registry`](Self::provider_registry) with a custom variable
    /// lookup.
    #[must_use]
    pub fn provider_registry_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ProviderRegistry {
        let p = &self.providers;
        let mut registry = ProviderRegistry::new();
        for (kind, cfg) in [
            (ProviderKind::Anthropic, &p.anthropic),
            (ProviderKind::OpenAI, &p.openai),
            (ProviderKind::OpenRouter, &p.openrouter),
            (ProviderKind::Groq, &p.groq),
            (ProviderKind::Zhipu, &p.zhipu),
            (ProviderKind::Vllm, &p.vllm),
            (ProviderKind::Gemini, &p.gemini),
        ] {
            let mut spec = ProviderSpec::new(kind, cfg.api_key.clone());
            if let Some(base) = cfg.api_base.as_deref().filter(|b| !b.is_empty()) {
                // A base URL alone only enables servers that need no key
                let enabled = spec.enabled || kind == ProviderKind::Vllm;
                spec = spec.with_api_base(base);
                spec.enabled = enabled;
            }
            registry.insert(spec);
        }

        if let Some(azure) = self.azure_openai_with(lookup) {
            let mut spec = ProviderSpec::new(ProviderKind::Azure, azure.api_key)
                .with_api_base(azure.endpoint)
                .with_api_version(azure.api_version)
                .with_deployment(azure.deployment_name);
            spec.enabled = azure.enabled;
            registry.insert(spec);
        }

        registry
    }

    /// Primitive tools, plus web search when a search API key is set.
    #[must_use]
    pub fn tool_registry(&self) -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        primitive_tools::register_all(&mut tools);
        let search = &self.tools.web.search;
        if !search.api_key.is_empty() {
            tools.register(
                WebSearchTool::new(BraveSearchProvider::new(search.api_key.clone()))
                    .with_max_results(search.max_results),
            );
        }
        tools
    }

    /// Adapters for every enabled channel.
    #[must_use]
    pub fn channel_adapters(&self) -> Vec<Arc<dyn ChannelAdapter>> {
        let c = &self.channels;
        let mut adapters: Vec<Arc<dyn ChannelAdapter>> = Vec::new();
        if c.web.enabled {
            adapters.push(Arc::new(WebAdapter::new(c.web.allow_from.clone())));
        }
        if c.telegram.enabled {
            adapters.push(Arc::new(TelegramAdapter::new(c.telegram.allow_from.clone())));
        }
        if c.whatsapp.enabled {
            adapters.push(Arc::new(WhatsAppAdapter::new(
                c.whatsapp.bridge_url.clone(),
                c.whatsapp.allow_from.clone(),
            )));
        }
        adapters
    }
}

fn expand_home(path: &str) -> PathBuf {
    let rest = match path {
        "~" => Some(""),
        _ => path.strip_prefix("~/"),
    };
    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
