//! Azure `OpenAI` deployments.
//!
//! Requests go straight to the deployment endpoint with an `api-key` header.
//! Newer deployments reject `max_tokens` and some reject `temperature`, so a
//! 400 naming either parameter is retried once with the request adjusted.

use super::registry::ProviderSpec;
use super::wire::{ApiMessage, ApiTool, build_api_messages, classify_status, convert_tools, parse_response};
use crate::error::ProviderError;
use crate::llm::{ChatRequest, ChatResponse, LlmProvider};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct AzureProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    api_version: String,
    default_deployment: Option<String>,
}

impl AzureProvider {
    #[must_use]
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_version: api_version.into(),
            default_deployment: None,
        }
    }

    #[must_use]
    pub fn from_spec(spec: &ProviderSpec) -> Self {
        let mut provider = Self::new(
            &spec.api_key,
            spec.api_base.as_deref().unwrap_or_default(),
            spec.api_version.as_deref().unwrap_or_default(),
        );
        provider.default_deployment = spec.deployment.clone().filter(|d| !d.is_empty());
        provider
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn deployment<'a>(&'a self, model: &'a str) -> Option<&'a str> {
        let name = model.strip_prefix("azure/").unwrap_or(model);
        if name.is_empty() {
            self.default_deployment.as_deref()
        } else {
            Some(name)
        }
    }

    fn url(&self, deployment: &str) -> String {
        format!(
            "{}/openai/deployments/{deployment}/chat/completions?api-version={}",
            self.endpoint, self.api_version
        )
    }

    async fn post(&self, url: &str, body: &ApiChatRequest<'_>) -> Result<(StatusCode, Vec<u8>), ProviderError> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&e))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_transport(&e))?;

        tracing::debug!(status = %status, body_len = bytes.len(), "Azure OpenAI response");

        Ok((status, bytes.to_vec()))
    }
}

#[derive(Serialize)]
struct ApiChatRequest<'a> {
    messages: &'a [ApiMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ApiTool]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

impl ApiChatRequest<'_> {
    fn swap_token_parameter(&mut self) {
        if self.max_completion_tokens.is_some() {
            self.max_tokens = self.max_completion_tokens.take();
        } else {
            self.max_completion_tokens = self.max_tokens.take();
        }
    }
}

#[derive(Deserialize, Default)]
struct ApiErrorBody {
    #[serde(default)]
    error: ApiErrorDetail,
}

#[derive(Deserialize, Default)]
struct ApiErrorDetail {
    #[serde(default)]
    param: Option<String>,
    #[serde(default)]
    message: String,
}

/// Which parameters a 400 response complains about.
struct Rejected {
    token_parameter: bool,
    temperature: bool,
}

impl Rejected {
    fn from_body(bytes: &[u8]) -> Self {
        let detail = serde_json::from_slice::<ApiErrorBody>(bytes)
            .unwrap_or_default()
            .error;
        let param = detail.param.as_deref();
        let message = detail.message.as_str();

        Self {
            token_parameter: matches!(param, Some("max_tokens" | "max_completion_tokens"))
                || message.contains("max_tokens")
                || message.contains("max_completion_tokens"),
            temperature: param == Some("temperature") || message.contains("temperature"),
        }
    }
}

#[async_trait]
impl LlmProvider for AzureProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        if self.endpoint.is_empty() || self.api_key.is_empty() {
            return Err(ProviderError::Fatal(
                "missing Azure OpenAI endpoint or key".to_string(),
            ));
        }
        if self.api_version.is_empty() {
            return Err(ProviderError::Fatal(
                "missing Azure OpenAI API version".to_string(),
            ));
        }
        let deployment = self
            .deployment(&request.model)
            .ok_or_else(|| ProviderError::Fatal("missing Azure OpenAI deployment".to_string()))?;

        let url = self.url(deployment);
        let messages = build_api_messages(&request);
        let tools = convert_tools(request.tools.as_deref());

        let mut body = ApiChatRequest {
            messages: &messages,
            temperature: request.temperature,
            max_completion_tokens: Some(request.max_tokens),
            max_tokens: None,
            tools: tools.as_deref(),
            tool_choice: tools.as_ref().map(|_| "auto"),
        };

        tracing::debug!(deployment, max_tokens = request.max_tokens, "Azure OpenAI request");

        let (mut status, mut bytes) = self.post(&url, &body).await?;

        if status == StatusCode::BAD_REQUEST {
            let rejected = Rejected::from_body(&bytes);

            if rejected.token_parameter {
                tracing::info!(deployment, "Retrying with the other token limit parameter");
                body.swap_token_parameter();
                (status, bytes) = self.post(&url, &body).await?;
            }
            if status == StatusCode::BAD_REQUEST && rejected.temperature && body.temperature.is_some() {
                tracing::info!(deployment, "Retrying without temperature");
                body.temperature = None;
                (status, bytes) = self.post(&url, &body).await?;
            }
        }

        if !status.is_success() {
            let error = classify_status("azure", status, &String::from_utf8_lossy(&bytes));
            tracing::warn!(deployment, status = %status, class = error.kind(), "Azure OpenAI request failed");
            return Err(error);
        }

        parse_response("azure", &bytes)
    }

    fn provider(&self) -> &str {
        "azure"
    }
}
