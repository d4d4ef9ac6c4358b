//! Chat Completions wire format shared by every backend.

use crate::error::ProviderError;
use crate::llm::{ChatRequest, ChatResponse, Content, ContentBlock, Role, StopReason, Tool};
use crate::types::TokenUsage;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Longest error body kept in a [`ProviderError`] message.
const MAX_ERROR_BODY: usize = 500;

/// Map an unsuccessful HTTP status to an error class.
///
/// 429, 408 and 5xx are transient, 401 and 403 are auth failures, anything
/// else is fatal.
pub(crate) fn classify_status(provider: &str, status: StatusCode, body: &str) -> ProviderError {
    let body = body.trim();
    let body = match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    };
    let message = format!("{provider} HTTP {}: {body}", status.as_u16());

    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            ProviderError::Transient(message)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth(message),
        s if s.is_server_error() => ProviderError::Transient(message),
        _ => ProviderError::Fatal(message),
    }
}

pub(crate) fn build_api_messages(request: &ChatRequest) -> Vec<ApiMessage> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if !request.system.is_empty() {
        messages.push(ApiMessage::text(ApiRole::System, request.system.clone()));
    }

    for msg in &request.messages {
        let role = match msg.role {
            Role::System => ApiRole::System,
            Role::User => ApiRole::User,
            Role::Assistant => ApiRole::Assistant,
            Role::Tool => ApiRole::Tool,
        };

        match &msg.content {
            Content::Text(text) => messages.push(ApiMessage::text(role, text.clone())),
            Content::Blocks(blocks) => {
                let mut text_parts = Vec::new();
                let mut tool_calls = Vec::new();

                for block in blocks {
                    match block {
                        ContentBlock::Text { text } => text_parts.push(text.clone()),
                        ContentBlock::ToolUse { id, name, input } => {
                            tool_calls.push(ApiToolCall {
                                id: id.clone(),
                                r#type: "function".to_owned(),
                                function: ApiFunctionCall {
                                    name: name.clone(),
                                    arguments: input.to_string(),
                                },
                            });
                        }
                        ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            ..
                        } => {
                            messages.push(ApiMessage {
                                role: ApiRole::Tool,
                                content: Some(content.clone()),
                                tool_calls: None,
                                tool_call_id: Some(tool_use_id.clone()),
                            });
                        }
                    }
                }

                if !text_parts.is_empty() || !tool_calls.is_empty() {
                    messages.push(ApiMessage {
                        role,
                        content: (!text_parts.is_empty()).then(|| text_parts.join("\n")),
                        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                        tool_call_id: None,
                    });
                }
            }
        }
    }

    messages
}

pub(crate) fn convert_tools(tools: Option<&[Tool]>) -> Option<Vec<ApiTool>> {
    let tools = tools.filter(|ts| !ts.is_empty())?;
    Some(
        tools
            .iter()
            .map(|t| ApiTool {
                r#type: "function".to_owned(),
                function: ApiFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect(),
    )
}

/// Parse a successful response body.
///
/// # Errors
///
/// Returns [`ProviderError::Fatal`] when the body is not a chat completion or
/// carries no choices.
pub(crate) fn parse_response(provider: &str, bytes: &[u8]) -> Result<ChatResponse, ProviderError> {
    let api_response: ApiChatResponse = serde_json::from_slice(bytes)
        .map_err(|e| ProviderError::Fatal(format!("{provider}: failed to parse response: {e}")))?;

    let choice = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Fatal(format!("{provider}: no choices in response")))?;

    let content = build_content_blocks(choice.message);

    let stop_reason = choice.finish_reason.as_deref().and_then(|r| match r {
        "stop" => Some(StopReason::EndTurn),
        "tool_calls" | "function_call" => Some(StopReason::ToolUse),
        "length" => Some(StopReason::MaxTokens),
        "content_filter" => Some(StopReason::ContentFilter),
        _ => None,
    });

    let usage = api_response.usage.unwrap_or_default();

    Ok(ChatResponse {
        id: api_response.id,
        content,
        model: api_response.model,
        stop_reason,
        usage: TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        },
    })
}

fn build_content_blocks(message: ApiResponseMessage) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();

    if let Some(text) = message.content.filter(|c| !c.is_empty()) {
        blocks.push(ContentBlock::Text { text });
    }

    for tc in message.tool_calls.unwrap_or_default() {
        blocks.push(ContentBlock::ToolUse {
            id: tc.id,
            name: tc.function.name,
            input: parse_arguments(tc.function.arguments),
        });
    }

    blocks
}

/// Tool-call arguments arrive as a JSON string. Strings that do not parse are
/// kept as `{"raw": "<text>"}` so the tool sees what the model sent.
fn parse_arguments(arguments: Value) -> Value {
    match arguments {
        Value::String(raw) if raw.trim().is_empty() => Value::Object(serde_json::Map::new()),
        Value::String(raw) => {
            serde_json::from_str(&raw).unwrap_or_else(|_| serde_json::json!({ "raw": raw }))
        }
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    }
}

// ============================================================================
// API Request Types
// ============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct ApiMessage {
    role: ApiRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    const fn text(role: ApiRole, text: String) -> Self {
        Self {
            role,
            content: Some(text),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ApiRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Serialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize)]
struct ApiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiTool {
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize)]
struct ApiFunction {
    name: String,
    description: String,
    parameters: Value,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Deserialize)]
struct ApiChatResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiResponseToolCall>>,
}

#[derive(Deserialize)]
struct ApiResponseToolCall {
    #[serde(default)]
    id: String,
    function: ApiResponseFunctionCall,
}

#[derive(Deserialize)]
struct ApiResponseFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Deserialize, Default)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}
