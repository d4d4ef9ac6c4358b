use crate::types::{TokenUsage, ToolResult};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model identifier as configured, e.g. `azure/gpt-5.1-chat`
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Option<Vec<Tool>>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

/// One entry in a conversation.
///
/// `ordinal` is assigned by [`Conversation::append`](crate::Conversation::append);
/// constructors leave it at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub ordinal: u64,
    pub role: Role,
    pub content: Content,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Message {
    fn new(role: Role, content: Content) -> Self {
        Self {
            ordinal: 0,
            role,
            content,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, Content::Text(text.into()))
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Content::Text(text.into()))
    }

    /// Assistant message carrying only tool calls. Any text the model sent
    /// alongside them has already been dropped by [`select_response`].
    #[must_use]
    pub fn assistant_with_tool_calls(calls: &[ToolCallRequest]) -> Self {
        let blocks = calls
            .iter()
            .map(|call| ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.input.clone(),
            })
            .collect();
        Self::new(Role::Assistant, Content::Blocks(blocks))
    }

    #[must_use]
    pub fn tool_result(result: &ToolResult) -> Self {
        Self::new(
            Role::Tool,
            Content::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: result.tool_call_id.clone(),
                name: result.name.clone(),
                content: result.output.clone(),
                is_error: if result.success { None } else { Some(true) },
            }]),
        )
    }

    /// Tool-use ids carried by this message.
    pub fn tool_use_ids(&self) -> impl Iterator<Item = &str> {
        self.blocks().iter().filter_map(|b| match b {
            ContentBlock::ToolUse { id, .. } => Some(id.as_str()),
            _ => None,
        })
    }

    /// Tool-result ids carried by this message.
    pub fn tool_result_ids(&self) -> impl Iterator<Item = &str> {
        self.blocks().iter().filter_map(|b| match b {
            ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
            _ => None,
        })
    }

    fn blocks(&self) -> &[ContentBlock] {
        match &self.content {
            Content::Text(_) => &[],
            Content::Blocks(blocks) => blocks,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Content {
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Blocks(blocks) => blocks.iter().find_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        name: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// Tool definition advertised to the model.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub id: String,
    pub content: Vec<ContentBlock>,
    pub model: String,
    pub stop_reason: Option<StopReason>,
    pub usage: TokenUsage,
}

impl ChatResponse {
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &str, &serde_json::Value)> {
        self.content.iter().filter_map(|b| match b {
            ContentBlock::ToolUse { id, name, input } => Some((id.as_str(), name.as_str(), input)),
            _ => None,
        })
    }

    #[must_use]
    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    ContentFilter,
}

/// A tool call as emitted by the model, before it is recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// What the agent loop does with a model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    /// Final answer for the user. `None` when the model sent nothing usable.
    Final(Option<String>),
    /// Tools to run before the next model call.
    ToolCalls(Vec<ToolCallRequest>),
}

/// Decide how a response is recorded.
///
/// Tool calls win: when a response carries both text and tool calls, the text
/// is dropped. Text blocks of a final answer are joined with newlines.
#[must_use]
pub fn select_response(response: &ChatResponse) -> ModelResponse {
    if response.has_tool_use() {
        let calls = response
            .tool_uses()
            .map(|(id, name, input)| ToolCallRequest {
                id: id.to_string(),
                name: name.to_string(),
                input: if input.is_null() {
                    serde_json::json!({})
                } else {
                    input.clone()
                },
            })
            .collect();
        return ModelResponse::ToolCalls(calls);
    }

    let text: Vec<&str> = response
        .content
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } if !text.trim().is_empty() => Some(text.as_str()),
            _ => None,
        })
        .collect();

    if text.is_empty() {
        ModelResponse::Final(None)
    } else {
        ModelResponse::Final(Some(text.join("\n")))
    }
}
