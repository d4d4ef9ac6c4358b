use crate::error::ProviderError;
use crate::llm::{ChatRequest, ChatResponse, ContentBlock, LlmProvider, StopReason};
use crate::tools::{Tool, ToolContext};
use crate::types::{TokenUsage, ToolResult};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

// ===================
// Mock LLM Provider
// ===================

pub struct MockProvider {
    name: &'static str,
    responses: RwLock<VecDeque<Result<ChatResponse, ProviderError>>>,
    requests: RwLock<Vec<ChatRequest>>,
    call_count: AtomicUsize,
}

impl MockProvider {
    pub fn new(responses: Vec<Result<ChatResponse, ProviderError>>) -> Self {
        Self::named("mock", responses)
    }

    pub fn named(name: &'static str, responses: Vec<Result<ChatResponse, ProviderError>>) -> Self {
        Self {
            name,
            responses: RwLock::new(responses.into()),
            requests: RwLock::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.read().expect("lock poisoned").clone()
    }

    fn response(content: Vec<ContentBlock>, stop_reason: StopReason) -> ChatResponse {
        ChatResponse {
            id: "msg_1".to_string(),
            content,
            model: "mock-model".to_string(),
            stop_reason: Some(stop_reason),
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 20,
            },
        }
    }

    pub fn text_response(text: &str) -> Result<ChatResponse, ProviderError> {
        Ok(Self::response(
            vec![ContentBlock::Text {
                text: text.to_string(),
            }],
            StopReason::EndTurn,
        ))
    }

    pub fn empty_response() -> Result<ChatResponse, ProviderError> {
        Ok(Self::response(Vec::new(), StopReason::EndTurn))
    }

    pub fn tool_use_response(
        tool_id: &str,
        tool_name: &str,
        input: serde_json::Value,
    ) -> Result<ChatResponse, ProviderError> {
        Self::tool_uses_response(vec![(tool_id, tool_name, input)])
    }

    pub fn tool_uses_response(
        tool_uses: Vec<(&str, &str, serde_json::Value)>,
    ) -> Result<ChatResponse, ProviderError> {
        let content = tool_uses
            .into_iter()
            .map(|(id, name, input)| ContentBlock::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input,
            })
            .collect();
        Ok(Self::response(content, StopReason::ToolUse))
    }

    /// Text and a tool call in the same response.
    pub fn mixed_response(text: &str, tool_id: &str, tool_name: &str) -> Result<ChatResponse, ProviderError> {
        Ok(Self::response(
            vec![
                ContentBlock::Text {
                    text: text.to_string(),
                },
                ContentBlock::ToolUse {
                    id: tool_id.to_string(),
                    name: tool_name.to_string(),
                    input: json!({"message": "mixed"}),
                },
            ],
            StopReason::ToolUse,
        ))
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.write().expect("lock poisoned").push(request);
        self.responses
            .write()
            .expect("lock poisoned")
            .pop_front()
            // Default: end conversation
            .unwrap_or_else(|| Self::text_response("Done"))
    }

    fn provider(&self) -> &str {
        self.name
    }
}

/// Provider whose calls never complete.
pub struct HangingProvider;

#[async_trait]
impl LlmProvider for HangingProvider {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        std::future::pending().await
    }

    fn provider(&self) -> &str {
        "hanging"
    }
}

// ===================
// Mock Tools
// ===================

pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn description(&self) -> &'static str {
        "Echo the message back"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "message": { "type": "string" }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, _ctx: &ToolContext, input: serde_json::Value) -> Result<ToolResult> {
        let message = input
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("no message");
        Ok(ToolResult::success(format!("Echo: {message}")))
    }
}

/// Sleeps until cancelled.
pub struct BlockingTool;

#[async_trait]
impl Tool for BlockingTool {
    fn name(&self) -> &'static str {
        "block"
    }

    fn description(&self) -> &'static str {
        "Wait forever"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object"})
    }

    async fn execute(&self, ctx: &ToolContext, _input: serde_json::Value) -> Result<ToolResult> {
        ctx.cancel.cancelled().await;
        Ok(ToolResult::success("unblocked"))
    }
}
