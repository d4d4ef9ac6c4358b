//! Custom tool example.
//!
//! Registers a calculator next to the built-in workspace tools and prints the
//! turn's events as they stream in.
//!
//! # Running
//!
//! ```bash
//! OPENAI_API_KEY=your_key cargo run --example custom_tool
//! ```

use anyhow::Result;
use async_trait::async_trait;
use nanogate::providers::{OpenAIProvider, ProviderKind};
use nanogate::{
    AgentConfig, AgentEvent, AgentLoop, Conversation, ConversationKey, Tool, ToolContext,
    ToolRegistry, ToolResult, primitive_tools,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Adds two numbers.
struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &'static str {
        "calculator"
    }

    fn description(&self) -> &'static str {
        "Add two numbers together. Use this when you need to perform addition."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "a": { "type": "number", "description": "First number to add" },
                "b": { "type": "number", "description": "Second number to add" }
            },
            "required": ["a", "b"]
        })
    }

    async fn execute(&self, _ctx: &ToolContext, input: Value) -> Result<ToolResult> {
        let (Some(a), Some(b)) = (
            input.get("a").and_then(Value::as_f64),
            input.get("b").and_then(Value::as_f64),
        ) else {
            return Ok(ToolResult::error("Both 'a' and 'b' must be numbers"));
        };

        Ok(ToolResult::success(format!("{a} + {b} = {}", a + b)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let api_key = std::env::var("OPENAI_API_KEY")
        .expect("OPENAI_API_KEY environment variable must be set");

    let mut tools = ToolRegistry::new();
    primitive_tools::register_all(&mut tools);
    tools.register(CalculatorTool);

    println!("Registered tools: {}", tools.names().join(", "));

    let (tx, mut rx) = mpsc::channel(64);
    let agent = AgentLoop::builder()
        .config(AgentConfig {
            model: "gpt-4o-mini".to_string(),
            workspace: std::env::current_dir()?,
            ..AgentConfig::default()
        })
        .provider(Arc::new(OpenAIProvider::new(ProviderKind::OpenAI, api_key)))
        .tools(tools)
        .events(tx)
        .build()?;

    let printer = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            match envelope.event {
                AgentEvent::ToolCallStart { name, input, .. } => {
                    println!("[tool] {name} {input}");
                }
                AgentEvent::ToolCallEnd { name, result, .. } => {
                    println!("[tool] {name} -> {}", result.output);
                }
                AgentEvent::Done { rounds, usage, .. } => {
                    println!("(done in {rounds} rounds, {} tokens)", usage.total());
                }
                _ => {}
            }
        }
    });

    let mut conversation = Conversation::new(ConversationKey::new("demo", "calculator"));
    let outcome = agent
        .run_turn(
            &mut conversation,
            "What is 42 + 17? Then list the files in the workspace.",
            &CancellationToken::new(),
        )
        .await;

    match outcome.error() {
        Some(error) => eprintln!("Error: {error}"),
        None => println!("\nAgent: {}", outcome.reply().unwrap_or_default()),
    }

    drop(agent);
    printer.await?;
    Ok(())
}
