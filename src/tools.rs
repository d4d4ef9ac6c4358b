//! Tool definition, registry and execution.
//!
//! - [`Tool`] trait - One capability the model can call
//! - [`ToolRegistry`] - Name to implementation lookup
//! - [`ToolContext`] - Sandbox and cancellation handed to each call
//! - [`ToolExecutor`] - Runs a [`ToolCall`](crate::ToolCall) under the sandbox limits
//!
//! # Implementing a Tool
//!
//! ```ignore
//! use nanogate::{Tool, ToolContext, ToolResult};
//!
//! struct Clock;
//!
//! #[async_trait]
//! impl Tool for Clock {
//!     fn name(&self) -> &'static str { "clock" }
//!     fn description(&self) -> &'static str { "Current UTC time" }
//!     fn input_schema(&self) -> Value { json!({ "type": "object" }) }
//!
//!     async fn execute(&self, _ctx: &ToolContext, _input: Value) -> Result<ToolResult> {
//!         Ok(ToolResult::success(OffsetDateTime::now_utc().to_string()))
//!     }
//! }
//! ```

mod executor;

pub use executor::ToolExecutor;

use crate::error::SandboxError;
use crate::llm;
use crate::sandbox::SandboxConfig;
use crate::types::ToolResult;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context passed to every tool call.
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub sandbox: Arc<SandboxConfig>,
    /// Cancelled when the turn is cancelled; long-running tools should observe it
    pub cancel: CancellationToken,
}

impl ToolContext {
    #[must_use]
    pub fn new(sandbox: Arc<SandboxConfig>) -> Self {
        Self {
            sandbox,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Definition of a tool that can be called by the model.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to call this tool.
    fn name(&self) -> &'static str;

    /// Human-readable description of what the tool does.
    fn description(&self) -> &'static str;

    /// JSON schema for the tool's input parameters.
    fn input_schema(&self) -> Value;

    /// Validate the call against the sandbox before anything runs.
    ///
    /// Filesystem and command tools check the paths they would touch here, so
    /// a violation is reported without spawning a process or opening a file.
    ///
    /// # Errors
    /// Returns the reason the call is not allowed.
    fn check(&self, _input: &Value, _sandbox: &SandboxConfig) -> Result<(), SandboxError> {
        Ok(())
    }

    /// Execute the tool with the given input.
    ///
    /// Expected failures (missing file, no match) are returned as
    /// [`ToolResult::error`]; `Err` is reserved for unexpected ones.
    ///
    /// # Errors
    /// Returns an error if tool execution fails.
    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<ToolResult>;
}

/// Registry of available tools, resolved by name at dispatch time.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register<T>(&mut self, tool: T) -> &mut Self
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Registered tool names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Remove tools for which the predicate returns false.
    ///
    /// ```ignore
    /// registry.filter(|name| name != "exec");
    /// ```
    pub fn filter<F>(&mut self, predicate: F)
    where
        F: Fn(&str) -> bool,
    {
        self.tools.retain(|name, _| predicate(name));
    }

    /// Tool definitions for the model, sorted by name so requests are stable.
    #[must_use]
    pub fn to_llm_tools(&self) -> Vec<llm::Tool> {
        let mut tools: Vec<_> = self
            .tools
            .values()
            .map(|tool| llm::Tool {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct MockTool;

    #[async_trait]
    impl Tool for MockTool {
        fn name(&self) -> &'static str {
            "mock_tool"
        }

        fn description(&self) -> &'static str {
            "A mock tool for testing"
        }

        fn input_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string" }
                }
            })
        }

        async fn execute(&self, _ctx: &ToolContext, input: Value) -> Result<ToolResult> {
            let message = input
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("no message");
            Ok(ToolResult::success(format!("Received: {message}")))
        }
    }

    struct AnotherTool;

    #[async_trait]
    impl Tool for AnotherTool {
        fn name(&self) -> &'static str {
            "another_tool"
        }

        fn description(&self) -> &'static str {
            "Another tool"
        }

        fn input_schema(&self) -> Value {
            json!({ "type": "object" })
        }

        async fn execute(&self, _ctx: &ToolContext, _input: Value) -> Result<ToolResult> {
            Ok(ToolResult::success("ok"))
        }
    }

    #[test]
    fn test_registry_register_and_get() {
        let mut registry = ToolRegistry::new();
        registry.register(MockTool);

        assert_eq!(registry.len(), 1);
        assert!(registry.get("mock_tool").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_to_llm_tools_is_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(MockTool).register(AnotherTool);

        let names: Vec<_> = registry
            .to_llm_tools()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["another_tool", "mock_tool"]);
    }

    #[test]
    fn test_filter_removes_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(MockTool).register(AnotherTool);
        registry.filter(|name| name != "mock_tool");

        assert_eq!(registry.names(), vec!["another_tool"]);
    }

    #[tokio::test]
    async fn test_tool_execute() -> Result<()> {
        let ctx = ToolContext::new(Arc::new(SandboxConfig::default()));
        let result = MockTool.execute(&ctx, json!({"message": "hi"})).await?;

        assert!(result.success);
        assert_eq!(result.output, "Received: hi");
        Ok(())
    }
}
