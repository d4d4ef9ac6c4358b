use crate::error::SandboxError;
use crate::sandbox::SandboxConfig;
use crate::{Tool, ToolContext, ToolResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::check_path_arg;

/// Tool for writing files, creating parent directories as needed
pub struct WriteFileTool;

#[derive(Debug, Deserialize)]
struct WriteInput {
    /// Path to the file to write
    path: String,
    /// Content to write
    content: String,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Write content to a file at the given path. Creates parent directories if needed and overwrites existing files."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write to"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn check(&self, input: &Value, sandbox: &SandboxConfig) -> Result<(), SandboxError> {
        check_path_arg(input, sandbox, None)
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<ToolResult> {
        let input: WriteInput =
            serde_json::from_value(input).context("Invalid input for write_file tool")?;

        let path = ctx.sandbox.check_path(&input.path)?;
        let display = path.display();

        if path.is_dir() {
            return Ok(ToolResult::error(format!(
                "'{display}' is a directory, cannot write"
            )));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create parent directories for '{display}'"))?;
        }

        tokio::fs::write(&path, &input.content)
            .await
            .with_context(|| format!("Failed to write file '{display}'"))?;

        let lines = input.content.lines().count();
        let bytes = input.content.len();

        Ok(ToolResult::success(format!(
            "Successfully wrote {lines} lines ({bytes} bytes) to '{display}'"
        )))
    }
}
