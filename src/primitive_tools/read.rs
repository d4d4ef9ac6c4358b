use crate::error::SandboxError;
use crate::sandbox::SandboxConfig;
use crate::{Tool, ToolContext, ToolResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::check_path_arg;

/// Tool for reading file contents
pub struct ReadFileTool;

#[derive(Debug, Deserialize)]
struct ReadInput {
    /// Path to the file to read
    path: String,
    /// Optional line offset to start from (1-based)
    #[serde(default)]
    offset: Option<usize>,
    /// Optional number of lines to read
    #[serde(default)]
    limit: Option<usize>,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read the contents of a file at the given path. Can optionally specify offset and limit for large files."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                },
                "offset": {
                    "type": "integer",
                    "description": "Line number to start from (1-based). Optional."
                },
                "limit": {
                    "type": "integer",
                    "description": "Number of lines to read. Optional."
                }
            },
            "required": ["path"]
        })
    }

    fn check(&self, input: &Value, sandbox: &SandboxConfig) -> Result<(), SandboxError> {
        check_path_arg(input, sandbox, None)
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<ToolResult> {
        let input: ReadInput =
            serde_json::from_value(input).context("Invalid input for read_file tool")?;

        let path = ctx.sandbox.check_path(&input.path)?;
        let display = path.display();

        if !path.exists() {
            return Ok(ToolResult::error(format!("File not found: '{display}'")));
        }
        if path.is_dir() {
            return Ok(ToolResult::error(format!(
                "'{display}' is a directory, not a file"
            )));
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read file '{display}'"))?;

        // Apply offset and limit if specified
        let lines: Vec<&str> = content.lines().collect();
        let total_lines = lines.len();

        let offset = input.offset.unwrap_or(1).saturating_sub(1); // Convert to 0-based
        let limit = input.limit.unwrap_or(lines.len());

        let selected: Vec<&str> = lines.into_iter().skip(offset).take(limit).collect();

        let output = if selected.is_empty() {
            "(empty file)".to_string()
        } else if input.offset.is_some() || input.limit.is_some() {
            format!(
                "Showing lines {}-{} of {total_lines} total\n{}",
                offset + 1,
                (offset + selected.len()).min(total_lines),
                selected.join("\n")
            )
        } else {
            content
        };

        Ok(ToolResult::success(output))
    }
}
