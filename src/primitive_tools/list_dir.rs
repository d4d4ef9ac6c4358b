use crate::error::SandboxError;
use crate::sandbox::SandboxConfig;
use crate::{Tool, ToolContext, ToolResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::check_path_arg;

/// Tool for listing directory contents
pub struct ListDirTool;

#[derive(Debug, Deserialize)]
struct ListDirInput {
    /// Directory to list (default: workspace root)
    #[serde(default = "default_path")]
    path: String,
}

fn default_path() -> String {
    ".".to_string()
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &'static str {
        "list_dir"
    }

    fn description(&self) -> &'static str {
        "List the contents of a directory."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The directory path to list. Defaults to the workspace."
                }
            }
        })
    }

    fn check(&self, input: &Value, sandbox: &SandboxConfig) -> Result<(), SandboxError> {
        check_path_arg(input, sandbox, Some("."))
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<ToolResult> {
        let input: ListDirInput =
            serde_json::from_value(input).context("Invalid input for list_dir tool")?;

        let path = ctx.sandbox.check_path(&input.path)?;
        let display = path.display();

        if !path.exists() {
            return Ok(ToolResult::error(format!("Directory not found: '{display}'")));
        }
        if !path.is_dir() {
            return Ok(ToolResult::error(format!("'{display}' is not a directory")));
        }

        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&path)
            .await
            .with_context(|| format!("Failed to list '{display}'"))?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
            entries.push((is_dir, name));
        }
        entries.sort_by(|a, b| a.1.cmp(&b.1));

        if entries.is_empty() {
            return Ok(ToolResult::success(format!("Directory '{display}' is empty")));
        }

        let listing: Vec<String> = entries
            .into_iter()
            .map(|(is_dir, name)| {
                if is_dir {
                    format!("[dir]  {name}")
                } else {
                    format!("[file] {name}")
                }
            })
            .collect();

        Ok(ToolResult::success(listing.join("\n")))
    }
}
