use crate::error::SandboxError;
use crate::sandbox::SandboxConfig;
use crate::{Tool, ToolContext, ToolResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{check_path_arg, truncate_string};

/// Tool for editing files by exact string replacement
pub struct EditFileTool;

#[derive(Debug, Deserialize)]
struct EditInput {
    /// Path to the file to edit
    path: String,
    /// String to find and replace
    old_text: String,
    /// Replacement string
    new_text: String,
    /// Replace all occurrences (default: false)
    #[serde(default)]
    replace_all: bool,
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &'static str {
        "edit_file"
    }

    fn description(&self) -> &'static str {
        "Edit a file by replacing old_text with new_text. The old_text must exist exactly and uniquely in the file (unless replace_all is true)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to edit"
                },
                "old_text": {
                    "type": "string",
                    "description": "The exact text to find and replace"
                },
                "new_text": {
                    "type": "string",
                    "description": "The text to replace with"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace all occurrences instead of requiring a unique match. Default: false"
                }
            },
            "required": ["path", "old_text", "new_text"]
        })
    }

    fn check(&self, input: &Value, sandbox: &SandboxConfig) -> Result<(), SandboxError> {
        check_path_arg(input, sandbox, None)
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<ToolResult> {
        let input: EditInput =
            serde_json::from_value(input).context("Invalid input for edit_file tool")?;

        let path = ctx.sandbox.check_path(&input.path)?;
        let display = path.display();

        if !path.exists() {
            return Ok(ToolResult::error(format!("File not found: '{display}'")));
        }
        if path.is_dir() {
            return Ok(ToolResult::error(format!(
                "'{display}' is a directory, cannot edit"
            )));
        }
        if input.old_text.is_empty() {
            return Ok(ToolResult::error("old_text must not be empty"));
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read file '{display}'"))?;

        let count = content.matches(&input.old_text).count();

        if count == 0 {
            return Ok(ToolResult::error(format!(
                "old_text not found in '{display}': '{}'",
                truncate_string(&input.old_text, 100)
            )));
        }

        if count > 1 && !input.replace_all {
            return Ok(ToolResult::error(format!(
                "old_text appears {count} times in '{display}'. Provide more context to make it unique, or set replace_all: true."
            )));
        }

        let new_content = if input.replace_all {
            content.replace(&input.old_text, &input.new_text)
        } else {
            content.replacen(&input.old_text, &input.new_text, 1)
        };

        tokio::fs::write(&path, &new_content)
            .await
            .with_context(|| format!("Failed to write file '{display}'"))?;

        let replacements = if input.replace_all { count } else { 1 };
        Ok(ToolResult::success(format!(
            "Successfully replaced {replacements} occurrence(s) in '{display}'"
        )))
    }
}
