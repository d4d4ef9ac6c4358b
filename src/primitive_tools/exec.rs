use crate::error::SandboxError;
use crate::sandbox::SandboxConfig;
use crate::{Tool, ToolContext, ToolResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt::Write;
use std::process::Stdio;
use tokio::process::Command;

use super::truncate_string;

/// Tool for executing shell commands in the workspace
pub struct ExecTool;

#[derive(Debug, Deserialize)]
struct ExecInput {
    /// Command to execute
    command: String,
    /// Directory to run in, relative to the workspace (default: workspace root)
    #[serde(default)]
    working_dir: Option<String>,
}

impl ExecInput {
    fn working_dir(&self) -> &str {
        self.working_dir.as_deref().unwrap_or(".")
    }
}

#[async_trait]
impl Tool for ExecTool {
    fn name(&self) -> &'static str {
        "exec"
    }

    fn description(&self) -> &'static str {
        "Execute a shell command and return its output. Use with caution."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "working_dir": {
                    "type": "string",
                    "description": "Optional working directory for the command"
                }
            },
            "required": ["command"]
        })
    }

    fn check(&self, input: &Value, sandbox: &SandboxConfig) -> Result<(), SandboxError> {
        let input: ExecInput = serde_json::from_value(input.clone())
            .map_err(|e| SandboxError::InvalidInput(e.to_string()))?;
        let cwd = sandbox.check_path(input.working_dir())?;
        sandbox.check_command(&input.command, &cwd)
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<ToolResult> {
        let input: ExecInput =
            serde_json::from_value(input).context("Invalid input for exec tool")?;

        let cwd = ctx.sandbox.check_path(input.working_dir())?;
        if !cwd.is_dir() {
            return Ok(ToolResult::error(format!(
                "Working directory not found: '{}'",
                cwd.display()
            )));
        }

        log::debug!(
            "exec in {}: {}",
            cwd.display(),
            truncate_string(&input.command, 200)
        );

        // Dropping this future (timeout or cancellation) kills the child.
        let output = Command::new("sh")
            .arg("-c")
            .arg(&input.command)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to execute command")?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);

        let mut text = String::new();
        if !stdout.is_empty() {
            text.push_str(&stdout);
        }
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push_str("\n\n--- stderr ---\n");
            }
            text.push_str(&stderr);
        }
        if text.is_empty() {
            text = "(no output)".to_string();
        }
        let _ = write!(text, "\n\nExit code: {exit_code}");

        if output.status.success() {
            Ok(ToolResult::success(text))
        } else {
            Ok(ToolResult::error(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolErrorKind;
    use crate::tools::{ToolExecutor, ToolRegistry};
    use crate::types::ToolCall;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tokio_util::sync::CancellationToken;

    fn ctx(dir: &std::path::Path) -> ToolContext {
        ToolContext::new(Arc::new(SandboxConfig::new(dir)))
    }

    #[tokio::test]
    async fn test_exec_captures_stdout_and_exit_code() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let result = ExecTool
            .execute(&ctx(dir.path()), json!({"command": "echo hello"}))
            .await?;

        assert!(result.success);
        assert!(result.output.starts_with("hello"));
        assert!(result.output.ends_with("Exit code: 0"));
        Ok(())
    }

    #[tokio::test]
    async fn test_exec_runs_in_workspace() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("marker.txt"), "here")?;

        let result = ExecTool
            .execute(&ctx(dir.path()), json!({"command": "cat marker.txt"}))
            .await?;

        assert!(result.output.contains("here"));
        Ok(())
    }

    #[tokio::test]
    async fn test_exec_nonzero_exit_is_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let result = ExecTool
            .execute(&ctx(dir.path()), json!({"command": "echo oops >&2; exit 3"}))
            .await?;

        assert!(!result.success);
        assert!(result.output.contains("oops"));
        assert!(result.output.contains("Exit code: 3"));
        Ok(())
    }

    #[tokio::test]
    async fn test_exec_no_output() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let result = ExecTool
            .execute(&ctx(dir.path()), json!({"command": "true"}))
            .await?;

        assert!(result.output.starts_with("(no output)"));
        Ok(())
    }

    #[test]
    fn test_check_rejects_paths_outside_workspace() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let sandbox = SandboxConfig::new(dir.path()).with_restrict_to_workspace(true);

        assert!(ExecTool.check(&json!({"command": "cat /etc/passwd"}), &sandbox).is_err());
        assert!(ExecTool.check(&json!({"command": "ls", "working_dir": "/tmp"}), &sandbox).is_err());
        assert!(ExecTool.check(&json!({"command": "ls -la"}), &sandbox).is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_long_command_is_killed_at_timeout() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut registry = ToolRegistry::new();
        registry.register(ExecTool);
        let executor = ToolExecutor::new(registry);
        let sandbox = Arc::new(SandboxConfig::new(dir.path()).with_timeout(Duration::from_secs(1)));
        let call = ToolCall {
            id: "call_sleep".into(),
            name: "exec".into(),
            arguments: json!({"command": "sleep 600"}),
            origin_ordinal: 2,
        };

        let started = Instant::now();
        let result = executor
            .execute(&call, &sandbox, &CancellationToken::new())
            .await;

        assert_eq!(result.error, Some(ToolErrorKind::Timeout));
        assert!(started.elapsed() < Duration::from_secs(10));
        Ok(())
    }

    #[tokio::test]
    async fn test_sandboxed_exec_never_spawns() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut registry = ToolRegistry::new();
        registry.register(ExecTool);
        let executor = ToolExecutor::new(registry);
        let sandbox = Arc::new(SandboxConfig::new(dir.path()).with_restrict_to_workspace(true));
        let marker = dir.path().join("spawned");
        let call = ToolCall {
            id: "call_escape".into(),
            name: "exec".into(),
            arguments: json!({"command": format!("touch {} && cat /etc/hostname", marker.display())}),
            origin_ordinal: 2,
        };

        let result = executor
            .execute(&call, &sandbox, &CancellationToken::new())
            .await;

        assert_eq!(result.error, Some(ToolErrorKind::SandboxViolation));
        assert!(!marker.exists());
        Ok(())
    }
}
