//! Built-in tools for the assistant's workspace.
//!
//! - `ExecTool` - Run a shell command
//! - `ReadFileTool` - Read file contents
//! - `WriteFileTool` - Write/create files
//! - `EditFileTool` - Edit existing files with string replacement
//! - `ListDirTool` - List a directory
//!
//! Paths resolve against the sandbox workspace. Every tool checks its paths in
//! [`Tool::check`](crate::Tool::check) so violations are caught before execution.

mod edit;
mod exec;
mod list_dir;
mod read;
mod write;

pub use edit::EditFileTool;
pub use exec::ExecTool;
pub use list_dir::ListDirTool;
pub use read::ReadFileTool;
pub use write::WriteFileTool;

use crate::ToolRegistry;
use crate::error::SandboxError;
use crate::sandbox::SandboxConfig;
use serde_json::Value;

/// Register every built-in tool except web search.
pub fn register_all(registry: &mut ToolRegistry) {
    registry
        .register(ExecTool)
        .register(ReadFileTool)
        .register(WriteFileTool)
        .register(EditFileTool)
        .register(ListDirTool);
}

/// Sandbox check for tools whose target is the `path` argument.
fn check_path_arg(
    input: &Value,
    sandbox: &SandboxConfig,
    default: Option<&str>,
) -> Result<(), SandboxError> {
    let path = input
        .get("path")
        .and_then(Value::as_str)
        .or(default)
        .ok_or_else(|| SandboxError::InvalidInput("missing 'path'".to_string()))?;
    sandbox.check_path(path).map(|_| ())
}

fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
