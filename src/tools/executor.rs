use super::{ToolContext, ToolRegistry};
use crate::error::ToolErrorKind;
use crate::sandbox::SandboxConfig;
use crate::types::{ToolCall, ToolResult};
use log::{debug, warn};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Runs tool calls against a [`ToolRegistry`] under a [`SandboxConfig`].
///
/// Every call yields exactly one [`ToolResult`]. Unknown tools, sandbox
/// violations, timeouts, cancellation and tool errors are all reported as
/// failed results rather than errors, so the caller can hand them to the model.
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    #[must_use]
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute `call` with the sandbox timeout.
    pub async fn execute(
        &self,
        call: &ToolCall,
        sandbox: &Arc<SandboxConfig>,
        cancel: &CancellationToken,
    ) -> ToolResult {
        self.execute_until(call, sandbox, cancel, None).await
    }

    /// Execute `call`, stopping at the sandbox timeout or at `deadline`,
    /// whichever comes first.
    ///
    /// When the limit is hit the tool future is dropped; tools that spawn
    /// processes use `kill_on_drop`, so the child is killed with it.
    pub async fn execute_until(
        &self,
        call: &ToolCall,
        sandbox: &Arc<SandboxConfig>,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> ToolResult {
        let start = Instant::now();

        let Some(tool) = self.registry.get(&call.name) else {
            warn!("Unknown tool requested: {}", call.name);
            return ToolResult::failure(
                ToolErrorKind::UnknownTool,
                format!("Unknown tool: {}", call.name),
            )
            .for_call(call)
            .with_duration(0);
        };

        if let Err(e) = tool.check(&call.arguments, sandbox) {
            warn!("Tool call rejected by sandbox (tool={}, id={}): {e}", call.name, call.id);
            return ToolResult::failure(e.kind(), format!("Error: {e}"))
                .for_call(call)
                .with_duration(0);
        }

        if cancel.is_cancelled() {
            return cancelled(call);
        }

        let timeout_at = deadline.map_or(start + sandbox.timeout, |d| d.min(start + sandbox.timeout));
        let limit = timeout_at.saturating_duration_since(start);
        let ctx = ToolContext::new(Arc::clone(sandbox)).with_cancel(cancel.clone());

        debug!("Executing tool {} (id={}, limit={limit:?})", call.name, call.id);

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                warn!("Tool {} cancelled (id={})", call.name, call.id);
                ToolResult::failure(ToolErrorKind::Cancelled, "Tool call cancelled before completion")
            }
            outcome = tokio::time::timeout_at(timeout_at, tool.execute(&ctx, call.arguments.clone())) => {
                match outcome {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => ToolResult::failure(ToolErrorKind::Runtime, format!("Error: {e:#}")),
                    Err(_) => {
                        warn!("Tool {} timed out after {limit:?} (id={})", call.name, call.id);
                        ToolResult::failure(
                            ToolErrorKind::Timeout,
                            format!("Tool '{}' timed out after {limit:?} and was stopped", call.name),
                        )
                    }
                }
            }
        };

        result
            .for_call(call)
            .with_duration(millis_to_u64(start.elapsed().as_millis()))
            .truncate_output(sandbox.max_output_chars)
    }
}

fn cancelled(call: &ToolCall) -> ToolResult {
    ToolResult::failure(ToolErrorKind::Cancelled, "Tool call cancelled before it started")
        .for_call(call)
        .with_duration(0)
}

/// Convert u128 milliseconds to u64, capping at `u64::MAX`
#[allow(clippy::cast_possible_truncation)]
const fn millis_to_u64(millis: u128) -> u64 {
    if millis > u64::MAX as u128 {
        u64::MAX
    } else {
        millis as u64
    }
}
