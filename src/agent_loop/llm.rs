use super::{AgentLoop, Turn};
use crate::error::ProviderError;
use crate::events::AgentEvent;
use crate::llm::{ChatRequest, ChatResponse};
use log::{error, warn};

impl AgentLoop {
    /// Model the next round goes to.
    pub(super) fn current_model<'a>(&'a self, turn: &Turn<'_>) -> &'a str {
        match (&self.config.backup_model, turn.failed_over) {
            (Some(backup), true) => backup,
            _ => &self.config.model,
        }
    }

    /// Call the primary model, failing over once to the backup on a transient
    /// or auth error. After a failover every later round of the turn goes
    /// straight to the backup, and a backup failure is returned as is.
    pub(super) async fn invoke(
        &self,
        turn: &mut Turn<'_>,
        mut request: ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        if turn.failed_over {
            return self.invoke_backup(turn, request).await;
        }

        request.model.clone_from(&self.config.model);
        let error = match self.primary.chat(request.clone()).await {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        let Some(backup_model) = self
            .config
            .backup_model
            .as_ref()
            .filter(|_| self.backup.is_some() && error.allows_failover())
        else {
            error!(
                "Model {} failed for {} ({}): {error}",
                self.config.model,
                turn.key,
                error.kind()
            );
            return Err(error);
        };

        warn!(
            "Model {} failed for {} ({}), failing over to {backup_model}: {error}",
            self.config.model,
            turn.key,
            error.kind()
        );
        self.emit(
            turn,
            AgentEvent::Failover {
                from_model: self.config.model.clone(),
                to_model: backup_model.clone(),
                reason: error.kind().to_string(),
            },
        );
        turn.failed_over = true;

        self.invoke_backup(turn, request).await
    }

    async fn invoke_backup(
        &self,
        turn: &mut Turn<'_>,
        mut request: ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        let (Some(backup), Some(model)) = (&self.backup, &self.config.backup_model) else {
            return Err(ProviderError::Fatal("no backup model configured".to_string()));
        };

        request.model.clone_from(model);
        match backup.chat(request).await {
            Ok(response) => {
                warn!("Degraded mode: {} answered by backup model {model}", turn.key);
                turn.summary.degraded = true;
                Ok(response)
            }
            Err(e) => {
                error!("Backup model {model} failed for {} ({}): {e}", turn.key, e.kind());
                Err(e)
            }
        }
    }
}
