//! Gateway router: maps channel events to agents and sessions.
//!
//! Each inbound event is routed on its own task. Turns for distinct
//! conversations run in parallel; a conversation runs at most one turn at a
//! time, and a second event arriving while it is busy is rejected with
//! [`GatewayError::RouterConflict`] before the session store is touched.

use crate::agent_loop::{AgentLoop, TurnOutcome};
use crate::channels::{ChannelAdapter, ChannelEvent, ChannelResponse, ResponseStatus};
use crate::conversation::Conversation;
use crate::error::GatewayError;
use crate::stores::SessionStore;
use crate::types::ConversationKey;
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// Dispatches [`ChannelEvent`]s to agents.
///
/// Share it behind an `Arc` and call [`route`](Self::route) or
/// [`handle`](Self::handle) from one task per event.
pub struct GatewayRouter {
    default_agent: Arc<AgentLoop>,
    agents: HashMap<String, Arc<AgentLoop>>,
    adapters: HashMap<String, Arc<dyn ChannelAdapter>>,
    store: Arc<dyn SessionStore>,
    in_flight: Arc<Mutex<HashSet<ConversationKey>>>,
    shutdown: CancellationToken,
}

/// Marks a conversation busy until dropped.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<ConversationKey>>>,
    key: ConversationKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl GatewayRouter {
    /// Router serving every channel with `default_agent` until
    /// [`with_agent`](Self::with_agent) binds a channel to another one.
    #[must_use]
    pub fn new(default_agent: Arc<AgentLoop>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            default_agent,
            agents: HashMap::new(),
            adapters: HashMap::new(),
            store,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Bind `channel_id` to its own agent.
    #[must_use]
    pub fn with_agent(mut self, channel_id: impl Into<String>, agent: Arc<AgentLoop>) -> Self {
        self.agents.insert(channel_id.into(), agent);
        self
    }

    /// Accept events from this adapter's channel.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.adapters
            .insert(adapter.channel_id().to_string(), adapter);
        self
    }

    #[must_use]
    pub fn adapter(&self, channel_id: &str) -> Option<&Arc<dyn ChannelAdapter>> {
        self.adapters.get(channel_id)
    }

    /// Agent serving `channel_id`.
    #[must_use]
    pub fn agent_for(&self, channel_id: &str) -> &Arc<AgentLoop> {
        self.agents.get(channel_id).unwrap_or(&self.default_agent)
    }

    /// Whether a turn for `key` is running.
    #[must_use]
    pub fn is_busy(&self, key: &ConversationKey) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    /// Token cancelled by [`shutdown`](Self::shutdown). Every turn runs
    /// under a child of it.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel every in-flight turn. Their conversations are still persisted.
    pub fn shutdown(&self) {
        info!("Gateway shutting down, cancelling in-flight turns");
        self.shutdown.cancel();
    }

    /// Run one turn for `event` and return the reply shaped for its channel.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the channel is unknown, the sender is not
    /// allowed, the conversation is busy, or the session store fails. Agent
    /// failures are not errors here: they come back as a response with
    /// [`ResponseStatus::Failed`] after the conversation is persisted.
    pub async fn route(&self, event: ChannelEvent) -> Result<ChannelResponse, GatewayError> {
        self.route_with_cancel(event, &CancellationToken::new()).await
    }

    /// Like [`route`](Self::route), with an extra token that cancels just
    /// this turn.
    ///
    /// # Errors
    ///
    /// See [`route`](Self::route).
    pub async fn route_with_cancel(
        &self,
        event: ChannelEvent,
        cancel: &CancellationToken,
    ) -> Result<ChannelResponse, GatewayError> {
        let adapter = self.authorize(&event)?;
        let key = event.key();
        let _guard = self.claim(&key)?;

        let mut conversation = self.load_or_new(&key).await?;

        let turn_cancel = self.shutdown.child_token();
        debug!(
            "Routing event for {key} ({} prior messages)",
            conversation.len()
        );
        let agent_text = event.agent_text();
        let outcome = {
            let turn = self
                .agent_for(&event.channel_id)
                .run_turn(&mut conversation, &agent_text, &turn_cancel);
            tokio::pin!(turn);
            // The caller's token only flags the turn; the turn itself still
            // runs to a consistent end before it is persisted.
            tokio::select! {
                outcome = &mut turn => outcome,
                () = cancel.cancelled() => {
                    turn_cancel.cancel();
                    turn.await
                }
            }
        };

        if let Err(source) = self.store.save(&key, &conversation).await {
            error!("Failed to persist {key}: {source:#}");
            return Err(GatewayError::Store { key, source });
        }

        let (text, status) = match &outcome {
            TurnOutcome::Done { reply, summary, .. } => {
                let status = if summary.degraded {
                    ResponseStatus::Degraded
                } else {
                    ResponseStatus::Ok
                };
                (reply.as_str(), status)
            }
            TurnOutcome::Failed { error, .. } => {
                warn!("Turn for {key} failed: {error}");
                (error.user_message(), ResponseStatus::Failed)
            }
        };

        Ok(adapter.format_response(&event, text, status))
    }

    /// Never-failing wrapper around [`route`](Self::route): errors become a
    /// user-visible failure response.
    pub async fn handle(&self, event: ChannelEvent) -> ChannelResponse {
        let result = self.route(event.clone()).await;
        result.unwrap_or_else(|e| self.error_response(&event, &e))
    }

    /// Stored conversation for `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Store`] if the store cannot be read.
    pub async fn conversation(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<Conversation>, GatewayError> {
        self.store
            .load(key)
            .await
            .map_err(|source| GatewayError::Store {
                key: key.clone(),
                source,
            })
    }

    /// Drop the stored history for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::RouterConflict`] while a turn for `key` is
    /// running, or [`GatewayError::Store`] if the delete fails.
    pub async fn clear(&self, key: &ConversationKey) -> Result<(), GatewayError> {
        let _guard = self.claim(key)?;
        self.store
            .delete(key)
            .await
            .map_err(|source| GatewayError::Store {
                key: key.clone(),
                source,
            })?;
        info!("Cleared conversation {key}");
        Ok(())
    }

    fn authorize(&self, event: &ChannelEvent) -> Result<&Arc<dyn ChannelAdapter>, GatewayError> {
        let adapter = self
            .adapters
            .get(&event.channel_id)
            .ok_or_else(|| GatewayError::UnknownChannel(event.channel_id.clone()))?;

        if !adapter.is_allowed(&event.sender_id) {
            warn!(
                "Rejected sender {} on channel {}",
                event.sender_id, event.channel_id
            );
            return Err(GatewayError::SenderNotAllowed {
                channel: event.channel_id.clone(),
                sender: event.sender_id.clone(),
            });
        }
        Ok(adapter)
    }

    fn claim(&self, key: &ConversationKey) -> Result<InFlightGuard, GatewayError> {
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        if !inserted {
            warn!("Conversation {key} is busy, rejecting event");
            return Err(GatewayError::RouterConflict(key.clone()));
        }
        Ok(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            key: key.clone(),
        })
    }

    async fn load_or_new(&self, key: &ConversationKey) -> Result<Conversation, GatewayError> {
        match self.store.load(key).await {
            Ok(Some(conversation)) => Ok(conversation),
            Ok(None) => Ok(Conversation::new(key.clone())),
            Err(source) => {
                error!("Failed to load {key}: {source:#}");
                Err(GatewayError::Store {
                    key: key.clone(),
                    source,
                })
            }
        }
    }

    fn error_response(&self, event: &ChannelEvent, error: &GatewayError) -> ChannelResponse {
        let status = match error {
            GatewayError::RouterConflict(_) => ResponseStatus::Busy,
            _ => ResponseStatus::Failed,
        };
        let text = error.user_message();
        match self.adapters.get(&event.channel_id) {
            Some(adapter) => adapter.format_response(event, text, status),
            None => ChannelResponse::new(text, status),
        }
    }
}
