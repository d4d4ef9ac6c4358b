//! Channel adapters.
//!
//! A [`ChannelAdapter`] translates between a front end and the gateway: it
//! turns whatever the front end delivers into a [`ChannelEvent`] and shapes
//! the agent's answer into a [`ChannelResponse`] the front end can deliver.
//! Transport (websockets, bot API polling, the bridge socket) stays outside
//! this crate.
//!
//! # Built-in Adapters
//!
//! - [`WebAdapter`] - Local web chat
//! - [`TelegramAdapter`] - Telegram bot API
//! - [`WhatsAppAdapter`] - WhatsApp through the chat bridge

pub mod telegram;
pub mod web;
pub mod whatsapp;

pub use telegram::TelegramAdapter;
pub use web::WebAdapter;
pub use whatsapp::WhatsAppAdapter;

use crate::types::ConversationKey;
use serde::{Deserialize, Serialize};

/// File or media attached to an inbound message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Where the adapter stored or can fetch the content
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Inbound message, normalized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub channel_id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub user_text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl ChannelEvent {
    #[must_use]
    pub fn new(
        channel_id: impl Into<String>,
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        user_text: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            user_text: user_text.into(),
            attachments: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    #[must_use]
    pub fn key(&self) -> ConversationKey {
        ConversationKey::new(&self.channel_id, &self.conversation_id)
    }

    /// Text handed to the agent: the user text followed by one line per
    /// attachment.
    #[must_use]
    pub fn agent_text(&self) -> String {
        if self.attachments.is_empty() {
            return self.user_text.clone();
        }
        let mut text = self.user_text.clone();
        for attachment in &self.attachments {
            let mime = attachment.mime_type.as_deref().unwrap_or("file");
            text.push_str(&format!("\n[attachment: {mime} {}]", attachment.url));
        }
        text
    }
}

/// How the turn behind a response ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// Answered by the primary model
    Ok,
    /// Answered by the backup model
    Degraded,
    /// Another turn for the conversation is still running
    Busy,
    /// The turn failed; `text` carries a user-facing explanation
    Failed,
}

/// Outbound answer, shaped for one channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelResponse {
    pub text: String,
    /// Channel-specific payload, e.g. a web chat frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,
    pub status: ResponseStatus,
}

impl ChannelResponse {
    #[must_use]
    pub fn new(text: impl Into<String>, status: ResponseStatus) -> Self {
        Self {
            text: text.into(),
            structured: None,
            status,
        }
    }

    #[must_use]
    pub fn with_structured(mut self, structured: serde_json::Value) -> Self {
        self.structured = Some(structured);
        self
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.status, ResponseStatus::Failed | ResponseStatus::Busy)
    }
}

/// Front end as seen by the gateway.
pub trait ChannelAdapter: Send + Sync {
    /// Channel id stamped on every event this adapter produces.
    fn channel_id(&self) -> &str;

    /// Sender ids allowed to talk to the agent. Empty allows everyone.
    fn allow_from(&self) -> &[String];

    /// Whether `sender_id` may use the agent.
    ///
    /// Composite ids such as `12345|alice` are allowed when any non-empty
    /// part is on the list.
    fn is_allowed(&self, sender_id: &str) -> bool {
        let allow = self.allow_from();
        if allow.is_empty() || allow.iter().any(|a| a == sender_id) {
            return true;
        }
        sender_id
            .split('|')
            .filter(|part| !part.is_empty())
            .any(|part| allow.iter().any(|a| a == part))
    }

    /// Shape a reply for delivery on this channel.
    fn format_response(
        &self,
        event: &ChannelEvent,
        text: &str,
        status: ResponseStatus,
    ) -> ChannelResponse;
}
