//! WhatsApp through the chat bridge.
//!
//! The bridge delivers `{"type":"message","sender":"<jid>","content":...}`
//! and accepts `{"type":"send","to":"<jid>","text":...}`. The jid is the
//! conversation id; the phone number before `@` is the sender id.

use super::{ChannelAdapter, ChannelEvent, ChannelResponse, ResponseStatus};
use serde::Deserialize;
use serde_json::json;

#[derive(Clone, Debug)]
pub struct WhatsAppAdapter {
    bridge_url: String,
    allow_from: Vec<String>,
}

#[derive(Deserialize)]
struct BridgeMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    sender: String,
    #[serde(default)]
    content: String,
}

impl WhatsAppAdapter {
    pub const CHANNEL_ID: &'static str = "whatsapp";

    #[must_use]
    pub fn new(bridge_url: impl Into<String>, allow_from: Vec<String>) -> Self {
        Self {
            bridge_url: bridge_url.into(),
            allow_from,
        }
    }

    #[must_use]
    pub fn bridge_url(&self) -> &str {
        &self.bridge_url
    }

    /// Build an event from a raw bridge frame. Status, QR and malformed
    /// frames yield `None`.
    #[must_use]
    pub fn event_from_bridge(&self, raw: &str) -> Option<ChannelEvent> {
        let message: BridgeMessage = match serde_json::from_str(raw) {
            Ok(m) => m,
            Err(e) => {
                log::debug!("Ignoring malformed bridge frame: {e}");
                return None;
            }
        };
        if message.kind != "message" || message.sender.is_empty() {
            return None;
        }
        let content = message.content.trim();
        if content.is_empty() {
            return None;
        }

        let phone = message
            .sender
            .split_once('@')
            .map_or(message.sender.as_str(), |(phone, _)| phone);
        Some(ChannelEvent::new(
            Self::CHANNEL_ID,
            message.sender.as_str(),
            phone,
            content,
        ))
    }
}

impl ChannelAdapter for WhatsAppAdapter {
    fn channel_id(&self) -> &str {
        Self::CHANNEL_ID
    }

    fn allow_from(&self) -> &[String] {
        &self.allow_from
    }

    fn format_response(
        &self,
        event: &ChannelEvent,
        text: &str,
        status: ResponseStatus,
    ) -> ChannelResponse {
        ChannelResponse::new(text, status).with_structured(json!({
            "type": "send",
            "to": event.conversation_id,
            "text": text,
        }))
    }
}
