//! Telegram bot API.

use super::{Attachment, ChannelAdapter, ChannelEvent, ChannelResponse, ResponseStatus};
use serde_json::{Value, json};

/// Longest text Telegram accepts in one message.
pub const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Clone, Debug, Default)]
pub struct TelegramAdapter {
    allow_from: Vec<String>,
}

impl TelegramAdapter {
    pub const CHANNEL_ID: &'static str = "telegram";

    #[must_use]
    pub fn new(allow_from: Vec<String>) -> Self {
        Self { allow_from }
    }

    /// Build an event from a bot API update.
    ///
    /// The sender id is `user_id|username` when the user has a username, so
    /// allow-lists may name either. Updates without a message, a chat, or any
    /// text, caption or photo are skipped.
    #[must_use]
    pub fn event_from_update(&self, update: &Value) -> Option<ChannelEvent> {
        let message = update.get("message")?;
        let chat_id = message.pointer("/chat/id").and_then(Value::as_i64)?;
        let from = message.get("from");
        let user_id = from
            .and_then(|f| f.get("id"))
            .and_then(Value::as_i64)
            .map(|id| id.to_string())
            .unwrap_or_default();
        let sender_id = match from.and_then(|f| f.get("username")).and_then(Value::as_str) {
            Some(username) => format!("{user_id}|{username}"),
            None => user_id,
        };

        let text = message
            .get("text")
            .or_else(|| message.get("caption"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        // The largest photo size is listed last
        let photo = message
            .get("photo")
            .and_then(Value::as_array)
            .and_then(|sizes| sizes.last())
            .and_then(|p| p.get("file_id"))
            .and_then(Value::as_str);

        if text.trim().is_empty() && photo.is_none() {
            return None;
        }

        let mut event = ChannelEvent::new(Self::CHANNEL_ID, chat_id.to_string(), sender_id, text);
        if let Some(file_id) = photo {
            event = event.with_attachment(Attachment {
                url: format!("telegram-file:{file_id}"),
                mime_type: Some("image/jpeg".to_string()),
            });
        }
        Some(event)
    }
}

/// Split `text` into chunks of at most `max_chars` characters, breaking at
/// the last newline inside a chunk when there is one.
#[must_use]
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest: &str = text;

    while rest.chars().count() > max_chars {
        let limit = rest
            .char_indices()
            .nth(max_chars)
            .map_or(rest.len(), |(idx, _)| idx);
        let window = &rest[..limit];
        let cut = match window.rfind('\n') {
            Some(idx) if idx > 0 => idx + 1,
            _ => limit,
        };
        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }

    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

impl ChannelAdapter for TelegramAdapter {
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
        let chunks = split_message(text, MAX_MESSAGE_CHARS);
        ChannelResponse::new(text, status).with_structured(json!({
            "chat_id": event.conversation_id,
            "chunks": chunks,
        }))
    }
}
