//! Local web chat.
//!
//! Clients connect with a session id and a client id; either may be missing,
//! in which case a random one is issued. Frames are JSON:
//!
//! - inbound `{"type":"message","content":"..."}` or `{"type":"clear"}`,
//!   with anything that is not a JSON object taken as plain message text
//! - outbound `message`, `history`, `info` and `error` frames

use super::{ChannelAdapter, ChannelEvent, ChannelResponse, ResponseStatus};
use crate::conversation::Conversation;
use crate::llm::Role;
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Most messages sent in a history frame.
pub const HISTORY_LIMIT: usize = 200;

/// Parsed inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundFrame {
    /// User text, trimmed and non-empty
    Message(String),
    /// Drop the session's history
    Clear,
    /// A JSON object with an unsupported `type`
    Unknown(String),
}

/// Adapter for the local web chat.
#[derive(Clone, Debug, Default)]
pub struct WebAdapter {
    allow_from: Vec<String>,
}

impl WebAdapter {
    pub const CHANNEL_ID: &'static str = "web";

    #[must_use]
    pub fn new(allow_from: Vec<String>) -> Self {
        Self { allow_from }
    }

    /// Session and client ids for a connection, filling in random ones for
    /// blank values.
    #[must_use]
    pub fn connection_ids(session: Option<&str>, client: Option<&str>) -> (String, String) {
        let session = non_blank(session).map_or_else(|| random_hex(24), str::to_string);
        let client = non_blank(client).map_or_else(|| random_hex(16), str::to_string);
        (session, client)
    }

    /// Parse one raw frame. Returns `None` for frames that carry nothing to do,
    /// such as blank text or a message with empty content.
    #[must_use]
    pub fn parse_frame(raw: &str) -> Option<InboundFrame> {
        let data = raw
            .starts_with(['{', '['])
            .then(|| serde_json::from_str::<Value>(raw).ok())
            .flatten()
            .filter(Value::is_object);

        let Some(data) = data else {
            let content = raw.trim();
            return (!content.is_empty()).then(|| InboundFrame::Message(content.to_string()));
        };

        let kind = data.get("type").map(value_text).unwrap_or_default();
        match kind.as_str() {
            "message" => {
                let content = data.get("content").map(value_text).unwrap_or_default();
                let content = content.trim();
                (!content.is_empty()).then(|| InboundFrame::Message(content.to_string()))
            }
            "clear" => Some(InboundFrame::Clear),
            _ => Some(InboundFrame::Unknown(kind)),
        }
    }

    #[must_use]
    pub fn event(&self, session_id: &str, client_id: &str, content: &str) -> ChannelEvent {
        ChannelEvent::new(Self::CHANNEL_ID, session_id, client_id, content)
    }

    #[must_use]
    pub fn message_frame(content: &str, timestamp: OffsetDateTime) -> Value {
        json!({
            "type": "message",
            "role": "assistant",
            "content": content,
            "timestamp": timestamp.format(&Rfc3339).unwrap_or_default(),
        })
    }

    #[must_use]
    pub fn info_frame(content: &str) -> Value {
        json!({"type": "info", "content": content})
    }

    #[must_use]
    pub fn error_frame(content: &str) -> Value {
        json!({"type": "error", "content": content})
    }

    /// History sent on connect and after a clear: the last
    /// [`HISTORY_LIMIT`] user and assistant messages with their text.
    #[must_use]
    pub fn history_frame(session_id: &str, conversation: Option<&Conversation>) -> Value {
        let messages: Vec<Value> = conversation
            .map(|c| c.recent_chat(HISTORY_LIMIT))
            .unwrap_or_default()
            .into_iter()
            .map(|m| {
                json!({
                    "role": if m.role == Role::User { "user" } else { "assistant" },
                    "content": m.content.first_text().unwrap_or_default(),
                    "timestamp": m.timestamp.format(&Rfc3339).unwrap_or_default(),
                })
            })
            .collect();

        json!({"type": "history", "session": session_id, "messages": messages})
    }
}

impl ChannelAdapter for WebAdapter {
    fn channel_id(&self) -> &str {
        Self::CHANNEL_ID
    }

    fn allow_from(&self) -> &[String] {
        &self.allow_from
    }

    fn format_response(
        &self,
        _event: &ChannelEvent,
        text: &str,
        status: ResponseStatus,
    ) -> ChannelResponse {
        let frame = match status {
            ResponseStatus::Ok | ResponseStatus::Degraded => {
                Self::message_frame(text, OffsetDateTime::now_utc())
            }
            ResponseStatus::Busy | ResponseStatus::Failed => Self::error_frame(text),
        };
        ChannelResponse::new(text, status).with_structured(frame)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn random_hex(len: usize) -> String {
    uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(len)
        .collect()
}

// `type` and `content` may arrive as non-strings; render those as JSON text.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
