use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::new_id;
use super::{Role, Session};

/// Opaque tool-call data attached to a message, usually an array of calls.
/// Its shape is defined by the tool that produced it; the store only
/// round-trips it.
pub type ToolPayload = serde_json::Value;

/// `null`, `[]` and `{}` carry nothing worth storing.
fn is_blank_payload(payload: &ToolPayload) -> bool {
    match payload {
        serde_json::Value::Null => true,
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}

/// One stored turn of a conversation. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    /// Zero-based position within the session. Authoritative ordering key.
    pub order_index: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<ToolPayload>,
}

/// Input to `append_message`. The store assigns order and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub tool_calls: Option<ToolPayload>,
}

impl NewMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role,
            content: content.into(),
            tool_calls: None,
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::new(Role::Human, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Use a caller-chosen id, e.g. the client's message id, so a retried
    /// request appends nothing new.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_tool_calls(mut self, payload: Option<ToolPayload>) -> Self {
        self.tool_calls = payload.filter(|p| !is_blank_payload(p));
        self
    }

    /// Materialise into a stored message at `order_index`.
    pub fn into_message(
        self,
        session_id: &str,
        order_index: u32,
        created_at: DateTime<Utc>,
    ) -> Message {
        Message {
            id: self.id,
            session_id: session_id.to_string(),
            role: self.role,
            content: self.content,
            order_index,
            created_at,
            tool_calls: self.tool_calls,
        }
    }
}

/// A session together with all of its messages in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub session: Session,
    pub messages: Vec<Message>,
}

/// Order messages by `order_index`, falling back to `created_at`.
pub fn sort_messages(messages: &mut [Message]) {
    messages.sort_by(|a, b| {
        a.order_index
            .cmp(&b.order_index)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}
