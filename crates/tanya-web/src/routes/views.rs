//! Response bodies. Everything leaving the service uses API role labels.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tanya_core::model::*;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// Same as `last_active_at`; older clients read this name.
    pub updated_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl From<Session> for SessionView {
    fn from(s: Session) -> Self {
        Self {
            id: s.id,
            title: s.title,
            created_at: s.created_at,
            updated_at: s.last_active_at,
            last_active_at: s.last_active_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryView {
    #[serde(flatten)]
    pub session: SessionView,
    pub message_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_role: Option<ApiRole>,
}

impl From<SessionSummary> for SummaryView {
    fn from(s: SessionSummary) -> Self {
        Self {
            session: SessionView {
                id: s.id,
                title: s.title,
                created_at: s.created_at,
                updated_at: s.last_active_at,
                last_active_at: s.last_active_at,
            },
            message_count: s.message_count,
            preview: s.preview,
            last_role: s.last_role.map(ApiRole::from),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub session_id: String,
    pub role: ApiRole,
    pub content: String,
    pub order_index: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<ToolPayload>,
}

impl From<Message> for MessageView {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            session_id: m.session_id,
            role: m.role.into(),
            content: m.content,
            order_index: m.order_index,
            created_at: m.created_at,
            tool_calls: m.tool_calls,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    #[serde(flatten)]
    pub session: SessionView,
    pub messages: Vec<MessageView>,
}

impl From<Conversation> for ConversationView {
    fn from(c: Conversation) -> Self {
        Self {
            session: c.session.into(),
            messages: c.messages.into_iter().map(MessageView::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_uses_api_role_and_flat_fields() {
        let now = Utc::now();
        let summary = SessionSummary {
            id: "s1".into(),
            title: "T".into(),
            created_at: now,
            last_active_at: now,
            message_count: 1,
            preview: Some("hi".into()),
            last_role: Some(Role::Human),
        };
        let v = serde_json::to_value(SummaryView::from(summary)).unwrap();
        assert_eq!(v["id"], "s1");
        assert_eq!(v["messageCount"], 1);
        assert_eq!(v["lastRole"], "user");
        assert_eq!(v["updatedAt"], v["lastActiveAt"]);
    }

    #[test]
    fn message_uses_api_role() {
        let m = NewMessage::assistant("ok").into_message("s1", 3, Utc::now());
        let v = serde_json::to_value(MessageView::from(m)).unwrap();
        assert_eq!(v["role"], "assistant");
        assert_eq!(v["orderIndex"], 3);
        assert!(v.get("toolCalls").is_none());
    }
}
