//! Recording of chat turns: the store-facing half of the chat request handler.
//!
//! A client resends its whole visible history on every turn. [`record_turn`]
//! stores whatever part of that history is new and hands back the session id
//! the client should send next time; [`record_reply`] stores the assistant's
//! answer once it has been generated.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::ChatConfig;
use crate::error::Result;
use crate::model::*;
use crate::storage::StorageBackend;

/// A message as the chat client sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Client-side id. Lets a retried request be recognised.
    #[serde(default)]
    pub id: Option<String>,
    pub role: ApiRole,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Option<ToolPayload>,
}

impl InboundMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: None,
            role: ApiRole::User,
            content: content.into(),
            tool_calls: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ApiRole::Assistant,
            ..Self::user(content)
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    fn to_new_message(&self) -> NewMessage {
        let message = NewMessage::new(self.role.into(), self.content.clone())
            .with_tool_calls(self.tool_calls.clone());
        match &self.id {
            Some(id) => message.with_id(id.clone()),
            None => message,
        }
    }
}

/// The assistant's finished answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    #[serde(default)]
    pub id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Option<ToolPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub session_id: String,
    /// A new session was created for this turn.
    pub created: bool,
    /// Messages newly stored by this turn.
    pub recorded: usize,
}

/// Title for a session started by `inbound`: the first line of the first user
/// message, cut to `max_chars`.
pub fn derive_title(inbound: &[InboundMessage], max_chars: usize) -> Option<String> {
    let first = inbound
        .iter()
        .find(|m| m.role == ApiRole::User && !m.content.trim().is_empty())?;
    let line = first.content.trim().lines().next().unwrap_or_default();
    let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(preview(&collapsed, max_chars))
}

/// Store the new part of a turn's history.
///
/// `session_id` is reused when it names an existing session. When it is absent
/// or unknown, a new session is created; the caller-chosen id is not adopted.
pub async fn record_turn(
    storage: &impl StorageBackend,
    chat: &ChatConfig,
    session_id: Option<&str>,
    inbound: &[InboundMessage],
) -> Result<TurnOutcome> {
    let existing = match session_id {
        Some(id) => match storage.get_session(id).await {
            Ok(session) => Some(session),
            Err(e) if e.is_not_found() => {
                tracing::debug!(session_id = %id, "unknown session id, starting a new session");
                None
            }
            Err(e) => return Err(e),
        },
        None => None,
    };

    let (session, created) = match existing {
        Some(session) => (session, false),
        None => {
            let title = derive_title(inbound, chat.title_chars);
            (storage.create_session(title.as_deref()).await?, true)
        }
    };

    let stored = if created {
        Vec::new()
    } else {
        storage.list_messages(&session.id).await?
    };
    let mut stored_ids: HashSet<String> = stored.iter().map(|m| m.id.clone()).collect();

    let mut recorded = 0;
    for (position, message) in inbound.iter().enumerate() {
        let already = match &message.id {
            Some(id) => stored_ids.contains(id),
            None => position < stored.len(),
        };
        if already {
            continue;
        }
        let appended = storage
            .append_message(&session.id, message.to_new_message())
            .await?;
        // An id stored by a concurrent turn comes back unchanged with an older index.
        if appended.order_index as usize >= stored.len() && stored_ids.insert(appended.id) {
            recorded += 1;
        }
    }

    if recorded == 0 && !created {
        storage.touch_session(&session.id).await?;
    }

    tracing::debug!(
        session_id = %session.id,
        created,
        recorded,
        "recorded chat turn"
    );
    Ok(TurnOutcome {
        session_id: session.id,
        created,
        recorded,
    })
}

/// Append the assistant's reply to `session_id`.
pub async fn record_reply(
    storage: &impl StorageBackend,
    session_id: &str,
    reply: Reply,
) -> Result<Message> {
    let message = NewMessage::assistant(reply.content).with_tool_calls(reply.tool_calls);
    let message = match reply.id {
        Some(id) => message.with_id(id),
        None => message,
    };
    storage.append_message(session_id, message).await
}
