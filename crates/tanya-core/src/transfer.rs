//! Backup and restore of whole conversations as a versioned JSON bundle.
//!
//! The bundle speaks the API role vocabulary (`user` / `assistant`) so it can be
//! read without knowing how a backend labels roles internally.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TanyaError};
use crate::model::*;
use crate::storage::StorageBackend;

/// Bundle format version. Import refuses anything else.
pub const EXPORT_VERSION: &str = "1.0";

pub const EXPORTED_BY: &str = "tanya";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportType {
    All,
    Single,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub export_date: DateTime<Utc>,
    pub version: String,
    pub export_type: ExportType,
    pub conversations: Vec<ExportedConversation>,
    pub total_conversations: usize,
    pub total_messages: usize,
    pub exported_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedConversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<ExportedMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedMessage {
    pub id: String,
    pub role: ApiRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<ToolPayload>,
}

impl From<&Conversation> for ExportedConversation {
    fn from(c: &Conversation) -> Self {
        Self {
            id: c.session.id.clone(),
            title: c.session.title.clone(),
            created_at: c.session.created_at,
            updated_at: c.session.last_active_at,
            messages: c
                .messages
                .iter()
                .map(|m| ExportedMessage {
                    id: m.id.clone(),
                    role: m.role.into(),
                    content: m.content.clone(),
                    timestamp: m.created_at,
                    tool_calls: m.tool_calls.clone(),
                })
                .collect(),
        }
    }
}

impl ExportBundle {
    fn new(export_type: ExportType, conversations: Vec<ExportedConversation>) -> Self {
        let total_messages = conversations.iter().map(|c| c.messages.len()).sum();
        Self {
            export_date: Utc::now(),
            version: EXPORT_VERSION.to_string(),
            export_type,
            total_conversations: conversations.len(),
            total_messages,
            conversations,
            exported_by: EXPORTED_BY.to_string(),
        }
    }
}

/// Outcome of an import. Partial success is normal: failed conversations are
/// listed in `errors` and the rest are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// Conversations written.
    pub imported: usize,
    /// Messages written across all imported conversations.
    pub messages: usize,
    pub errors: Vec<String>,
}

/// Load one session with its messages.
pub async fn load_conversation(
    storage: &impl StorageBackend,
    session_id: &str,
) -> Result<Conversation> {
    let session = storage.get_session(session_id).await?;
    let messages = storage.list_messages(session_id).await?;
    Ok(Conversation { session, messages })
}

/// Every session, oldest first, each with its messages in order.
pub async fn export_all(storage: &impl StorageBackend) -> Result<ExportBundle> {
    let summaries = storage.list_sessions().await?;
    let mut conversations = Vec::with_capacity(summaries.len());
    for summary in &summaries {
        match load_conversation(storage, &summary.id).await {
            Ok(c) => conversations.push(c),
            // deleted between listing and loading
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e),
        }
    }
    conversations.sort_by(|a, b| {
        a.session
            .created_at
            .cmp(&b.session.created_at)
            .then_with(|| a.session.id.cmp(&b.session.id))
    });

    let bundle = ExportBundle::new(
        ExportType::All,
        conversations.iter().map(ExportedConversation::from).collect(),
    );
    tracing::info!(
        conversations = bundle.total_conversations,
        messages = bundle.total_messages,
        "exported all conversations"
    );
    Ok(bundle)
}

/// A single session. Fails with `NotFound` when it does not exist.
pub async fn export_one(storage: &impl StorageBackend, session_id: &str) -> Result<ExportBundle> {
    let conversation = load_conversation(storage, session_id).await?;
    Ok(ExportBundle::new(
        ExportType::Single,
        vec![ExportedConversation::from(&conversation)],
    ))
}

// -- Import --

/// Lenient shape of an incoming conversation. Everything except the message
/// list may be missing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomingConversation {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    messages: Vec<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomingMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    tool_calls: Option<ToolPayload>,
}

/// Check the envelope and return the raw conversation entries.
///
/// Rejects the whole payload when the `conversations` array is missing or the
/// version is not [`EXPORT_VERSION`]; nothing inside is looked at in that case.
pub fn conversations_of(payload: &Value) -> Result<&[Value]> {
    let conversations = payload
        .get("conversations")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            TanyaError::Validation("invalid import format: missing conversations array".into())
        })?;

    match payload.get("version").and_then(Value::as_str) {
        Some(EXPORT_VERSION) => Ok(conversations.as_slice()),
        Some(other) => Err(TanyaError::Validation(format!(
            "unsupported export version: {other}"
        ))),
        None => Err(TanyaError::Validation(
            "unsupported export version: missing".into(),
        )),
    }
}

/// Turn one incoming entry into a conversation with fresh ids.
fn build_conversation(entry: &Value, import_title: &str) -> Result<Conversation> {
    let incoming = IncomingConversation::deserialize(entry)
        .map_err(|e| TanyaError::Validation(e.to_string()))?;

    let now = crate::storage::now();
    let created_at = incoming
        .created_at
        .map(|t| t.trunc_subsecs(6))
        .unwrap_or(now);
    let mut session = Session::new(incoming.title.as_deref(), import_title, created_at);

    let mut messages = Vec::with_capacity(incoming.messages.len());
    for (position, m) in incoming.messages.into_iter().enumerate() {
        let order_index = u32::try_from(position)
            .map_err(|_| TanyaError::Validation("too many messages".into()))?;
        // Unrecognised or missing roles count as human, matching older exports.
        let role = m
            .role
            .as_deref()
            .and_then(Role::parse_any)
            .unwrap_or(Role::Human);
        let timestamp = m.timestamp.map(|t| t.trunc_subsecs(6)).unwrap_or(now);
        messages.push(
            NewMessage::new(role, m.content.unwrap_or_default())
                .with_tool_calls(m.tool_calls)
                .into_message(&session.id, order_index, timestamp),
        );
    }

    let newest = messages.iter().map(|m| m.created_at).max();
    session.last_active_at = incoming
        .updated_at
        .map(|t| t.trunc_subsecs(6))
        .unwrap_or(now)
        .max(newest.unwrap_or(created_at))
        .max(created_at);

    Ok(Conversation { session, messages })
}

/// Import every conversation of an export bundle under new ids.
pub async fn import_bundle(
    storage: &impl StorageBackend,
    payload: &Value,
    import_title: &str,
) -> Result<ImportReport> {
    let entries = conversations_of(payload)?;
    let mut report = ImportReport::default();

    for entry in entries {
        let label = entry
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or("Unknown");

        let outcome = match build_conversation(entry, import_title) {
            Ok(conversation) => storage
                .insert_conversation(&conversation)
                .await
                .map(|()| conversation.messages.len()),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(count) => {
                report.imported += 1;
                report.messages += count;
            }
            Err(e) => {
                tracing::warn!("failed to import conversation {label}: {e}");
                report
                    .errors
                    .push(format!("Failed to import conversation: {label}"));
            }
        }
    }

    tracing::info!(
        imported = report.imported,
        messages = report.messages,
        failed = report.errors.len(),
        "import finished"
    );
    Ok(report)
}

/// Parse JSON text and import it. Text that is not JSON is a validation error.
pub async fn import_json(
    storage: &impl StorageBackend,
    text: &str,
    import_title: &str,
) -> Result<ImportReport> {
    let payload: Value = serde_json::from_str(text)
        .map_err(|e| TanyaError::Validation(format!("import payload is not JSON: {e}")))?;
    import_bundle(storage, &payload, import_title).await
}
