use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Message, Role};

pub const MAX_TITLE_LENGTH: usize = 200;

/// A single conversation thread: the unit of listing, deletion and export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// Moved forward on every append, rename and touch. Sole sort key for listings.
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    /// New session stamped at `now`. A blank title falls back to `default_title`.
    pub fn new(title: Option<&str>, default_title: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            title: resolve_title(title, default_title),
            created_at: now,
            last_active_at: now,
        }
    }
}

/// Listing row for the sidebar: a session plus an aggregate of its messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub message_count: usize,
    /// Truncated content of the most recent message.
    #[serde(default)]
    pub preview: Option<String>,
    #[serde(default)]
    pub last_role: Option<Role>,
}

impl SessionSummary {
    /// Build a summary from a session and its full, ordered message list.
    pub fn from_messages(session: &Session, messages: &[Message], preview_chars: usize) -> Self {
        let last = messages.last();
        Self {
            id: session.id.clone(),
            title: session.title.clone(),
            created_at: session.created_at,
            last_active_at: session.last_active_at,
            message_count: messages.len(),
            preview: last.map(|m| preview(&m.content, preview_chars)),
            last_role: last.map(|m| m.role),
        }
    }
}

/// Allocate a fresh, time-ordered identifier.
pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Trim a caller-supplied title, falling back when it is blank or absent.
pub fn resolve_title(title: Option<&str>, default_title: &str) -> String {
    match title.map(str::trim) {
        Some(t) if !t.is_empty() => truncate_chars(t, MAX_TITLE_LENGTH).to_string(),
        _ => default_title.to_string(),
    }
}

/// Preview text: the first `max_chars` characters, with `...` appended when cut.
pub fn preview(content: &str, max_chars: usize) -> String {
    let cut = truncate_chars(content, max_chars);
    if cut.len() < content.len() {
        format!("{cut}...")
    } else {
        cut.to_string()
    }
}

/// Character-safe prefix of at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Case-insensitive match of `query` against title and preview.
/// An empty query keeps everything.
pub fn search_sessions(summaries: Vec<SessionSummary>, query: &str) -> Vec<SessionSummary> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return summaries;
    }
    summaries
        .into_iter()
        .filter(|s| {
            s.title.to_lowercase().contains(&needle)
                || s
                    .preview
                    .as_deref()
                    .is_some_and(|p| p.to_lowercase().contains(&needle))
        })
        .collect()
}
