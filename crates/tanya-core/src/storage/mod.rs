mod backend;
mod json;
mod locks;
mod sqlite;

pub use backend::StorageBackend;
pub use json::JsonStorage;
pub use sqlite::SqliteStorage;

use chrono::{DateTime, SubsecRound, Utc};

use crate::config::{self, TanyaConfig};
use crate::error::{Result, TanyaError};
use crate::model::*;

/// Current time at the precision both backends persist (microseconds), so a
/// value read back compares equal to the value written.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Settings a backend needs beyond where its data lives.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Title given to sessions created without one.
    pub default_title: String,
    /// Characters of the latest message kept in a summary preview.
    pub preview_chars: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            default_title: "New Chat".to_string(),
            preview_chars: 100,
        }
    }
}

impl From<&TanyaConfig> for StoreOptions {
    fn from(config: &TanyaConfig) -> Self {
        Self {
            default_title: config.chat.default_title.clone(),
            preview_chars: config.listing.preview_chars,
        }
    }
}

/// Enum wrapper for storage backends. Dispatches to the concrete implementation.
/// Using an enum instead of `Box<dyn StorageBackend>` because the trait uses RPITIT.
pub enum Storage {
    Sqlite(SqliteStorage),
    Json(JsonStorage),
}

impl StorageBackend for Storage {
    async fn create_session(&self, title: Option<&str>) -> Result<Session> {
        match self {
            Storage::Sqlite(s) => s.create_session(title).await,
            Storage::Json(s) => s.create_session(title).await,
        }
    }

    async fn get_session(&self, id: &str) -> Result<Session> {
        match self {
            Storage::Sqlite(s) => s.get_session(id).await,
            Storage::Json(s) => s.get_session(id).await,
        }
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        match self {
            Storage::Sqlite(s) => s.list_sessions().await,
            Storage::Json(s) => s.list_sessions().await,
        }
    }

    async fn rename_session(&self, id: &str, title: &str) -> Result<Session> {
        match self {
            Storage::Sqlite(s) => s.rename_session(id, title).await,
            Storage::Json(s) => s.rename_session(id, title).await,
        }
    }

    async fn touch_session(&self, id: &str) -> Result<Session> {
        match self {
            Storage::Sqlite(s) => s.touch_session(id).await,
            Storage::Json(s) => s.touch_session(id).await,
        }
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        match self {
            Storage::Sqlite(s) => s.delete_session(id).await,
            Storage::Json(s) => s.delete_session(id).await,
        }
    }

    async fn append_message(&self, session_id: &str, message: NewMessage) -> Result<Message> {
        match self {
            Storage::Sqlite(s) => s.append_message(session_id, message).await,
            Storage::Json(s) => s.append_message(session_id, message).await,
        }
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        match self {
            Storage::Sqlite(s) => s.list_messages(session_id).await,
            Storage::Json(s) => s.list_messages(session_id).await,
        }
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        match self {
            Storage::Sqlite(s) => s.insert_conversation(conversation).await,
            Storage::Json(s) => s.insert_conversation(conversation).await,
        }
    }
}

/// What `tanya status` and `/health` report about the open store.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub backend: &'static str,
    pub location: String,
    /// SQLite `user_version`; absent for the JSON store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<i32>,
}

impl Storage {
    pub fn backend_name(&self) -> &'static str {
        match self {
            Storage::Sqlite(_) => "sqlite",
            Storage::Json(_) => "json",
        }
    }

    pub async fn info(&self) -> StorageInfo {
        match self {
            Storage::Sqlite(s) => StorageInfo {
                backend: self.backend_name(),
                location: s.path().display().to_string(),
                schema_version: s.stats().await.ok().map(|(v, _, _)| v),
            },
            Storage::Json(s) => StorageInfo {
                backend: self.backend_name(),
                location: s.root().display().to_string(),
                schema_version: None,
            },
        }
    }
}

/// Create a storage backend from the given configuration.
pub async fn create_backend(config: &TanyaConfig) -> Result<Storage> {
    let options = StoreOptions::from(config);
    match config.storage.backend.as_str() {
        "sqlite" => {
            let path = config::sqlite_path(&config.storage)?;
            let storage = SqliteStorage::open(&path)?.with_options(options);
            Ok(Storage::Sqlite(storage))
        }
        "json" => {
            let root = config::data_dir(&config.storage)?;
            let storage = JsonStorage::open(&root).await?.with_options(options);
            Ok(Storage::Json(storage))
        }
        other => Err(TanyaError::Config(format!(
            "unknown storage backend: {other}"
        ))),
    }
}
