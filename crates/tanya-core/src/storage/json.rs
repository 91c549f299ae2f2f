use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::locks::SessionLocks;
use super::{now, StorageBackend, StoreOptions};
use crate::error::{Result, TanyaError};
use crate::model::*;

const CONVERSATIONS_DIR: &str = "conversations";
const INDEX_FILE: &str = "index.json";

/// Listing index kept next to the conversation files. Holds exactly one
/// summary per conversation file and is rewritten on every store write.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionIndex {
    sessions: Vec<SessionSummary>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

impl SessionIndex {
    fn upsert(&mut self, summary: SessionSummary) {
        match self.sessions.iter_mut().find(|s| s.id == summary.id) {
            Some(slot) => *slot = summary,
            None => self.sessions.push(summary),
        }
    }

    fn remove(&mut self, id: &str) {
        self.sessions.retain(|s| s.id != id);
    }

    fn sort(&mut self) {
        self.sessions.sort_by(|a, b| {
            b.last_active_at
                .cmp(&a.last_active_at)
                .then_with(|| b.id.cmp(&a.id))
        });
    }
}

/// File-per-conversation JSON store.
///
/// Layout under the root directory:
///
/// ```text
/// index.json                 session summaries, most recent first
/// conversations/<id>.json    one session with all of its messages
/// ```
///
/// Writes go to a temporary file that is synced and renamed over the target,
/// so readers see either the old or the new file, never a partial one.
/// Writers to the same conversation are serialised by a per-session mutex;
/// index rewrites are serialised by a store-wide mutex taken after it.
/// If an index rewrite fails after its conversation file changed, the index
/// is dropped and rebuilt from the files on the next read.
pub struct JsonStorage {
    root: PathBuf,
    locks: SessionLocks,
    index_lock: Mutex<()>,
    index_stale: AtomicBool,
    options: StoreOptions,
}

impl JsonStorage {
    /// Open (or create) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(CONVERSATIONS_DIR))
            .await
            .map_err(|e| {
                TanyaError::Storage(format!(
                    "failed to create data directory {}: {e}",
                    root.display()
                ))
            })?;

        tracing::info!(root = %root.display(), "opened JSON conversation store");
        Ok(Self {
            root,
            locks: SessionLocks::default(),
            index_lock: Mutex::new(()),
            index_stale: AtomicBool::new(false),
            options: StoreOptions::default(),
        })
    }

    pub fn with_options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rebuild `index.json` from the conversation files.
    pub async fn rebuild_index(&self) -> Result<usize> {
        let _guard = self.index_lock.lock().await;
        let mut index = self.scan_conversations().await?;
        let count = index.sessions.len();
        self.save_index(&mut index).await?;
        Ok(count)
    }

    // ── paths ──────────────────────────────────────────────────────────

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    /// Path of a conversation file. Ids that could escape the directory are
    /// treated as unknown sessions.
    fn conversation_path(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(TanyaError::session_not_found(id));
        }
        Ok(self.root.join(CONVERSATIONS_DIR).join(format!("{id}.json")))
    }

    // ── conversation files ────────────────────────────────────────────

    async fn read_conversation(&self, id: &str) -> Result<Conversation> {
        let path = self.conversation_path(id)?;
        let bytes = match fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TanyaError::session_not_found(id));
            }
            Err(e) => return Err(e.into()),
        };
        let mut conversation: Conversation = serde_json::from_slice(&bytes).map_err(|e| {
            TanyaError::Storage(format!("corrupt conversation file {}: {e}", path.display()))
        })?;
        sort_messages(&mut conversation.messages);
        Ok(conversation)
    }

    async fn write_conversation(&self, conversation: &Conversation) -> Result<()> {
        let path = self.conversation_path(&conversation.session.id)?;
        let bytes = serde_json::to_vec_pretty(conversation)?;
        write_atomic(&path, &bytes).await
    }

    /// Persist a conversation and refresh its index entry.
    async fn commit(&self, conversation: &Conversation) -> Result<()> {
        self.write_conversation(conversation).await?;
        let summary = SessionSummary::from_messages(
            &conversation.session,
            &conversation.messages,
            self.options.preview_chars,
        );
        self.update_index(|index| index.upsert(summary)).await
    }

    // ── index ──────────────────────────────────────────────────────────

    /// The index on disk, or `None` when it has to be rebuilt.
    async fn load_index(&self) -> Result<Option<SessionIndex>> {
        if self.index_stale.load(Ordering::Acquire) {
            return Ok(None);
        }
        match fs::read(self.index_path()).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(index) => Ok(Some(index)),
                Err(e) => {
                    tracing::warn!("unreadable {INDEX_FILE}, rebuilding: {e}");
                    Ok(None)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_index(&self, index: &mut SessionIndex) -> Result<()> {
        index.sort();
        index.last_updated = Some(now());
        let bytes = serde_json::to_vec_pretty(index)?;
        write_atomic(&self.index_path(), &bytes).await?;
        self.index_stale.store(false, Ordering::Release);
        Ok(())
    }

    /// Load-modify-save under the index mutex. A missing index is rebuilt first.
    async fn update_index<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut SessionIndex),
    {
        let _guard = self.index_lock.lock().await;
        let result = async {
            let mut index = match self.load_index().await? {
                Some(index) => index,
                None => self.scan_conversations().await?,
            };
            f(&mut index);
            self.save_index(&mut index).await
        }
        .await;
        if let Err(e) = &result {
            self.discard_index().await;
            tracing::warn!("failed to update {INDEX_FILE}, it will be rebuilt: {e}");
        }
        result
    }

    /// Stop trusting the index until it is rebuilt.
    async fn discard_index(&self) {
        self.index_stale.store(true, Ordering::Release);
        match fs::remove_file(self.index_path()).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("failed to remove {INDEX_FILE}: {e}"),
        }
    }

    /// Summaries computed from every conversation file on disk.
    async fn scan_conversations(&self) -> Result<SessionIndex> {
        let mut index = SessionIndex::default();
        let mut entries = fs::read_dir(self.root.join(CONVERSATIONS_DIR)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if id.starts_with('.') {
                continue;
            }
            match self.read_conversation(id).await {
                Ok(c) => index.upsert(SessionSummary::from_messages(
                    &c.session,
                    &c.messages,
                    self.options.preview_chars,
                )),
                Err(e) if e.is_not_found() => {}
                Err(e) => tracing::warn!("skipping conversation {id} while indexing: {e}"),
            }
        }
        tracing::info!(sessions = index.sessions.len(), "rebuilt session index");
        Ok(index)
    }
}

/// Write `bytes` to `path` via a synced temporary file and an atomic rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        TanyaError::Storage(format!("path has no parent directory: {}", path.display()))
    })?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TanyaError::Storage(format!("path has no file name: {}", path.display())))?;
    fs::create_dir_all(parent).await?;

    let tmp_path = parent.join(format!(".{file_name}.{}.tmp", uuid::Uuid::now_v7()));
    let mut tmp = fs::File::create(&tmp_path).await?;
    tmp.write_all(bytes).await?;
    tmp.sync_all().await?;
    drop(tmp);

    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }
    Ok(())
}

impl StorageBackend for JsonStorage {
    async fn create_session(&self, title: Option<&str>) -> Result<Session> {
        let session = Session::new(title, &self.options.default_title, now());
        let _guard = self.locks.acquire(&session.id).await;
        let conversation = Conversation {
            session,
            messages: Vec::new(),
        };
        self.commit(&conversation).await?;
        tracing::debug!(session_id = %conversation.session.id, "created session");
        Ok(conversation.session)
    }

    async fn get_session(&self, id: &str) -> Result<Session> {
        Ok(self.read_conversation(id).await?.session)
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let mut index = match self.load_index().await? {
            Some(index) => index,
            None => {
                let _guard = self.index_lock.lock().await;
                let mut index = self.scan_conversations().await?;
                self.save_index(&mut index).await?;
                index
            }
        };
        index.sort();
        Ok(index.sessions)
    }

    async fn rename_session(&self, id: &str, title: &str) -> Result<Session> {
        let _guard = self.locks.acquire(id).await;
        let mut conversation = self.read_conversation(id).await?;
        conversation.session.title = resolve_title(Some(title), &self.options.default_title);
        conversation.session.last_active_at = now();
        self.commit(&conversation).await?;
        Ok(conversation.session)
    }

    async fn touch_session(&self, id: &str) -> Result<Session> {
        let _guard = self.locks.acquire(id).await;
        let mut conversation = self.read_conversation(id).await?;
        conversation.session.last_active_at = now();
        self.commit(&conversation).await?;
        Ok(conversation.session)
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        let _guard = self.locks.acquire(id).await;
        let path = self.conversation_path(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TanyaError::session_not_found(id));
            }
            Err(e) => return Err(e.into()),
        }
        self.update_index(|index| index.remove(id)).await?;
        tracing::debug!(session_id = %id, "deleted session");
        Ok(())
    }

    async fn append_message(&self, session_id: &str, message: NewMessage) -> Result<Message> {
        let _guard = self.locks.acquire(session_id).await;
        let mut conversation = self.read_conversation(session_id).await?;

        if let Some(existing) = conversation.messages.iter().find(|m| m.id == message.id) {
            tracing::debug!(
                session_id = %session_id,
                message_id = %existing.id,
                "message already stored, skipping"
            );
            return Ok(existing.clone());
        }

        let at = now();
        let order_index = u32::try_from(conversation.messages.len())
            .map_err(|_| TanyaError::Storage(format!("session {session_id} is full")))?;
        let stored = message.into_message(session_id, order_index, at);
        conversation.messages.push(stored.clone());
        conversation.session.last_active_at = at;
        self.commit(&conversation).await?;

        tracing::debug!(
            session_id = %session_id,
            message_id = %stored.id,
            order_index = stored.order_index,
            "appended message"
        );
        Ok(stored)
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        Ok(self.read_conversation(session_id).await?.messages)
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        let id = &conversation.session.id;
        let _guard = self.locks.acquire(id).await;
        if fs::try_exists(self.conversation_path(id)?).await? {
            return Err(TanyaError::Storage(format!("session {id} already exists")));
        }
        let mut conversation = conversation.clone();
        sort_messages(&mut conversation.messages);
        self.commit(&conversation).await
    }
}
