use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{now, StorageBackend, StoreOptions};
use crate::error::{Result, TanyaError};
use crate::model::*;

/// SQLite-backed conversation store.
///
/// Uses a single `Connection` behind `Arc<Mutex<>>` so it can be shared
/// across async tasks.  All blocking SQLite calls go through
/// [`with_conn`](Self::with_conn) which runs them on the Tokio blocking
/// thread-pool.  Holding the connection lock for the whole of an append
/// serialises appends; the `UNIQUE (session_id, order_index)` constraint
/// backs that up at the schema level.
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    options: StoreOptions,
}

impl SqliteStorage {
    /// Open (or create) a file-backed SQLite database at `path`.
    ///
    /// Sets WAL journal mode and enables foreign keys, then creates all
    /// tables and indexes if they don't already exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&path)
            .map_err(|e| TanyaError::Storage(format!("failed to open SQLite database: {e}")))?;

        Self::configure_and_init(conn, path)
    }

    /// Open an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            TanyaError::Storage(format!("failed to open in-memory SQLite database: {e}"))
        })?;

        Self::configure_and_init(conn, PathBuf::from(":memory:"))
    }

    pub fn with_options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Return the path this database was opened with (`:memory:` for in-memory).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return `(schema_version, sessions, messages)` for status output.
    pub async fn stats(&self) -> Result<(i32, usize, usize)> {
        self.with_conn(|conn| {
            let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
            let sessions: i64 =
                conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
            let messages: i64 =
                conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
            Ok((version, sessions as usize, messages as usize))
        })
        .await
    }

    // ── helpers ────────────────────────────────────────────────────────

    const SCHEMA_VERSION: i32 = 1;

    /// Shared initialisation: pragmas + table creation.
    fn configure_and_init(conn: Connection, path: PathBuf) -> Result<Self> {
        // WAL mode for better concurrent-read performance.
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|e| TanyaError::Storage(format!("failed to set WAL mode: {e}")))?;

        // Cascade deletes depend on this.
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| TanyaError::Storage(format!("failed to enable foreign keys: {e}")))?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
            options: StoreOptions::default(),
        };

        storage.create_tables()?;
        tracing::info!(path = %storage.path.display(), "opened SQLite conversation store");
        Ok(storage)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| TanyaError::Storage(format!("failed to acquire database lock: {e}")))
    }

    /// Create all tables and indexes (idempotent).
    fn create_tables(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_active_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT NOT NULL,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                role TEXT NOT NULL CHECK (role IN ('human', 'ai')),
                content TEXT NOT NULL,
                order_index INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                tool_calls TEXT,
                PRIMARY KEY (session_id, id),
                UNIQUE (session_id, order_index)
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_last_active ON sessions(last_active_at DESC);
            CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions(created_at);
            ",
        )
        .map_err(|e| TanyaError::Storage(format!("failed to create tables: {e}")))?;

        conn.execute_batch(&format!("PRAGMA user_version = {};", Self::SCHEMA_VERSION))
            .map_err(|e| TanyaError::Storage(format!("failed to set schema version: {e}")))?;

        Ok(())
    }

    /// Run a blocking closure against the SQLite connection on the Tokio
    /// blocking thread-pool.  This is the primary way trait methods
    /// interact with the database.
    pub(crate) async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                TanyaError::Storage(format!("failed to acquire database lock: {e}"))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| TanyaError::Storage(format!("task join error: {e}")))?
    }
}

// ── row mapping ────────────────────────────────────────────────────────

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        title: row.get(1)?,
        created_at: parse_ts(&row.get::<_, String>(2)?)?,
        last_active_at: parse_ts(&row.get::<_, String>(3)?)?,
    })
}

const MESSAGE_COLUMNS: &str = "id, session_id, role, content, order_index, created_at, tool_calls";

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let role_str: String = row.get(2)?;
    let role = Role::from_storage_str(&role_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown role label: {role_str}").into(),
        )
    })?;
    let tool_calls: Option<String> = row.get(6)?;
    let tool_calls = tool_calls
        .map(|s| serde_json::from_str::<ToolPayload>(&s))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Message {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role,
        content: row.get(3)?,
        order_index: row.get(4)?,
        created_at: parse_ts(&row.get::<_, String>(5)?)?,
        tool_calls,
    })
}

fn fetch_session(conn: &Connection, id: &str) -> Result<Session> {
    conn.query_row(
        "SELECT id, title, created_at, last_active_at FROM sessions WHERE id = ?1",
        params![id],
        row_to_session,
    )
    .optional()?
    .ok_or_else(|| TanyaError::session_not_found(id))
}

fn fetch_message(conn: &Connection, session_id: &str, id: &str) -> Result<Option<Message>> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = ?1 AND id = ?2");
    Ok(conn
        .query_row(&sql, params![session_id, id], row_to_message)
        .optional()?)
}

fn insert_message(conn: &Connection, message: &Message) -> Result<()> {
    let tool_calls = message
        .tool_calls
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT INTO messages (id, session_id, role, content, order_index, created_at, tool_calls)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            message.id,
            message.session_id,
            message.role.as_storage_str(),
            message.content,
            message.order_index,
            ts(&message.created_at),
            tool_calls,
        ],
    )?;
    Ok(())
}

fn set_last_active(conn: &Connection, id: &str, at: &DateTime<Utc>) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE sessions SET last_active_at = ?1 WHERE id = ?2",
        params![ts(at), id],
    )?)
}

impl StorageBackend for SqliteStorage {
    async fn create_session(&self, title: Option<&str>) -> Result<Session> {
        let session = Session::new(title, &self.options.default_title, now());
        let row = session.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, title, created_at, last_active_at) VALUES (?1, ?2, ?3, ?4)",
                params![row.id, row.title, ts(&row.created_at), ts(&row.last_active_at)],
            )?;
            Ok(())
        })
        .await?;
        tracing::debug!(session_id = %session.id, "created session");
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<Session> {
        let id = id.to_string();
        self.with_conn(move |conn| fetch_session(conn, &id)).await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        // One extra character tells us whether the preview was cut.
        let preview_chars = self.options.preview_chars;
        let fetch_chars = (preview_chars + 1) as i64;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.title, s.created_at, s.last_active_at,
                        (SELECT COUNT(*) FROM messages m WHERE m.session_id = s.id),
                        (SELECT substr(m.content, 1, ?1) FROM messages m
                          WHERE m.session_id = s.id ORDER BY m.order_index DESC LIMIT 1),
                        (SELECT m.role FROM messages m
                          WHERE m.session_id = s.id ORDER BY m.order_index DESC LIMIT 1)
                 FROM sessions s
                 ORDER BY s.last_active_at DESC, s.id DESC",
            )?;
            let rows = stmt
                .query_map(params![fetch_chars], |row| {
                    let count: i64 = row.get(4)?;
                    let head: Option<String> = row.get(5)?;
                    let role: Option<String> = row.get(6)?;
                    Ok(SessionSummary {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        created_at: parse_ts(&row.get::<_, String>(2)?)?,
                        last_active_at: parse_ts(&row.get::<_, String>(3)?)?,
                        message_count: count as usize,
                        preview: head.map(|h| preview(&h, preview_chars)),
                        last_role: role.as_deref().and_then(Role::from_storage_str),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn rename_session(&self, id: &str, title: &str) -> Result<Session> {
        let id = id.to_string();
        let title = resolve_title(Some(title), &self.options.default_title);
        let at = now();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE sessions SET title = ?1, last_active_at = ?2 WHERE id = ?3",
                params![title, ts(&at), id],
            )?;
            if changed == 0 {
                return Err(TanyaError::session_not_found(&id));
            }
            fetch_session(conn, &id)
        })
        .await
    }

    async fn touch_session(&self, id: &str) -> Result<Session> {
        let id = id.to_string();
        let at = now();
        self.with_conn(move |conn| {
            if set_last_active(conn, &id, &at)? == 0 {
                return Err(TanyaError::session_not_found(&id));
            }
            fetch_session(conn, &id)
        })
        .await
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM messages WHERE session_id = ?1", params![id])?;
            let deleted = tx.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
            if deleted == 0 {
                // dropping `tx` rolls back
                return Err(TanyaError::session_not_found(&id));
            }
            tx.commit()?;
            tracing::debug!(session_id = %id, "deleted session");
            Ok(())
        })
        .await
    }

    async fn append_message(&self, session_id: &str, message: NewMessage) -> Result<Message> {
        let session_id = session_id.to_string();
        let at = now();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            fetch_session(&tx, &session_id)?;

            if let Some(existing) = fetch_message(&tx, &session_id, &message.id)? {
                tracing::debug!(
                    session_id = %session_id,
                    message_id = %existing.id,
                    "message already stored, skipping"
                );
                return Ok(existing);
            }

            let count: u32 = tx.query_row(
                "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )?;
            let stored = message.into_message(&session_id, count, at);
            insert_message(&tx, &stored)?;
            set_last_active(&tx, &session_id, &at)?;
            tx.commit()?;

            tracing::debug!(
                session_id = %session_id,
                message_id = %stored.id,
                order_index = stored.order_index,
                "appended message"
            );
            Ok(stored)
        })
        .await
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            fetch_session(conn, &session_id)?;
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = ?1
                 ORDER BY order_index ASC, created_at ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let messages = stmt
                .query_map(params![session_id], row_to_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        let conversation = conversation.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let s = &conversation.session;
            tx.execute(
                "INSERT INTO sessions (id, title, created_at, last_active_at) VALUES (?1, ?2, ?3, ?4)",
                params![s.id, s.title, ts(&s.created_at), ts(&s.last_active_at)],
            )?;
            for message in &conversation.messages {
                insert_message(&tx, message)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
