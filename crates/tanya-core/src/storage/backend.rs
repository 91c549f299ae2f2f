use crate::error::Result;
use crate::model::*;

/// Durable keeper of sessions and their ordered messages.
///
/// Both backends honour the same contract:
/// - `order_index` values within a session are `0..n` with no gaps.
/// - appending a message id that is already stored in the session returns the
///   stored message and changes nothing.
/// - deleting a session removes every message it owns.
/// - operations on a missing session fail with `TanyaError::NotFound`.
pub trait StorageBackend: Send + Sync {
    // -- Sessions --

    /// Create a session; a blank or absent title falls back to the configured default.
    fn create_session(
        &self,
        title: Option<&str>,
    ) -> impl std::future::Future<Output = Result<Session>> + Send;

    fn get_session(&self, id: &str) -> impl std::future::Future<Output = Result<Session>> + Send;

    /// All sessions, most recently active first, with message count and preview.
    fn list_sessions(&self) -> impl std::future::Future<Output = Result<Vec<SessionSummary>>> + Send;

    /// Change the title and move `last_active_at` forward.
    fn rename_session(
        &self,
        id: &str,
        title: &str,
    ) -> impl std::future::Future<Output = Result<Session>> + Send;

    /// Move `last_active_at` forward without other changes.
    fn touch_session(&self, id: &str) -> impl std::future::Future<Output = Result<Session>> + Send;

    /// Remove a session and, in the same operation, all of its messages.
    fn delete_session(&self, id: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    // -- Messages --

    /// Append at the end of the session. Serialised per session.
    fn append_message(
        &self,
        session_id: &str,
        message: NewMessage,
    ) -> impl std::future::Future<Output = Result<Message>> + Send;

    /// Messages in `order_index` order.
    fn list_messages(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Message>>> + Send;

    // -- Bulk --

    /// Write a complete session tree in one step. Used by import, which has
    /// already allocated fresh ids; fails if the session id is taken.
    fn insert_conversation(
        &self,
        conversation: &Conversation,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}
