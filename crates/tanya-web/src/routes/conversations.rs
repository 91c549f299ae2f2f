use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tanya_core::model::*;
use tanya_core::storage::StorageBackend;
use tanya_core::transfer;

use super::views::{ConversationView, MessageView, SessionView, SummaryView};
use crate::error::ApiError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/api/conversations/{id}",
            get(get_conversation)
                .patch(rename_conversation)
                .delete(delete_conversation),
        )
        .route(
            "/api/conversations/{id}/messages",
            get(list_messages).post(append_message),
        )
}

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FirstMessage {
    pub role: ApiRole,
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub first_message: Option<FirstMessage>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendMessageRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub role: ApiRole,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Option<ToolPayload>,
}

impl From<AppendMessageRequest> for NewMessage {
    fn from(req: AppendMessageRequest) -> Self {
        let message = NewMessage::new(req.role.into(), req.content).with_tool_calls(req.tool_calls);
        match req.id {
            Some(id) => message.with_id(id),
            None => message,
        }
    }
}

// -- Handlers --

async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<SummaryView>>, ApiError> {
    let summaries = state.storage.list_sessions().await?;
    let summaries = match params.q.as_deref() {
        Some(q) => search_sessions(summaries, q),
        None => summaries,
    };
    Ok(Json(summaries.into_iter().map(SummaryView::from).collect()))
}

async fn create_conversation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.storage.create_session(req.title.as_deref()).await?;

    let session = match req.first_message {
        Some(first) => {
            state
                .storage
                .append_message(&session.id, NewMessage::new(first.role.into(), first.content))
                .await?;
            state.storage.get_session(&session.id).await?
        }
        None => session,
    };

    tracing::info!(session_id = %session.id, "created conversation");
    Ok(Json(session.into()))
}

async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ConversationView>, ApiError> {
    let conversation = transfer::load_conversation(&state.storage, &id).await?;
    Ok(Json(conversation.into()))
}

async fn rename_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.storage.rename_session(&id, &req.title).await?;
    Ok(Json(session.into()))
}

async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.storage.delete_session(&id).await?;
    tracing::info!(session_id = %id, "deleted conversation");
    Ok(Json(serde_json::json!({ "deleted": id })))
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let messages = state.storage.list_messages(&id).await?;
    Ok(Json(messages.into_iter().map(MessageView::from).collect()))
}

async fn append_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AppendMessageRequest>,
) -> Result<Json<MessageView>, ApiError> {
    let message = state.storage.append_message(&id, req.into()).await?;
    Ok(Json(message.into()))
}
