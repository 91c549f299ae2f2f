use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderName, HeaderValue};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use serde::Deserialize;
use tanya_core::chat::{self, InboundMessage, Reply};

use super::views::MessageView;
use crate::error::ApiError;
use crate::AppState;

/// Response header carrying the resolved session id back to the client.
pub const SESSION_HEADER: &str = "x-session-id";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/chat", post(record_turn))
        .route("/api/chat/{id}/reply", post(record_reply))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub messages: Vec<InboundMessage>,
}

async fn record_turn(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let outcome = chat::record_turn(
        &state.storage,
        &state.config.chat,
        req.session_id.as_deref(),
        &req.messages,
    )
    .await?;

    let header = HeaderValue::from_str(&outcome.session_id)
        .map_err(|e| ApiError::internal(format!("invalid session id header: {e}")))?;
    Ok((
        [(HeaderName::from_static(SESSION_HEADER), header)],
        Json(outcome),
    )
        .into_response())
}

async fn record_reply(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(reply): Json<Reply>,
) -> Result<Json<MessageView>, ApiError> {
    let message = chat::record_reply(&state.storage, &id, reply).await?;
    Ok(Json(message.into()))
}
