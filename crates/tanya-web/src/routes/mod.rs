pub mod chat;
pub mod conversations;
pub mod transfer;
pub mod views;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use tanya_core::storage::StorageBackend;

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .merge(conversations::routes())
        .merge(chat::routes())
        .merge(transfer::routes())
        .fallback(not_found)
}

async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let store_ok = state.storage.list_sessions().await.is_ok();
    let status = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let info = state.storage.info().await;
    (
        status,
        Json(serde_json::json!({
            "status": if store_ok { "ok" } else { "degraded" },
            "storage": info,
        })),
    )
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "no such route" })),
    )
}
