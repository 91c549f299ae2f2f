use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tanya_core::transfer::{self, ImportReport};

use crate::error::ApiError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/export", get(export))
        .route("/api/import", post(import))
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    #[serde(default)]
    pub conversation: Option<String>,
}

async fn export(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExportParams>,
) -> Result<Response, ApiError> {
    let bundle = match params.conversation.as_deref() {
        Some(id) => transfer::export_one(&state.storage, id).await?,
        None => transfer::export_all(&state.storage).await?,
    };
    let filename = format!(
        "attachment; filename=\"tanya-export-{}.json\"",
        bundle.export_date.format("%Y-%m-%d")
    );
    Ok(([(header::CONTENT_DISPOSITION, filename)], Json(bundle)).into_response())
}

#[derive(Debug, Serialize)]
pub struct ImportCounts {
    pub conversations: usize,
    pub messages: usize,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub success: bool,
    pub imported: ImportCounts,
    pub errors: Option<Vec<String>>,
}

impl From<ImportReport> for ImportResponse {
    fn from(report: ImportReport) -> Self {
        Self {
            success: report.errors.is_empty(),
            imported: ImportCounts {
                conversations: report.imported,
                messages: report.messages,
            },
            errors: (!report.errors.is_empty()).then_some(report.errors),
        }
    }
}

async fn import(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<ImportResponse>, ApiError> {
    let report =
        transfer::import_bundle(&state.storage, &payload, &state.config.chat.import_title).await?;
    Ok(Json(report.into()))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use axum::http::{header, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_export_import_round_trip() {
        let app = test_router();
        send(
            &app,
            "POST",
            "/api/chat",
            Some(json!({ "messages": [
                { "role": "user", "content": "one" },
                { "role": "assistant", "content": "two" }
            ] })),
        )
        .await;

        let resp = send(&app, "GET", "/api/export", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("attachment"));
        let bundle = body_json(resp.into_body()).await;
        assert_eq!(bundle["version"], "1.0");
        assert_eq!(bundle["exportType"], "all");
        assert_eq!(bundle["totalMessages"], 2);

        let fresh = test_router();
        let resp = send(&fresh, "POST", "/api/import", Some(bundle)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp.into_body()).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["imported"]["conversations"], 1);
        assert_eq!(json["imported"]["messages"], 2);
        assert!(json["errors"].is_null());

        let resp = send(&fresh, "GET", "/api/conversations", None).await;
        let list = body_json(resp.into_body()).await;
        assert_eq!(list[0]["messageCount"], 2);
        assert_eq!(list[0]["lastRole"], "assistant");
    }

    #[tokio::test]
    async fn test_export_single_missing_is_404() {
        let app = test_router();
        let resp = send(&app, "GET", "/api/export?conversation=missing", None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_import_rejects_wrong_version() {
        let app = test_router();
        let resp = send(
            &app,
            "POST",
            "/api/import",
            Some(json!({ "version": "0.9", "conversations": [] })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = send(&app, "POST", "/api/import", Some(json!({ "version": "1.0" }))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_import_reports_partial_failure() {
        let app = test_router();
        let resp = send(
            &app,
            "POST",
            "/api/import",
            Some(json!({
                "version": "1.0",
                "conversations": [
                    { "messages": [ { "role": "user", "content": "ok" } ] },
                    { "title": "Bad", "createdAt": "not a date" }
                ]
            })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp.into_body()).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["imported"]["conversations"], 1);
        assert_eq!(json["errors"][0], "Failed to import conversation: Bad");

        let resp = send(&app, "GET", "/api/conversations", None).await;
        let list = body_json(resp.into_body()).await;
        assert_eq!(list[0]["title"], "Imported Chat");
    }
}
