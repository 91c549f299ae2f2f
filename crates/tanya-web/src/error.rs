use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use tanya_core::error::TanyaError;

/// JSON API error type for REST endpoints.
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<TanyaError> for ApiError {
    fn from(err: TanyaError) -> Self {
        match &err {
            TanyaError::NotFound(_) => Self::not_found(err.to_string()),
            TanyaError::Validation(_) => Self::bad_request(err.to_string()),
            _ => {
                // details stay in the log
                tracing::error!("api error: {}", err);
                Self::internal("internal storage error")
            }
        }
    }
}
