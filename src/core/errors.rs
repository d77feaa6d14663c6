use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
    #[error("search unavailable")]
    RetrievalUnavailable,
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("client disconnected")]
    ClientGone,
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::UnknownCollection(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::RetrievalUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Search unavailable".to_string(),
            ),
            ApiError::DeadlineExceeded(msg) => (StatusCode::GATEWAY_TIMEOUT, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            // Only reachable once the peer has already hung up; the status is never seen.
            ApiError::ClientGone => (StatusCode::INTERNAL_SERVER_ERROR, "Client gone".to_string()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
