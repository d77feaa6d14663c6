use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{course, qcm, rag};
use crate::state::AppState;

/// Creates the main application router with all routes and middleware.
///
/// Each feature exposes an OpenAI-style surface under its own prefix:
/// collections are listed as models, and the chat-completions endpoint runs
/// the feature's pipeline.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rag/api/models", get(rag::models))
        .route("/rag/api/chat/completions", post(rag::chat))
        .route("/course/api/models", get(course::models))
        .route("/course/api/chat/completions", post(course::chat))
        .route("/qcm/api/models", get(qcm::models))
        .route("/qcm/api/chat/completions", post(qcm::chat))
        .with_state(state)
        .layer(build_cors_layer())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
