use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::{models_response, ChatCompletionRequest};
use crate::core::auth::authenticate;
use crate::core::errors::ApiError;
use crate::server::sse::sse_response;
use crate::state::AppState;

pub async fn models(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    authenticate(&headers, &state.auth_tokens)?;
    Ok(models_response(&state.settings))
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response, ApiError> {
    authenticate(&headers, &state.auth_tokens)?;
    state.settings.collection(&request.model)?;

    if !request.stream {
        return Err(ApiError::BadRequest(
            "QCM generation requires stream=true".to_string(),
        ));
    }
    if request.messages.is_empty() {
        return Err(ApiError::BadRequest("No message found".to_string()));
    }

    // The full history drives the conversation state machine.
    let rx = state
        .qcm
        .stream_qcm(request.model.clone(), request.messages);
    let heartbeat = Duration::from_secs(state.settings.limits.heartbeat_secs);
    Ok(sse_response(request.model, rx, heartbeat))
}
