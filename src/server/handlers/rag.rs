use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::{
    completion_response, last_user_message, models_response, validate_top_k, ChatCompletionRequest,
};
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

    let question = last_user_message(&request.messages)?;
    let top_k = validate_top_k(request.top_k, state.settings.rag.default_top_k)?;

    if request.stream {
        let rx = state
            .rag
            .stream_rag(request.model.clone(), question, top_k);
        let heartbeat = Duration::from_secs(state.settings.limits.heartbeat_secs);
        Ok(sse_response(request.model, rx, heartbeat))
    } else {
        let (answer, _sources) = state.rag.query_rag(&request.model, &question, top_k).await?;
        Ok(completion_response(&request.model, &question, &answer).into_response())
    }
}
