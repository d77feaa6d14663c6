pub mod course;
pub mod qcm;
pub mod rag;

use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::core::settings::Settings;
use crate::llm::ChatMessage;

/// The `top_k` ceiling accepted from callers.
const MAX_TOP_K: usize = 100;

/// OpenAI-style chat-completions request. `model` names a collection.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub top_k: Option<i64>,
}

/// The collections, presented as OpenAI model objects.
pub fn models_response(settings: &Settings) -> Json<Value> {
    let created = chrono::Utc::now().timestamp();
    let data: Vec<Value> = settings
        .collections
        .keys()
        .map(|name| {
            json!({
                "id": name,
                "object": "model",
                "created": created,
                "owned_by": "custom",
            })
        })
        .collect();
    Json(json!({ "object": "list", "data": data }))
}

/// The query is the last `user` message of the conversation.
pub fn last_user_message(messages: &[ChatMessage]) -> Result<String, ApiError> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
        .ok_or_else(|| ApiError::BadRequest("No user message found".to_string()))
}

/// Validate and clamp a caller-supplied `top_k`. Zero and negatives are
/// malformed; large values clamp to the ceiling.
pub fn validate_top_k(requested: Option<i64>, default: usize) -> Result<usize, ApiError> {
    match requested {
        None => Ok(default.clamp(1, MAX_TOP_K)),
        Some(k) if k <= 0 => Err(ApiError::BadRequest(format!("invalid top_k: {k}"))),
        Some(k) => Ok((k as usize).min(MAX_TOP_K)),
    }
}

/// Non-streaming chat.completion envelope.
pub fn completion_response(model: &str, question: &str, answer: &str) -> Json<Value> {
    let prompt_tokens = question.split_whitespace().count();
    let completion_tokens = answer.split_whitespace().count();
    Json(json!({
        "id": format!("chatcmpl-{}", &uuid::Uuid::new_v4().simple().to_string()[..12]),
        "object": "chat.completion",
        "created": chrono::Utc::now().timestamp(),
        "model": model,
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": answer },
            "finish_reason": "stop",
        }],
        "usage": {
            "prompt_tokens": prompt_tokens,
            "completion_tokens": completion_tokens,
            "total_tokens": prompt_tokens + completion_tokens,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(role: &str, content: &str) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn top_k_zero_is_malformed() {
        assert!(matches!(
            validate_top_k(Some(0), 5),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            validate_top_k(Some(-3), 5),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn top_k_clamps_to_ceiling() {
        assert_eq!(validate_top_k(Some(1000), 5).unwrap(), 100);
        assert_eq!(validate_top_k(Some(7), 5).unwrap(), 7);
        assert_eq!(validate_top_k(None, 30).unwrap(), 30);
    }

    #[test]
    fn last_user_message_wins_over_earlier_ones() {
        let messages = vec![
            message("user", "première"),
            message("system", "règles"),
            message("user", "dernière"),
        ];
        assert_eq!(last_user_message(&messages).unwrap(), "dernière");
    }

    #[test]
    fn missing_user_message_is_malformed() {
        let messages = vec![message("system", "règles")];
        assert!(matches!(
            last_user_message(&messages),
            Err(ApiError::BadRequest(_))
        ));
    }
}
