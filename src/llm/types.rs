use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub stop: Option<Vec<String>>,
}

/// One fragment of a streamed completion. `Thinking` carries reasoning text
/// that is surfaced as progress, never as answer content.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmDelta {
    Content(String),
    Thinking(String),
}
