use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::{CompletionOptions, LlmDelta};
use crate::core::errors::ApiError;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "ollama", "ollama-cloud")
    fn name(&self) -> &str;

    /// chat completion (non-streaming)
    async fn complete(
        &self,
        model_id: &str,
        system: &str,
        user: &str,
        options: &CompletionOptions,
    ) -> Result<String, ApiError>;

    /// chat completion (streaming). Dropping the receiver aborts the
    /// underlying transfer.
    async fn stream(
        &self,
        model_id: &str,
        system: &str,
        user: &str,
        options: &CompletionOptions,
    ) -> Result<mpsc::Receiver<Result<LlmDelta, ApiError>>, ApiError>;
}
