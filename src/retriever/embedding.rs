//! Client for the external embedding service.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct EmbeddingClient {
    base_url: String,
    model: String,
    client: Client,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    pub fn new(base_url: String, model: String, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Embed a query string. Failures fail the whole vector path.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = json!({ "model": self.model, "prompt": text });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "Embedding error ({status}): {text}"
            )));
        }

        let payload: EmbeddingResponse = res.json().await.map_err(ApiError::internal)?;
        Ok(payload.embedding)
    }
}
