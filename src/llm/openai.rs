//! Cloud provider for OpenAI-compatible chat-completions endpoints
//! (`data: <json>` SSE framing, `reasoning_content` deltas for thinking).

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::types::{CompletionOptions, LlmDelta};
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: Client::new(),
        }
    }

    fn request_body(
        model_id: &str,
        system: &str,
        user: &str,
        options: &CompletionOptions,
        stream: bool,
    ) -> Value {
        let mut body = json!({
            "model": model_id,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "stream": stream,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = options.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(n) = options.max_tokens {
                obj.insert("max_tokens".to_string(), json!(n));
            }
            if let Some(stop) = &options.stop {
                obj.insert("stop".to_string(), json!(stop));
            }
        }

        body
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "ollama-cloud"
    }

    async fn complete(
        &self,
        model_id: &str,
        system: &str,
        user: &str,
        options: &CompletionOptions,
    ) -> Result<String, ApiError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = Self::request_body(model_id, system, user, options, false);

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!("Cloud chat error: {text}")));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(content)
    }

    async fn stream(
        &self,
        model_id: &str,
        system: &str,
        user: &str,
        options: &CompletionOptions,
    ) -> Result<mpsc::Receiver<Result<LlmDelta, ApiError>>, ApiError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = Self::request_body(model_id, system, user, options, true);

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!("Cloud stream error: {text}")));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            // SSE lines may split across network chunks; keep a line buffer.
            let mut pending = String::new();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        pending.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(pos) = pending.find('\n') {
                            let line = pending[..pos].trim().to_string();
                            pending.drain(..=pos);
                            if line.is_empty() {
                                continue;
                            }
                            if line == "data: [DONE]" {
                                return;
                            }
                            let Some(data) = line.strip_prefix("data: ") else {
                                continue;
                            };
                            let Ok(frame) = serde_json::from_str::<Value>(data) else {
                                continue;
                            };
                            let delta = &frame["choices"][0]["delta"];
                            if let Some(thinking) = delta["reasoning_content"].as_str() {
                                if !thinking.is_empty()
                                    && tx
                                        .send(Ok(LlmDelta::Thinking(thinking.to_string())))
                                        .await
                                        .is_err()
                                {
                                    return;
                                }
                            }
                            if let Some(content) = delta["content"].as_str() {
                                if !content.is_empty()
                                    && tx
                                        .send(Ok(LlmDelta::Content(content.to_string())))
                                        .await
                                        .is_err()
                                {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(ApiError::internal(e))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}
