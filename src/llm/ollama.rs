//! Local Ollama provider (native API, NDJSON streaming).

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::types::{CompletionOptions, LlmDelta};
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct OllamaProvider {
    base_url: String,
    client: Client,
}

impl OllamaProvider {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
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

        let mut opts = serde_json::Map::new();
        if let Some(t) = options.temperature {
            opts.insert("temperature".to_string(), json!(t));
        }
        if let Some(n) = options.max_tokens {
            opts.insert("num_predict".to_string(), json!(n));
        }
        if let Some(stop) = &options.stop {
            opts.insert("stop".to_string(), json!(stop));
        }
        if !opts.is_empty() {
            body["options"] = Value::Object(opts);
        }

        body
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(
        &self,
        model_id: &str,
        system: &str,
        user: &str,
        options: &CompletionOptions,
    ) -> Result<String, ApiError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = Self::request_body(model_id, system, user, options, false);

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!("Ollama chat error: {text}")));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;
        let content = payload["message"]["content"]
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
        let url = format!("{}/api/chat", self.base_url);
        let body = Self::request_body(model_id, system, user, options, true);

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!("Ollama stream error: {text}")));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            // NDJSON frames may split across network chunks; keep a line buffer.
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
                            let Ok(frame) = serde_json::from_str::<Value>(&line) else {
                                continue;
                            };
                            if let Some(thinking) = frame["message"]["thinking"].as_str() {
                                if !thinking.is_empty()
                                    && tx
                                        .send(Ok(LlmDelta::Thinking(thinking.to_string())))
                                        .await
                                        .is_err()
                                {
                                    return;
                                }
                            }
                            if let Some(content) = frame["message"]["content"].as_str() {
                                if !content.is_empty()
                                    && tx
                                        .send(Ok(LlmDelta::Content(content.to_string())))
                                        .await
                                        .is_err()
                                {
                                    return;
                                }
                            }
                            if frame["done"].as_bool() == Some(true) {
                                return;
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
