//! Provider selection and shared completion helpers.
//!
//! One provider is chosen at startup: cloud when an API key is configured,
//! local otherwise. No runtime type-switching happens on hot paths. The
//! service also owns the JSON-response parsing used by the agent pipelines,
//! including a one-shot LLM repair pass for malformed output.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::ollama::OllamaProvider;
use super::openai::OpenAiProvider;
use super::provider::LlmProvider;
use super::types::{CompletionOptions, LlmDelta};
use crate::core::errors::ApiError;
use crate::core::settings::Settings;

const REPAIR_SYSTEM_PROMPT: &str = "You are a JSON repair specialist. \
Fix the malformed JSON you are given and return ONLY valid, parsable JSON. \
No explanations, no markdown, no code fences. Preserve all content; only fix \
structural and syntax issues.";

#[derive(Clone)]
pub struct LlmService {
    provider: Arc<dyn LlmProvider>,
    model: String,
    complete_deadline: Duration,
}

impl LlmService {
    pub fn from_settings(settings: &Settings) -> Self {
        let (provider, model): (Arc<dyn LlmProvider>, String) = if settings.ollama.use_cloud() {
            let key = settings.ollama.api_key.clone().unwrap_or_default();
            (
                Arc::new(OpenAiProvider::new(settings.ollama.cloud_host.clone(), key)),
                format!("{}-cloud", settings.rag.model),
            )
        } else {
            (
                Arc::new(OllamaProvider::new(settings.ollama.base_url.clone())),
                settings.rag.model.clone(),
            )
        };
        tracing::info!("LLM provider: {} (model {})", provider.name(), model);

        Self {
            provider,
            model,
            complete_deadline: Duration::from_secs(settings.limits.llm_secs),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn complete(
        &self,
        system: &str,
        user: &str,
        options: &CompletionOptions,
    ) -> Result<String, ApiError> {
        match timeout(
            self.complete_deadline,
            self.provider.complete(&self.model, system, user, options),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ApiError::DeadlineExceeded("llm completion".to_string())),
        }
    }

    pub async fn stream(
        &self,
        system: &str,
        user: &str,
        options: &CompletionOptions,
    ) -> Result<mpsc::Receiver<Result<LlmDelta, ApiError>>, ApiError> {
        self.provider.stream(&self.model, system, user, options).await
    }

    /// Complete and parse a JSON answer. On a parse failure the raw output is
    /// sent back through the model once for repair before giving up.
    pub async fn complete_json(
        &self,
        system: &str,
        user: &str,
        options: &CompletionOptions,
        schema_hint: &str,
    ) -> Result<Value, ApiError> {
        let response = self.complete(system, user, options).await?;

        if let Some(value) = extract_json(&response) {
            return Ok(value);
        }
        tracing::warn!("LLM returned malformed JSON; attempting repair");

        let repair_prompt = format!(
            "The following JSON failed to parse.\n\nBROKEN JSON:\n{response}\n\n\
             EXPECTED STRUCTURE:\n{schema_hint}\n\n\
             Fix this JSON and return ONLY the corrected, valid JSON."
        );
        let repaired = self
            .complete(REPAIR_SYSTEM_PROMPT, &repair_prompt, &CompletionOptions::default())
            .await?;

        extract_json(&repaired)
            .ok_or_else(|| ApiError::Internal("LLM produced unparsable JSON".to_string()))
    }
}

/// Pull a JSON object or array out of an LLM response: strip code fences,
/// locate the outermost value boundaries, parse.
pub fn extract_json(response: &str) -> Option<Value> {
    let mut text = response.trim();

    if let Some(stripped) = text.strip_prefix("```json") {
        text = stripped;
    } else if let Some(stripped) = text.strip_prefix("```") {
        text = stripped;
    }
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped;
    }
    let text = text.trim();

    let obj_start = text.find('{');
    let arr_start = text.find('[');
    let (start, end_char) = match (obj_start, arr_start) {
        (Some(o), Some(a)) if o < a => (o, '}'),
        (Some(_), Some(a)) => (a, ']'),
        (Some(o), None) => (o, '}'),
        (None, Some(a)) => (a, ']'),
        (None, None) => return None,
    };
    let end = text.rfind(end_char)?;
    if end < start {
        return None;
    }

    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_plain_object() {
        let value = extract_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn strips_code_fences() {
        let value = extract_json("```json\n{\"a\": 1}\n```").unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn extracts_object_from_surrounding_prose() {
        let value = extract_json("Voici le résultat:\n{\"questions\": [\"q1\"]}\nVoilà.").unwrap();
        assert_eq!(value["questions"][0], "q1");
    }

    #[test]
    fn extracts_array() {
        let value = extract_json(r#"["a", "b"]"#).unwrap();
        assert_eq!(value, json!(["a", "b"]));
    }

    #[test]
    fn prefers_the_earliest_value() {
        let value = extract_json(r#"["a"] and then {"b": 2}"#).unwrap();
        assert_eq!(value, json!(["a"]));
    }

    #[test]
    fn rejects_text_without_json() {
        assert!(extract_json("pas de JSON ici").is_none());
        assert!(extract_json("").is_none());
    }
}
