//! Immutable runtime settings.
//!
//! Built once at startup from an optional YAML file, then overridden by
//! environment variables. The collection registry is a separate JSON file
//! mapping collection names to their paired storage identifiers. Nothing in
//! here is mutated after startup; handlers receive the value through
//! `AppState`.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use serde::Deserialize;

use crate::core::errors::ApiError;

/// Storage identifiers backing one user-facing collection.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionPair {
    pub vector_index_id: String,
    pub lexical_index_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub log_dir: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_dir: "./logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub elasticsearch_url: String,
    pub qdrant_url: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            elasticsearch_url: "http://localhost:9200".to_string(),
            qdrant_url: "http://localhost:6333".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    pub base_url: String,
    pub cloud_host: String,
    pub api_key: Option<String>,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            cloud_host: "https://ollama.com".to_string(),
            api_key: None,
        }
    }
}

impl OllamaSettings {
    /// Cloud mode is enabled by the presence of an API key.
    pub fn use_cloud(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileserverSettings {
    pub base_url: String,
    pub public_url: Option<String>,
}

impl Default for FileserverSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7700".to_string(),
            public_url: None,
        }
    }
}

impl FileserverSettings {
    /// Browser-facing base URL; falls back to the internal one.
    pub fn public_base_url(&self) -> &str {
        self.public_url.as_deref().unwrap_or(&self.base_url)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrieverSettings {
    pub initial_k: usize,
    pub final_k: usize,
    pub bm25_weight: f64,
    pub vector_weight: f64,
    pub embed_model: String,
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self {
            initial_k: 8,
            final_k: 5,
            bm25_weight: 0.5,
            vector_weight: 0.5,
            embed_model: "embeddinggemma".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub model: String,
    pub default_top_k: usize,
    pub temperature: f64,
    /// Display pacing for re-chunked document output. Legacy smoothing
    /// behavior, kept as a knob rather than a contract.
    pub chunk_size: usize,
    pub chunk_delay_ms: u64,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            model: "gpt-oss:20b".to_string(),
            default_top_k: 30,
            temperature: 0.7,
            chunk_size: 5,
            chunk_delay_ms: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QcmSettings {
    pub retriever_top_k: usize,
    pub answer_top_k: usize,
}

impl Default for QcmSettings {
    fn default() -> Self {
        Self {
            retriever_top_k: 15,
            answer_top_k: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CourseSettings {
    pub retriever_top_k: usize,
    pub enhancer_iterations: usize,
    pub enhancer_top_k: usize,
}

impl Default for CourseSettings {
    fn default() -> Self {
        Self {
            retriever_top_k: 5,
            enhancer_iterations: 3,
            enhancer_top_k: 5,
        }
    }
}

/// Wall-clock budgets, in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    pub retrieval_secs: u64,
    pub llm_secs: u64,
    pub course_secs: u64,
    pub qcm_secs: u64,
    pub heartbeat_secs: u64,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            retrieval_secs: 10,
            llm_secs: 60,
            course_secs: 600,
            qcm_secs: 300,
            heartbeat_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub lemma_lexicon: String,
    pub collections: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            lemma_lexicon: "lemma_lexicon.json".to_string(),
            collections: "collections.json".to_string(),
        }
    }
}

/// An authenticated caller resolved from a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub ollama: OllamaSettings,
    pub fileserver: FileserverSettings,
    pub retriever: RetrieverSettings,
    pub rag: RagSettings,
    pub qcm: QcmSettings,
    pub course: CourseSettings,
    pub limits: LimitSettings,
    pub paths: PathSettings,
    pub auth_tokens: Option<String>,
    #[serde(skip)]
    pub collections: BTreeMap<String, CollectionPair>,
}

impl Settings {
    /// Load the YAML config file (if any), apply environment overrides, then
    /// read the collection registry.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = env::var("RAG_CONFIG_PATH").unwrap_or_else(|_| "config.yml".to_string());
        let mut settings = match fs::read_to_string(&config_path) {
            Ok(contents) => serde_yaml::from_str::<Settings>(&contents)
                .with_context(|| format!("invalid config file {config_path}"))?,
            Err(_) => Settings::default(),
        };

        settings.apply_env_overrides();

        let registry_path = PathBuf::from(&settings.paths.collections);
        let registry = fs::read_to_string(&registry_path).with_context(|| {
            format!("collection registry not found at {}", registry_path.display())
        })?;
        settings.collections = serde_json::from_str(&registry)
            .with_context(|| format!("invalid collection registry {}", registry_path.display()))?;
        tracing::info!(
            "Loaded {} collection(s): {:?}",
            settings.collections.len(),
            settings.collections.keys().collect::<Vec<_>>()
        );

        if settings.auth_tokens.as_deref().unwrap_or("").is_empty() {
            tracing::warn!(
                "AUTH_TOKENS not set; using the insecure development token. Set it in production."
            );
        }

        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        override_from_env("SERVER_HOST", &mut self.server.host);
        override_from_env("PORT", &mut self.server.port);
        override_from_env("LOG_DIR", &mut self.server.log_dir);
        override_from_env("ELASTICSEARCH_URL", &mut self.database.elasticsearch_url);
        override_from_env("QDRANT_URL", &mut self.database.qdrant_url);
        override_from_env("OLLAMA_BASE_URL", &mut self.ollama.base_url);
        override_from_env("OLLAMA_CLOUD_HOST", &mut self.ollama.cloud_host);
        override_opt_from_env("OLLAMA_API_KEY", &mut self.ollama.api_key);
        override_from_env("FILESERVER_BASE", &mut self.fileserver.base_url);
        override_opt_from_env("FILESERVER_PUBLIC_URL", &mut self.fileserver.public_url);
        override_from_env("RETRIEVER_TOP_K", &mut self.retriever.initial_k);
        override_from_env("RETRIEVER_FINAL_K", &mut self.retriever.final_k);
        override_from_env("BM25_WEIGHT", &mut self.retriever.bm25_weight);
        override_from_env("VECTOR_WEIGHT", &mut self.retriever.vector_weight);
        override_from_env("EMBED_MODEL", &mut self.retriever.embed_model);
        override_from_env("RAG_MODEL", &mut self.rag.model);
        override_from_env("RAG_DEFAULT_TOP_K", &mut self.rag.default_top_k);
        override_from_env("RAG_TEMPERATURE", &mut self.rag.temperature);
        override_from_env("RAG_CHUNK_SIZE", &mut self.rag.chunk_size);
        override_from_env("RAG_CHUNK_DELAY_MS", &mut self.rag.chunk_delay_ms);
        override_from_env("QCM_RETRIEVER_TOP_K", &mut self.qcm.retriever_top_k);
        override_from_env("QCM_ANSWER_TOP_K", &mut self.qcm.answer_top_k);
        override_from_env("COURSE_RETRIEVER_TOP_K", &mut self.course.retriever_top_k);
        override_from_env(
            "COURSE_ENHANCER_ITERATIONS",
            &mut self.course.enhancer_iterations,
        );
        override_from_env("COURSE_ENHANCER_TOP_K", &mut self.course.enhancer_top_k);
        override_from_env("HEARTBEAT_INTERVAL", &mut self.limits.heartbeat_secs);
        override_from_env("LEMMA_LEXICON_PATH", &mut self.paths.lemma_lexicon);
        override_from_env("COLLECTIONS_PATH", &mut self.paths.collections);
        override_opt_from_env("AUTH_TOKENS", &mut self.auth_tokens);
    }

    /// Resolve a collection name to its storage identifiers.
    pub fn collection(&self, name: &str) -> Result<&CollectionPair, ApiError> {
        self.collections.get(name).ok_or_else(|| {
            let available: Vec<&String> = self.collections.keys().collect();
            ApiError::UnknownCollection(format!(
                "Unknown collection '{name}'. Available: {available:?}"
            ))
        })
    }

    /// Parse the `token:user_id:name,...` list into a lookup table.
    pub fn auth_table(&self) -> HashMap<String, AuthUser> {
        let raw = self
            .auth_tokens
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or("dev-token-123:user_1:Developer");

        let mut table = HashMap::new();
        for entry in raw.split(',') {
            let parts: Vec<&str> = entry.trim().split(':').collect();
            if let [token, user_id, name] = parts[..] {
                table.insert(
                    token.to_string(),
                    AuthUser {
                        user_id: user_id.to_string(),
                        name: name.to_string(),
                    },
                );
            }
        }
        table
    }
}

fn override_from_env<T: FromStr>(var: &str, slot: &mut T) {
    if let Ok(raw) = env::var(var) {
        if let Ok(parsed) = raw.parse::<T>() {
            *slot = parsed;
        } else {
            tracing::warn!("Ignoring unparsable value for {var}");
        }
    }
}

fn override_opt_from_env(var: &str, slot: &mut Option<String>) {
    if let Ok(raw) = env::var(var) {
        if !raw.is_empty() {
            *slot = Some(raw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_table_parses_token_entries() {
        let settings = Settings {
            auth_tokens: Some("tok1:u1:Alice,tok2:u2:Bob".to_string()),
            ..Default::default()
        };
        let table = settings.auth_table();
        assert_eq!(table.len(), 2);
        assert_eq!(table["tok1"].user_id, "u1");
        assert_eq!(table["tok2"].name, "Bob");
    }

    #[test]
    fn auth_table_skips_malformed_entries() {
        let settings = Settings {
            auth_tokens: Some("tok1:u1:Alice,broken,tok2:u2".to_string()),
            ..Default::default()
        };
        let table = settings.auth_table();
        assert_eq!(table.len(), 1);
        assert!(table.contains_key("tok1"));
    }

    #[test]
    fn auth_table_falls_back_to_dev_token() {
        let settings = Settings::default();
        let table = settings.auth_table();
        assert_eq!(table["dev-token-123"].user_id, "user_1");
    }

    #[test]
    fn unknown_collection_is_a_typed_error() {
        let settings = Settings::default();
        match settings.collection("nope") {
            Err(ApiError::UnknownCollection(msg)) => assert!(msg.contains("nope")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn cloud_mode_requires_non_empty_key() {
        let mut ollama = OllamaSettings::default();
        assert!(!ollama.use_cloud());
        ollama.api_key = Some(String::new());
        assert!(!ollama.use_cloud());
        ollama.api_key = Some("key".to_string());
        assert!(ollama.use_cloud());
    }
}
