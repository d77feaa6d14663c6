//! Vector store (kNN) search client.
//!
//! Talks to a Qdrant-style HTTP API: one query endpoint per collection,
//! returning scored points with their payloads.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ChunkPayload, SearchHit};
use crate::core::errors::ApiError;

const MAX_TOP_K: usize = 64;

#[derive(Clone)]
pub struct VectorSearchClient {
    base_url: String,
    client: Client,
}

#[derive(Deserialize)]
struct QueryResponse {
    result: QueryResult,
}

#[derive(Deserialize)]
struct QueryResult {
    #[serde(default)]
    points: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Value,
}

impl VectorSearchClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Nearest-neighbor search over one vector index. Point ids are shared
    /// with the lexical store so fused results can join by equality.
    pub async fn search(
        &self,
        vector_index_id: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>, ApiError> {
        if vector.is_empty() {
            return Ok(Vec::new());
        }
        let top_k = top_k.clamp(1, MAX_TOP_K);

        let url = format!("{}/collections/{}/points/query", self.base_url, vector_index_id);
        let body = json!({
            "query": vector,
            "limit": top_k,
            "with_payload": true,
        });

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
                "Vector search error ({status}): {text}"
            )));
        }

        let payload: QueryResponse = res.json().await.map_err(ApiError::internal)?;

        let hits = payload
            .result
            .points
            .into_iter()
            .filter_map(|pt| {
                let point_id = point_id_string(&pt.id)?;
                let payload: ChunkPayload =
                    serde_json::from_value(pt.payload).unwrap_or_default();
                Some(SearchHit {
                    point_id,
                    payload,
                    score: pt.score,
                })
            })
            .collect();

        Ok(hits)
    }
}

/// Point ids arrive as either strings or integers depending on how the
/// collection was built; normalize to a string join key.
fn point_id_string(id: &Value) -> Option<String> {
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_normalize_to_strings() {
        assert_eq!(point_id_string(&json!("abc")), Some("abc".to_string()));
        assert_eq!(point_id_string(&json!(42)), Some("42".to_string()));
        assert_eq!(point_id_string(&json!("")), None);
        assert_eq!(point_id_string(&json!(null)), None);
    }
}
