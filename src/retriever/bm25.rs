//! Lexical (BM25) search client.
//!
//! Runs a match query against an Elasticsearch-style index whose `text`
//! field holds the lemmatized chunk text. BM25 parameters (k1=1.2, b=0.75)
//! are configured on the index; the client only submits the query.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ChunkPayload, SearchHit};
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct Bm25SearchClient {
    base_url: String,
    client: Client,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<EsHit>,
}

#[derive(Deserialize)]
struct EsHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: f32,
    #[serde(rename = "_source", default)]
    source: Value,
}

impl Bm25SearchClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Full-text search against one lexical index. The query must already be
    /// lemmatized so its vocabulary matches the indexed field.
    pub async fn search(
        &self,
        lexical_index_id: &str,
        lemmatized_query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, ApiError> {
        if lemmatized_query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/{}/_search", self.base_url, lexical_index_id);
        let body = json!({
            "size": top_k,
            "query": { "match": { "text": lemmatized_query } },
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
                "BM25 search error ({status}): {text}"
            )));
        }

        let payload: SearchResponse = res.json().await.map_err(ApiError::internal)?;

        let hits = payload
            .hits
            .hits
            .into_iter()
            .filter_map(|hit| {
                // The indexer stores the vector-store point id in `doc_id`;
                // fall back to the document id for older indexes.
                let point_id = hit
                    .source
                    .get("doc_id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or(hit.id);
                if point_id.is_empty() {
                    return None;
                }
                let payload: ChunkPayload =
                    serde_json::from_value(hit.source).unwrap_or_default();
                Some(SearchHit {
                    point_id,
                    payload,
                    score: hit.score,
                })
            })
            .collect();

        Ok(hits)
    }
}
