//! Hybrid retrieval: dual-index fan-out fused by Reciprocal Rank Fusion.
//!
//! The vector and lexical backends are queried concurrently under a shared
//! deadline. Each backend's ordered hits get 1-based ranks; per point the
//! fused score is
//!
//! ```text
//! score(p) = w_bm25 * 1/(rank_bm25(p) + 60) + w_vector * 1/(rank_vector(p) + 60)
//! ```
//!
//! with a missing rank contributing 0. The constant 60 is the standard RRF
//! smoothing value (Cormack et al., 2009). If exactly one backend fails the
//! other's ranking is used alone; if both fail the retrieval is unavailable.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use super::bm25::Bm25SearchClient;
use super::embedding::EmbeddingClient;
use super::lemmatizer::Lemmatizer;
use super::vector::VectorSearchClient;
use super::{ChunkPayload, RankedChunk, SearchHit};
use crate::core::errors::ApiError;
use crate::core::settings::Settings;

const RRF_K: f64 = 60.0;

#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub bm25: f64,
    pub vector: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            bm25: 0.5,
            vector: 0.5,
        }
    }
}

pub struct HybridRetriever {
    settings: Arc<Settings>,
    lemmatizer: Arc<Lemmatizer>,
    embedding: EmbeddingClient,
    vector: VectorSearchClient,
    bm25: Bm25SearchClient,
    weights: FusionWeights,
    deadline: Duration,
}

impl HybridRetriever {
    pub fn new(settings: Arc<Settings>, lemmatizer: Arc<Lemmatizer>) -> Self {
        let deadline = Duration::from_secs(settings.limits.retrieval_secs);
        Self {
            embedding: EmbeddingClient::new(
                settings.ollama.base_url.clone(),
                settings.retriever.embed_model.clone(),
                deadline,
            ),
            vector: VectorSearchClient::new(settings.database.qdrant_url.clone(), deadline),
            bm25: Bm25SearchClient::new(settings.database.elasticsearch_url.clone(), deadline),
            weights: FusionWeights {
                bm25: settings.retriever.bm25_weight,
                vector: settings.retriever.vector_weight,
            },
            deadline,
            settings,
            lemmatizer,
        }
    }

    /// Retrieve up to `final_k` fused chunks for a query against a named
    /// collection. `initial_k` bounds each backend's candidate list.
    pub async fn retrieve(
        &self,
        collection_name: &str,
        query_text: &str,
        initial_k: usize,
        final_k: usize,
    ) -> Result<Vec<RankedChunk>, ApiError> {
        let pair = self.settings.collection(collection_name)?.clone();

        if query_text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let vector_path = async {
            let vector = self.embedding.embed(query_text).await?;
            self.vector
                .search(&pair.vector_index_id, &vector, initial_k)
                .await
        };
        let lexical_path = async {
            let lemmatized = self.lemmatizer.lemmatize(query_text);
            self.bm25
                .search(&pair.lexical_index_id, &lemmatized, initial_k)
                .await
        };

        let (vector_res, bm25_res) = tokio::join!(
            timeout(self.deadline, vector_path),
            timeout(self.deadline, lexical_path),
        );
        let vector_res = flatten_deadline(vector_res, "vector search");
        let bm25_res = flatten_deadline(bm25_res, "bm25 search");

        let (bm25_hits, vector_hits) = match (bm25_res, vector_res) {
            (Ok(b), Ok(v)) => (b, v),
            (Ok(b), Err(err)) => {
                tracing::warn!("Vector backend failed, proceeding with BM25 only: {err}");
                (b, Vec::new())
            }
            (Err(err), Ok(v)) => {
                tracing::warn!("BM25 backend failed, proceeding with vector only: {err}");
                (Vec::new(), v)
            }
            (Err(bm25_err), Err(vector_err)) => {
                tracing::error!(
                    "Both retrieval backends failed: bm25: {bm25_err}; vector: {vector_err}"
                );
                return Err(ApiError::RetrievalUnavailable);
            }
        };

        Ok(fuse(&bm25_hits, &vector_hits, self.weights, final_k))
    }
}

fn flatten_deadline<T>(
    res: Result<Result<T, ApiError>, tokio::time::error::Elapsed>,
    what: &str,
) -> Result<T, ApiError> {
    match res {
        Ok(inner) => inner,
        Err(_) => Err(ApiError::DeadlineExceeded(what.to_string())),
    }
}

struct FusionEntry {
    bm25_rank: Option<usize>,
    vector_rank: Option<usize>,
    payload: Option<ChunkPayload>,
}

/// Fuse two ordered hit lists. Pure and deterministic: ties break by smaller
/// min(rank_bm25, rank_vector), then lexicographic point id. The vector
/// payload is preferred when a point appears in both lists.
pub fn fuse(
    bm25_hits: &[SearchHit],
    vector_hits: &[SearchHit],
    weights: FusionWeights,
    final_k: usize,
) -> Vec<RankedChunk> {
    let mut entries: BTreeMap<&str, FusionEntry> = BTreeMap::new();

    for (i, hit) in vector_hits.iter().enumerate() {
        if hit.point_id.is_empty() {
            continue;
        }
        let entry = entries.entry(&hit.point_id).or_insert(FusionEntry {
            bm25_rank: None,
            vector_rank: None,
            payload: None,
        });
        if entry.vector_rank.is_none() {
            entry.vector_rank = Some(i + 1);
            entry.payload = Some(hit.payload.clone());
        }
    }

    for (i, hit) in bm25_hits.iter().enumerate() {
        if hit.point_id.is_empty() {
            continue;
        }
        let entry = entries.entry(&hit.point_id).or_insert(FusionEntry {
            bm25_rank: None,
            vector_rank: None,
            payload: None,
        });
        if entry.bm25_rank.is_none() {
            entry.bm25_rank = Some(i + 1);
            if entry.payload.is_none() {
                entry.payload = Some(hit.payload.clone());
            }
        }
    }

    let rank_term = |rank: Option<usize>| -> f64 {
        rank.map(|r| 1.0 / (r as f64 + RRF_K)).unwrap_or(0.0)
    };

    let mut fused: Vec<RankedChunk> = entries
        .into_iter()
        .map(|(point_id, entry)| RankedChunk {
            point_id: point_id.to_string(),
            fused_score: weights.bm25 * rank_term(entry.bm25_rank)
                + weights.vector * rank_term(entry.vector_rank),
            payload: entry.payload.clone().unwrap_or_default(),
            bm25_rank: entry.bm25_rank,
            vector_rank: entry.vector_rank,
        })
        .collect();

    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| min_rank(a).cmp(&min_rank(b)))
            .then_with(|| a.point_id.cmp(&b.point_id))
    });
    fused.truncate(final_k);
    fused
}

fn min_rank(chunk: &RankedChunk) -> usize {
    chunk
        .bm25_rank
        .unwrap_or(usize::MAX)
        .min(chunk.vector_rank.unwrap_or(usize::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str) -> SearchHit {
        SearchHit {
            point_id: id.to_string(),
            payload: ChunkPayload {
                text: format!("text for {id}"),
                title: format!("title {id}"),
                ..Default::default()
            },
            score: 1.0,
        }
    }

    fn hits(ids: &[&str]) -> Vec<SearchHit> {
        ids.iter().map(|id| hit(id)).collect()
    }

    #[test]
    fn fuses_in_expected_order() {
        // Vector [A, B, C], BM25 [B, D, A], equal weights: B outranks A
        // (ranks 1+2 vs 1+3), then D (bm25 rank 2 only), then C.
        let fused = fuse(&hits(&["B", "D", "A"]), &hits(&["A", "B", "C"]), FusionWeights::default(), 10);
        let order: Vec<&str> = fused.iter().map(|c| c.point_id.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "D", "C"]);

        let top3 = fuse(&hits(&["B", "D", "A"]), &hits(&["A", "B", "C"]), FusionWeights::default(), 3);
        let order: Vec<&str> = top3.iter().map(|c| c.point_id.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "D"]);
    }

    #[test]
    fn scores_use_one_based_ranks() {
        let fused = fuse(&hits(&["A"]), &hits(&["A"]), FusionWeights::default(), 10);
        let expected = 0.5 / 61.0 + 0.5 / 61.0;
        assert!((fused[0].fused_score - expected).abs() < 1e-12);
        assert_eq!(fused[0].bm25_rank, Some(1));
        assert_eq!(fused[0].vector_rank, Some(1));
    }

    #[test]
    fn pure_bm25_weight_reproduces_bm25_order() {
        let weights = FusionWeights { bm25: 1.0, vector: 0.0 };
        let fused = fuse(&hits(&["X", "Y", "Z"]), &hits(&["Z", "Y", "X"]), weights, 3);
        let order: Vec<&str> = fused.iter().map(|c| c.point_id.as_str()).collect();
        assert_eq!(order, vec!["X", "Y", "Z"]);
    }

    #[test]
    fn pure_vector_weight_reproduces_vector_order() {
        let weights = FusionWeights { bm25: 0.0, vector: 1.0 };
        let fused = fuse(&hits(&["X", "Y", "Z"]), &hits(&["Z", "Y", "X"]), weights, 3);
        let order: Vec<&str> = fused.iter().map(|c| c.point_id.as_str()).collect();
        assert_eq!(order, vec!["Z", "Y", "X"]);
    }

    #[test]
    fn no_duplicate_point_ids_and_bounded_length() {
        let fused = fuse(&hits(&["A", "B", "A"]), &hits(&["B", "A"]), FusionWeights::default(), 1);
        assert_eq!(fused.len(), 1);

        let fused = fuse(&hits(&["A", "B", "A"]), &hits(&["B", "A"]), FusionWeights::default(), 10);
        let mut ids: Vec<&str> = fused.iter().map(|c| c.point_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), fused.len());
    }

    #[test]
    fn ties_break_by_min_rank_then_point_id() {
        // A only in bm25 at rank 1, B only in vector at rank 1: equal scores
        // with equal weights, equal min rank, so lexicographic order wins.
        let fused = fuse(&hits(&["A"]), &hits(&["B"]), FusionWeights::default(), 10);
        let order: Vec<&str> = fused.iter().map(|c| c.point_id.as_str()).collect();
        assert_eq!(order, vec!["A", "B"]);
    }

    #[test]
    fn empty_inputs_fuse_to_empty() {
        assert!(fuse(&[], &[], FusionWeights::default(), 5).is_empty());
    }

    #[test]
    fn single_backend_results_keep_their_order() {
        let fused = fuse(&[], &hits(&["C", "A", "B"]), FusionWeights::default(), 10);
        let order: Vec<&str> = fused.iter().map(|c| c.point_id.as_str()).collect();
        assert_eq!(order, vec!["C", "A", "B"]);
        assert!(fused.iter().all(|c| c.bm25_rank.is_none()));
    }

    #[test]
    fn prefers_vector_payload_on_overlap() {
        let mut bm25_hit = hit("A");
        bm25_hit.payload.title = "lexical title".to_string();
        let mut vector_hit = hit("A");
        vector_hit.payload.title = "vector title".to_string();
        let fused = fuse(&[bm25_hit], &[vector_hit], FusionWeights::default(), 10);
        assert_eq!(fused[0].payload.title, "vector title");
    }

    #[test]
    fn fusion_is_deterministic() {
        let b = hits(&["B", "D", "A"]);
        let v = hits(&["A", "B", "C"]);
        let first = fuse(&b, &v, FusionWeights::default(), 10);
        let second = fuse(&b, &v, FusionWeights::default(), 10);
        let ids = |r: &[RankedChunk]| r.iter().map(|c| c.point_id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
    }
}
