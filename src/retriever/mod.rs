pub mod bm25;
pub mod embedding;
pub mod hybrid;
pub mod lemmatizer;
pub mod vector;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Chunk metadata stored alongside the indexed text. The same schema is
/// written to both stores by the ingestion pipeline; every field is optional
/// on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkPayload {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub section_path: Vec<String>,
    #[serde(default)]
    pub token_count: u32,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub extra_tags: BTreeMap<String, String>,
}

/// One hit from a single backend, before fusion.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub point_id: String,
    pub payload: ChunkPayload,
    pub score: f32,
}

/// A chunk after rank fusion. Per-backend ranks are absent when the chunk
/// appeared in only one index.
#[derive(Debug, Clone)]
pub struct RankedChunk {
    pub point_id: String,
    pub payload: ChunkPayload,
    pub bm25_rank: Option<usize>,
    pub vector_rank: Option<usize>,
    pub fused_score: f64,
}
