//! Course generation pipeline: three agents run in sequence over a shared
//! state, each a free function over `(state, tools)`.

pub mod enhancer;
pub mod orchestrator;
pub mod prompts;
pub mod researcher;
pub mod writer;

pub use orchestrator::CourseOrchestrator;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::core::settings::Settings;
use crate::llm::{CompletionOptions, LlmService};
use crate::rag::citations::sources_from_chunks;
use crate::rag::SourceRef;
use crate::retriever::hybrid::HybridRetriever;
use crate::retriever::RankedChunk;

const AGENT_MAX_TOKENS: u32 = 8000;

/// Everything an agent needs to do its work.
pub struct CourseTools {
    pub settings: Arc<Settings>,
    pub retriever: Arc<HybridRetriever>,
    pub llm: Arc<LlmService>,
}

impl CourseTools {
    pub fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.settings.rag.temperature),
            max_tokens: Some(AGENT_MAX_TOKENS),
            stop: None,
        }
    }
}

/// One enhancer round, for the generation report.
#[derive(Debug, Clone, Serialize)]
pub struct IterationLog {
    pub iteration: usize,
    pub gap_count: usize,
    pub new_chunks: usize,
    pub total_sources: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Chapter {
    pub heading: String,
    pub body_markdown: String,
    pub cited_source_ids: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct CourseDocument {
    pub title: String,
    pub chapters: Vec<Chapter>,
    pub knowledge_base: String,
    pub iteration_logs: Vec<IterationLog>,
    /// The full display document, citations already rewritten.
    pub markdown: String,
}

/// State threaded through the agents: the evolving knowledge base plus the
/// cumulative, stably-numbered source list.
#[derive(Debug, Default)]
pub struct CourseState {
    pub knowledge_base: String,
    pub sources: Vec<SourceRef>,
    pub initial_source_count: usize,
    pub iteration_logs: Vec<IterationLog>,
    seen_points: BTreeSet<String>,
}

impl CourseState {
    /// Absorb retrieved chunks, skipping points already collected. Returns
    /// the newly added sources (numbered after the existing ones).
    pub fn absorb_chunks(
        &mut self,
        chunks: &[RankedChunk],
        settings: &Settings,
    ) -> Vec<SourceRef> {
        let mut fresh: Vec<RankedChunk> = Vec::new();
        for chunk in chunks {
            if self.seen_points.insert(chunk.point_id.clone()) {
                fresh.push(chunk.clone());
            }
        }
        let added = sources_from_chunks(&fresh, self.sources.len() + 1, &settings.fileserver);
        self.sources.extend(added.clone());
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retriever::ChunkPayload;

    fn chunk(point_id: &str) -> RankedChunk {
        RankedChunk {
            point_id: point_id.to_string(),
            payload: ChunkPayload {
                text: format!("texte {point_id}"),
                title: format!("titre {point_id}"),
                ..Default::default()
            },
            bm25_rank: Some(1),
            vector_rank: Some(1),
            fused_score: 0.01,
        }
    }

    #[test]
    fn absorb_skips_already_seen_points() {
        let settings = Settings::default();
        let mut state = CourseState::default();

        let added = state.absorb_chunks(&[chunk("a"), chunk("b")], &settings);
        assert_eq!(added.len(), 2);
        assert_eq!(state.sources.len(), 2);

        let added = state.absorb_chunks(&[chunk("b"), chunk("c")], &settings);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].id, 3);
        assert_eq!(state.sources.len(), 3);

        let added = state.absorb_chunks(&[chunk("a"), chunk("c")], &settings);
        assert!(added.is_empty());
    }

    #[test]
    fn absorbed_sources_are_numbered_cumulatively() {
        let settings = Settings::default();
        let mut state = CourseState::default();
        state.absorb_chunks(&[chunk("a")], &settings);
        let added = state.absorb_chunks(&[chunk("b"), chunk("c")], &settings);
        let ids: Vec<usize> = added.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }
}
