//! RAG query engine: context assembly, prompt construction, streaming LLM
//! invocation, and citation rewriting against the fetched sources.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::citations::{
    format_sources, rewrite_citations, sources_from_chunks, CitationRewriter, SourceRef,
};
use super::prompts::{build_knowledge_base, rag_user_prompt, RAG_SYSTEM_PROMPT};
use crate::core::errors::ApiError;
use crate::core::settings::Settings;
use crate::llm::{CompletionOptions, LlmDelta, LlmService};
use crate::retriever::hybrid::HybridRetriever;
use crate::server::sse::{EventSink, StreamEvent};

const RAG_MAX_TOKENS: u32 = 4096;

const NO_CONTEXT_MESSAGE: &str =
    "Je n'ai trouvé aucun contexte pertinent pour cette question dans la collection.";
const SEARCH_UNAVAILABLE_MESSAGE: &str =
    "La recherche documentaire est momentanément indisponible. Veuillez réessayer plus tard.";

#[derive(Clone)]
pub struct RagEngine {
    settings: Arc<Settings>,
    retriever: Arc<HybridRetriever>,
    llm: Arc<LlmService>,
}

impl RagEngine {
    pub fn new(
        settings: Arc<Settings>,
        retriever: Arc<HybridRetriever>,
        llm: Arc<LlmService>,
    ) -> Self {
        Self {
            settings,
            retriever,
            llm,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.settings.rag.temperature),
            max_tokens: Some(RAG_MAX_TOKENS),
            stop: None,
        }
    }

    /// Start a streaming RAG answer. The returned channel yields progress,
    /// content, and exactly one terminal `Done`; dropping it aborts the
    /// in-flight retrieval and LLM calls.
    pub fn stream_rag(
        &self,
        collection: String,
        question: String,
        top_k: usize,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        let sink = EventSink::new(
            tx,
            self.settings.rag.chunk_size,
            Duration::from_millis(self.settings.rag.chunk_delay_ms),
        );
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(err) = engine.run_stream(&collection, &question, top_k, &sink).await {
                match err {
                    ApiError::ClientGone => return,
                    err => {
                        tracing::error!("RAG stream failed: {err}");
                        let _ = sink.content(format!("\n\nErreur: {err}")).await;
                    }
                }
            }
            sink.done().await;
        });
        rx
    }

    async fn run_stream(
        &self,
        collection: &str,
        question: &str,
        top_k: usize,
        sink: &EventSink,
    ) -> Result<(), ApiError> {
        sink.progress("Retrieving context...").await?;

        let chunks = match self
            .retriever
            .retrieve(collection, question, self.settings.retriever.initial_k, top_k)
            .await
        {
            Ok(chunks) => chunks,
            Err(ApiError::RetrievalUnavailable) => {
                sink.content(SEARCH_UNAVAILABLE_MESSAGE).await?;
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if chunks.is_empty() {
            sink.content(NO_CONTEXT_MESSAGE).await?;
            return Ok(());
        }

        let sources = sources_from_chunks(&chunks, 1, &self.settings.fileserver);
        let knowledge_base = build_knowledge_base(&sources);
        let user_prompt = rag_user_prompt(question, &knowledge_base);

        sink.progress("Generating answer...").await?;

        let mut deltas = self
            .llm
            .stream(RAG_SYSTEM_PROMPT, &user_prompt, &self.options())
            .await?;

        let mut rewriter = CitationRewriter::new(&sources);
        while let Some(delta) = deltas.recv().await {
            match delta {
                Ok(LlmDelta::Thinking(text)) => sink.progress(text).await?,
                Ok(LlmDelta::Content(text)) => {
                    let ready = rewriter.push(&text);
                    if !ready.is_empty() {
                        sink.content(ready).await?;
                    }
                }
                Err(err) => {
                    tracing::error!("LLM stream error: {err}");
                    sink.content(format!("\n\nErreur: {err}")).await?;
                    return Ok(());
                }
            }
        }

        let tail = rewriter.finish();
        if !tail.is_empty() {
            sink.content(tail).await?;
        }

        let used = rewriter.used_sources();
        if !used.is_empty() {
            sink.content(format!("\n\n**Sources**\n{}", format_sources(&used)))
                .await?;
        }

        Ok(())
    }

    /// Non-streaming variant: full answer with a trailing sources section.
    pub async fn query_rag(
        &self,
        collection: &str,
        question: &str,
        top_k: usize,
    ) -> Result<(String, Vec<SourceRef>), ApiError> {
        let chunks = self
            .retriever
            .retrieve(collection, question, self.settings.retriever.initial_k, top_k)
            .await?;

        if chunks.is_empty() {
            return Ok((NO_CONTEXT_MESSAGE.to_string(), Vec::new()));
        }

        let sources = sources_from_chunks(&chunks, 1, &self.settings.fileserver);
        let knowledge_base = build_knowledge_base(&sources);
        let user_prompt = rag_user_prompt(question, &knowledge_base);

        let answer = self
            .llm
            .complete(RAG_SYSTEM_PROMPT, &user_prompt, &self.options())
            .await?;

        let (mut rewritten, used) = rewrite_citations(&answer, &sources);
        if !used.is_empty() {
            let refs: Vec<&SourceRef> = used.iter().collect();
            rewritten.push_str(&format!("\n\n**Sources**\n{}", format_sources(&refs)));
        }

        Ok((rewritten, used))
    }
}
