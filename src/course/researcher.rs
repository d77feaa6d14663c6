//! Agent R: gather broad knowledge on the subject through several focused
//! sub-queries, then synthesize a structured knowledge base.

use serde_json::Value;

use super::prompts::{
    knowledge_synthesis_user_prompt, query_generator_user_prompt,
    KNOWLEDGE_SYNTHESIS_SYSTEM_PROMPT, QUERY_GENERATOR_SYSTEM_PROMPT,
};
use super::{CourseState, CourseTools};
use crate::core::errors::ApiError;
use crate::rag::citations::knowledge_section;
use crate::server::sse::EventSink;

const MAX_QUERIES: usize = 6;
const MIN_QUERIES: usize = 3;
const RESEARCH_INITIAL_K: usize = 8;

fn fallback_queries(subject: &str) -> Vec<String> {
    vec![
        subject.to_string(),
        format!("{subject} concepts fondamentaux"),
        format!("{subject} principes"),
        format!("{subject} applications pratiques"),
        format!("{subject} techniques avancées"),
    ]
}

async fn generate_search_queries(
    tools: &CourseTools,
    subject: &str,
) -> Result<Vec<String>, ApiError> {
    let response = tools
        .llm
        .complete_json(
            QUERY_GENERATOR_SYSTEM_PROMPT,
            &query_generator_user_prompt(subject),
            &tools.options(),
            r#"["query 1", "query 2", "query 3"]"#,
        )
        .await;

    let mut queries: Vec<String> = match response {
        Ok(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .filter(|q| !q.trim().is_empty())
            .collect(),
        Ok(_) | Err(_) => {
            tracing::warn!("Search query generation failed; using fallback queries");
            Vec::new()
        }
    };

    if queries.len() < MIN_QUERIES {
        for fallback in fallback_queries(subject) {
            if queries.len() >= MIN_QUERIES {
                break;
            }
            if !queries.contains(&fallback) {
                queries.push(fallback);
            }
        }
    }
    queries.truncate(MAX_QUERIES);
    Ok(queries)
}

pub async fn research(
    tools: &CourseTools,
    sink: &EventSink,
    collection: &str,
    subject: &str,
    state: &mut CourseState,
) -> Result<(), ApiError> {
    sink.progress(format!(
        "Agent 1 : collecte des connaissances sur « {subject} »...\n"
    ))
    .await?;

    let queries = generate_search_queries(tools, subject).await?;
    sink.progress(format!("{} requêtes de recherche générées\n", queries.len()))
        .await?;

    let mut sections = Vec::new();
    for (i, query) in queries.iter().enumerate() {
        sink.progress(format!("Requête {}/{} : {query}\n", i + 1, queries.len()))
            .await?;

        let chunks = match tools
            .retriever
            .retrieve(
                collection,
                query,
                RESEARCH_INITIAL_K,
                tools.settings.course.retriever_top_k,
            )
            .await
        {
            Ok(chunks) => chunks,
            Err(err) => {
                tracing::warn!("Research query '{query}' failed: {err}");
                continue;
            }
        };

        let added = state.absorb_chunks(&chunks, &tools.settings);
        sink.progress(format!("  {} nouvelles sources\n", added.len()))
            .await?;
        if !added.is_empty() {
            sections.push(format!(
                "=== Requête {} : {query} ===\n{}",
                i + 1,
                knowledge_section(&added)
            ));
        }
    }

    if state.sources.is_empty() {
        return Err(ApiError::Internal(
            "no knowledge could be retrieved for this subject".to_string(),
        ));
    }

    sink.progress("Synthèse de la base de connaissances...\n").await?;
    state.knowledge_base = tools
        .llm
        .complete(
            KNOWLEDGE_SYNTHESIS_SYSTEM_PROMPT,
            &knowledge_synthesis_user_prompt(subject, &sections.join("\n\n")),
            &tools.options(),
        )
        .await?;
    state.initial_source_count = state.sources.len();

    sink.progress(format!(
        "Agent 1 terminé : {} sources collectées\n",
        state.sources.len()
    ))
    .await?;
    Ok(())
}
