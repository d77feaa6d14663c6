//! Agent E: iteratively identify knowledge gaps and fill them with targeted
//! retrieval, revising the knowledge base each round. Stops after the
//! configured number of iterations or as soon as a round brings nothing new.

use futures_util::future::join_all;
use serde_json::Value;

use super::prompts::{
    gap_identifier_user_prompt, knowledge_integration_user_prompt, GAP_IDENTIFIER_SYSTEM_PROMPT,
    KNOWLEDGE_INTEGRATION_SYSTEM_PROMPT,
};
use super::{CourseState, CourseTools, IterationLog};
use crate::core::errors::ApiError;
use crate::rag::citations::knowledge_section;
use crate::server::sse::EventSink;

const MAX_GAPS_PER_ROUND: usize = 4;

async fn identify_gaps(
    tools: &CourseTools,
    subject: &str,
    knowledge: &str,
) -> Result<Vec<String>, ApiError> {
    let response = tools
        .llm
        .complete_json(
            GAP_IDENTIFIER_SYSTEM_PROMPT,
            &gap_identifier_user_prompt(subject, knowledge),
            &tools.options(),
            r#"["gap 1", "gap 2"]"#,
        )
        .await;

    let mut gaps: Vec<String> = match response {
        Ok(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .filter(|g| !g.trim().is_empty())
            .collect(),
        Ok(_) => Vec::new(),
        Err(err) => {
            tracing::warn!("Gap identification failed: {err}");
            Vec::new()
        }
    };
    gaps.truncate(MAX_GAPS_PER_ROUND);
    Ok(gaps)
}

pub async fn enhance(
    tools: &CourseTools,
    sink: &EventSink,
    collection: &str,
    subject: &str,
    state: &mut CourseState,
) -> Result<(), ApiError> {
    let max_iterations = tools.settings.course.enhancer_iterations;
    sink.progress(format!(
        "Agent 2 : amélioration des connaissances sur « {subject} »...\n"
    ))
    .await?;

    for iteration in 1..=max_iterations {
        sink.progress(format!("Itération {iteration}/{max_iterations}\n"))
            .await?;

        let gaps = identify_gaps(tools, subject, &state.knowledge_base).await?;
        if gaps.is_empty() {
            sink.progress("Aucune lacune significative trouvée\n").await?;
            state.iteration_logs.push(IterationLog {
                iteration,
                gap_count: 0,
                new_chunks: 0,
                total_sources: state.sources.len(),
            });
            break;
        }
        sink.progress(format!("{} lacunes identifiées\n", gaps.len()))
            .await?;

        // Gap queries are independent; retrieve them concurrently.
        let retrievals = join_all(gaps.iter().map(|gap| {
            tools.retriever.retrieve(
                collection,
                gap,
                tools.settings.course.enhancer_top_k,
                tools.settings.course.enhancer_top_k,
            )
        }))
        .await;

        let mut sections = Vec::new();
        let mut new_chunks = 0;
        for (gap, result) in gaps.iter().zip(retrievals) {
            let chunks = match result {
                Ok(chunks) => chunks,
                Err(err) => {
                    tracing::warn!("Gap query '{gap}' failed: {err}");
                    continue;
                }
            };
            let added = state.absorb_chunks(&chunks, &tools.settings);
            new_chunks += added.len();
            if !added.is_empty() {
                sections.push(format!("=== Lacune : {gap} ===\n{}", knowledge_section(&added)));
            }
        }

        if new_chunks == 0 {
            sink.progress("Aucune nouvelle information trouvée\n").await?;
            state.iteration_logs.push(IterationLog {
                iteration,
                gap_count: gaps.len(),
                new_chunks: 0,
                total_sources: state.sources.len(),
            });
            break;
        }

        state.knowledge_base = tools
            .llm
            .complete(
                KNOWLEDGE_INTEGRATION_SYSTEM_PROMPT,
                &knowledge_integration_user_prompt(
                    subject,
                    &state.knowledge_base,
                    &sections.join("\n\n"),
                ),
                &tools.options(),
            )
            .await?;

        sink.progress(format!("{new_chunks} nouvelles sources intégrées\n"))
            .await?;
        state.iteration_logs.push(IterationLog {
            iteration,
            gap_count: gaps.len(),
            new_chunks,
            total_sources: state.sources.len(),
        });
    }

    sink.progress(format!(
        "Agent 2 terminé : {} sources supplémentaires\n",
        state.sources.len() - state.initial_source_count
    ))
    .await?;
    Ok(())
}
