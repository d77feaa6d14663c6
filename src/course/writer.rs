//! Agent W: outline the course, write each chapter body with citations, then
//! assemble the final display document.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use super::prompts::{
    chapter_writer_user_prompt, course_outline_user_prompt, CHAPTER_WRITER_SYSTEM_PROMPT,
    COURSE_OUTLINE_SYSTEM_PROMPT,
};
use super::{Chapter, CourseDocument, CourseState, CourseTools};
use crate::core::errors::ApiError;
use crate::rag::citations::{format_sources, rewrite_citations};
use crate::server::sse::EventSink;

#[derive(Debug, Deserialize)]
struct Outline {
    #[serde(default)]
    course_title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    target_audience: String,
    #[serde(default)]
    chapters: Vec<OutlineChapter>,
}

#[derive(Debug, Deserialize)]
struct OutlineChapter {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

fn fallback_outline(subject: &str) -> Outline {
    Outline {
        course_title: format!("Cours sur {subject}"),
        description: String::new(),
        target_audience: String::new(),
        chapters: vec![OutlineChapter {
            title: "Introduction".to_string(),
            description: format!("Introduction à {subject}"),
        }],
    }
}

/// Source ids cited in a chapter body, unique, in first-use order.
pub fn cited_source_ids(body: &str) -> Vec<usize> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern =
        PATTERN.get_or_init(|| Regex::new(r"(?i)\[\s*source\s+(\d+)\s*\]").unwrap());

    let mut ids = Vec::new();
    for caps in pattern.captures_iter(body) {
        if let Ok(id) = caps[1].parse::<usize>() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

async fn generate_outline(tools: &CourseTools, subject: &str, knowledge: &str) -> Outline {
    let response = tools
        .llm
        .complete_json(
            COURSE_OUTLINE_SYSTEM_PROMPT,
            &course_outline_user_prompt(subject, knowledge),
            &tools.options(),
            r#"{"course_title": "...", "description": "...", "target_audience": "...", "chapters": [{"chapter_number": 1, "title": "...", "description": "..."}]}"#,
        )
        .await;

    match response.map(serde_json::from_value::<Outline>) {
        Ok(Ok(outline)) if !outline.chapters.is_empty() => outline,
        _ => {
            tracing::warn!("Course outline generation failed; using fallback outline");
            fallback_outline(subject)
        }
    }
}

pub async fn write(
    tools: &CourseTools,
    sink: &EventSink,
    subject: &str,
    state: &CourseState,
) -> Result<CourseDocument, ApiError> {
    sink.progress(format!(
        "Agent 3 : rédaction du cours sur « {subject} »...\n"
    ))
    .await?;

    let outline = generate_outline(tools, subject, &state.knowledge_base).await;
    sink.progress(format!("Plan créé : {} chapitres\n", outline.chapters.len()))
        .await?;

    let mut chapters = Vec::with_capacity(outline.chapters.len());
    for (i, spec) in outline.chapters.iter().enumerate() {
        sink.progress(format!("Chapitre {}/{} : {}\n", i + 1, outline.chapters.len(), spec.title))
            .await?;

        let body = tools
            .llm
            .complete(
                CHAPTER_WRITER_SYSTEM_PROMPT,
                &chapter_writer_user_prompt(
                    subject,
                    &state.knowledge_base,
                    &spec.title,
                    &spec.description,
                ),
                &tools.options(),
            )
            .await?;

        chapters.push(Chapter {
            heading: spec.title.clone(),
            cited_source_ids: cited_source_ids(&body),
            body_markdown: body,
        });
    }

    let mut raw = String::new();
    raw.push_str(&format!("# {}\n\n", outline.course_title));
    if !outline.description.is_empty() {
        raw.push_str(&format!("{}\n\n", outline.description));
    }
    if !outline.target_audience.is_empty() {
        raw.push_str(&format!("**Public cible :** {}\n\n", outline.target_audience));
    }
    raw.push_str("---\n");
    for (i, chapter) in chapters.iter().enumerate() {
        raw.push_str(&format!(
            "\n## Chapitre {} : {}\n\n{}\n",
            i + 1,
            chapter.heading,
            chapter.body_markdown
        ));
    }

    let (mut markdown, used) = rewrite_citations(&raw, &state.sources);
    if !used.is_empty() {
        let refs: Vec<_> = used.iter().collect();
        markdown.push_str(&format!("\n\n**Sources**\n{}", format_sources(&refs)));
    }
    markdown.push_str(&format!(
        "\n\n---\n\n**Statistiques de génération :**\n\
         - Nombre total de chapitres : {}\n\
         - Nombre total de sources : {}\n\
         - Sources ajoutées : {}\n",
        chapters.len(),
        state.sources.len(),
        state.sources.len() - state.initial_source_count
    ));

    Ok(CourseDocument {
        title: outline.course_title,
        chapters,
        knowledge_base: state.knowledge_base.clone(),
        iteration_logs: state.iteration_logs.clone(),
        markdown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cited_ids_are_unique_and_ordered_by_first_use() {
        let body = "Intro [SOURCE 3]. Suite [source 1] et [SOURCE 3], fin [ SOURCE 2 ].";
        assert_eq!(cited_source_ids(body), vec![3, 1, 2]);
    }

    #[test]
    fn body_without_citations_yields_empty_list() {
        assert!(cited_source_ids("Aucune citation ici [1](url)").is_empty());
    }
}
