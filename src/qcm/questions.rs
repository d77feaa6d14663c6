//! Phase 1: synthesize the requested number of questions from one broad
//! retrieval over the topic.

use std::sync::OnceLock;

use regex::Regex;

use super::prompts::{question_generator_system_prompt, question_generator_user_prompt};
use super::state::Difficulty;
use super::QcmTools;
use crate::core::errors::ApiError;
use crate::rag::citations::{knowledge_section, sources_from_chunks};
use crate::rag::SourceRef;
use crate::server::sse::EventSink;

/// Parse the "one numbered question per line" output format. Falls back to
/// any line ending with a question mark when numbering is absent.
pub fn parse_questions(response: &str, count: usize) -> Vec<String> {
    static NUMBERED: OnceLock<Regex> = OnceLock::new();
    let numbered = NUMBERED.get_or_init(|| Regex::new(r"^\s*\d+\s*[.)\-]\s*(.+)$").unwrap());

    let mut questions = Vec::new();
    for line in response.lines() {
        let candidate = match numbered.captures(line) {
            Some(caps) => caps[1].trim().to_string(),
            None => {
                let line = line.trim();
                if line.ends_with('?') {
                    line.to_string()
                } else {
                    continue;
                }
            }
        };
        let candidate = candidate
            .trim_matches(|c| c == '"' || c == '\'')
            .trim()
            .to_string();
        if !candidate.is_empty() && !questions.contains(&candidate) {
            questions.push(candidate);
        }
        if questions.len() >= count {
            break;
        }
    }
    questions
}

pub async fn generate_questions(
    tools: &QcmTools,
    sink: &EventSink,
    collection: &str,
    topic: &str,
    difficulty: Difficulty,
    count: usize,
) -> Result<(Vec<String>, Vec<SourceRef>), ApiError> {
    let top_k = tools.settings.qcm.retriever_top_k;
    sink.progress(format!(
        "Phase 1: génération des questions\nRécupération des {top_k} meilleurs extraits...\n"
    ))
    .await?;

    let chunks = tools.retriever.retrieve(collection, topic, top_k, top_k).await?;
    if chunks.is_empty() {
        return Err(ApiError::Internal(format!(
            "aucune source trouvée pour le sujet « {topic} »"
        )));
    }
    let sources = sources_from_chunks(&chunks, 1, &tools.settings.fileserver);
    sink.progress(format!("Sources récupérées: {}\n", sources.len()))
        .await?;

    let context = knowledge_section(&sources);
    let response = tools
        .llm
        .complete(
            &question_generator_system_prompt(topic, count, difficulty),
            &question_generator_user_prompt(topic, count, difficulty, &context),
            &tools.options(),
        )
        .await?;

    let questions = parse_questions(&response, count);
    if questions.is_empty() {
        return Err(ApiError::Internal(
            "le modèle n'a généré aucune question exploitable".to_string(),
        ));
    }
    if questions.len() != count {
        tracing::warn!(
            "Expected {count} questions, parsed {}; continuing",
            questions.len()
        );
    }

    let mut listing = String::from("Questions générées:\n");
    for (i, question) in questions.iter().enumerate() {
        listing.push_str(&format!("  Q{}: {}\n", i + 1, question));
    }
    sink.progress(listing).await?;

    Ok((questions, sources))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numbered_lines() {
        let response = "1. Quelle est la capitale?\n2) Combien de régions?\n3 - Pourquoi?";
        let questions = parse_questions(response, 5);
        assert_eq!(
            questions,
            vec!["Quelle est la capitale?", "Combien de régions?", "Pourquoi?"]
        );
    }

    #[test]
    fn truncates_to_requested_count() {
        let response = "1. Q1?\n2. Q2?\n3. Q3?\n4. Q4?";
        assert_eq!(parse_questions(response, 2).len(), 2);
    }

    #[test]
    fn falls_back_to_question_mark_lines() {
        let response = "Voici les questions:\nQuelle est la norme applicable?\nrien ici";
        let questions = parse_questions(response, 5);
        assert_eq!(questions, vec!["Quelle est la norme applicable?"]);
    }

    #[test]
    fn skips_duplicates_and_empty_lines() {
        let response = "1. Q1?\n\n2. Q1?\n3. Q2?";
        assert_eq!(parse_questions(response, 5), vec!["Q1?", "Q2?"]);
    }

    #[test]
    fn strips_surrounding_quotes() {
        let response = "1. \"Quelle est la règle?\"";
        assert_eq!(parse_questions(response, 5), vec!["Quelle est la règle?"]);
    }
}
