//! Phase 2: per-question answer and distractor synthesis, plus the output
//! formatting (display markdown and downloadable JSON).
//!
//! `answers[0]` is canonically the correct choice everywhere in memory and
//! in the exported JSON; shuffling happens only when rendering the display
//! markdown.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use serde_json::{json, Value};

use super::prompts::{answer_generator_system_prompt, answer_generator_user_prompt};
use super::state::Difficulty;
use super::QcmTools;
use crate::core::errors::ApiError;
use crate::rag::citations::{knowledge_section, sources_from_chunks};
use crate::rag::SourceRef;

#[derive(Debug, Clone)]
pub struct QcmItem {
    pub question: String,
    /// Index 0 is the correct answer; 1 and 2 are distractors.
    pub answers: [String; 3],
    /// The full supporting chunk, untruncated.
    pub source: SourceRef,
}

/// Generate the answer set for one question. Returns `None` when no context
/// could be retrieved; the question is then skipped.
pub async fn generate_answer(
    tools: &QcmTools,
    collection: &str,
    topic: &str,
    question: &str,
    difficulty: Difficulty,
) -> Result<Option<QcmItem>, ApiError> {
    let top_k = tools.settings.qcm.answer_top_k;
    let chunks = tools
        .retriever
        .retrieve(collection, question, top_k, top_k)
        .await?;
    if chunks.is_empty() {
        return Ok(None);
    }
    let sources = sources_from_chunks(&chunks, 1, &tools.settings.fileserver);
    let context = knowledge_section(&sources);

    let parsed = tools
        .llm
        .complete_json(
            &answer_generator_system_prompt(topic, difficulty),
            &answer_generator_user_prompt(question, difficulty, &context),
            &tools.options(),
            r#"{"right_choice": "...", "wrong_choice_1": "...", "wrong_choice_2": "...", "source_id": 1}"#,
        )
        .await?;

    let field = |name: &str| -> Option<String> {
        parsed
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let (Some(right), Some(wrong1), Some(wrong2)) = (
        field("right_choice"),
        field("wrong_choice_1"),
        field("wrong_choice_2"),
    ) else {
        tracing::warn!("Answer generation missing required fields for '{question}'");
        return Ok(None);
    };

    // The model names the source that best supports the correct answer;
    // default to the top fused result.
    let source = parsed
        .get("source_id")
        .and_then(Value::as_u64)
        .and_then(|id| sources.iter().find(|s| s.id == id as usize))
        .unwrap_or(&sources[0])
        .clone();

    Ok(Some(QcmItem {
        question: question.to_string(),
        answers: [right, wrong1, wrong2],
        source,
    }))
}

/// Display markdown: shuffled choices, collapsible answers, and a sources
/// section numbered in question order.
pub fn format_qcm_markdown(items: &[QcmItem], topic: &str, difficulty: Difficulty) -> String {
    let mut lines = vec![
        format!("# QCM: {topic}"),
        format!("**Difficulté:** {}", difficulty.label_fr()),
        format!("**Nombre de questions:** {}", items.len()),
        String::new(),
        "---".to_string(),
        String::new(),
    ];

    let mut url_to_citation: HashMap<String, usize> = HashMap::new();
    let mut all_sources: Vec<(usize, &SourceRef)> = Vec::new();
    let mut rng = rand::thread_rng();

    for (i, item) in items.iter().enumerate() {
        // Shuffle for display only; the canonical order stays correct-first.
        let mut choices: Vec<(usize, &str)> =
            item.answers.iter().map(String::as_str).enumerate().collect();
        choices.shuffle(&mut rng);
        let correct_letter = (b'A'
            + choices.iter().position(|(orig, _)| *orig == 0).unwrap_or(0) as u8)
            as char;

        lines.push(format!("## Question {}", i + 1));
        lines.push(format!("**{}**", item.question));
        lines.push(String::new());
        for (pos, (_, choice)) in choices.iter().enumerate() {
            lines.push(format!("- **{}.** {choice}", (b'A' + pos as u8) as char));
        }
        lines.push(String::new());
        lines.push("<details><summary>Voir la réponse</summary>".to_string());
        lines.push(String::new());
        lines.push(format!("**Réponse correcte: {correct_letter}**"));
        lines.push(String::new());
        lines.push("**Extrait source:**".to_string());
        lines.push(String::new());
        lines.push(format!("> {}", item.source.text));

        if !item.source.url.is_empty() {
            let next = url_to_citation.len() + 1;
            let citation = *url_to_citation
                .entry(item.source.url.clone())
                .or_insert(next);
            if citation == next {
                all_sources.push((citation, &item.source));
            }
            lines.push(String::new());
            lines.push(format!("Source: [{citation}]({})", item.source.url));
        }
        lines.push("</details>".to_string());
        lines.push(String::new());
        lines.push("---".to_string());
        lines.push(String::new());
    }

    if !all_sources.is_empty() {
        lines.push("## Sources".to_string());
        lines.push(String::new());
        for (number, source) in &all_sources {
            lines.push(format!("- [{number}] [{}]({})", source.title, source.url));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Downloadable JSON payload. Consumers shuffle at render time; index 0 of
/// `ans_list` is always the correct answer.
pub fn format_qcm_download(items: &[QcmItem], topic: &str, difficulty: Difficulty) -> Value {
    let questions: Vec<Value> = items
        .iter()
        .map(|item| {
            json!({
                "question": item.question,
                "ans_list": item.answers,
                "source": {
                    "text": item.source.text,
                    "title": item.source.title,
                    "url": item.source.url,
                },
            })
        })
        .collect();

    json!({
        "metadata": {
            "topic": topic,
            "difficulty": difficulty.as_str(),
            "difficulty_label": difficulty.label_fr(),
            "total_questions": items.len(),
            "note": "Dans ans_list, la premiere reponse (index 0) est toujours la bonne reponse",
        },
        "questions": questions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(question: &str, correct: &str, url: &str) -> QcmItem {
        QcmItem {
            question: question.to_string(),
            answers: [
                correct.to_string(),
                "distracteur 1".to_string(),
                "distracteur 2".to_string(),
            ],
            source: SourceRef {
                id: 1,
                title: "Titre".to_string(),
                url: url.to_string(),
                text: "extrait complet".to_string(),
                section_path: Vec::new(),
            },
        }
    }

    #[test]
    fn download_json_keeps_correct_answer_first() {
        let items = vec![
            item("Q1?", "A1_correct", "http://pub/a"),
            item("Q2?", "A2_correct", "http://pub/b"),
        ];
        let payload = format_qcm_download(&items, "Python", Difficulty::Medium);
        assert_eq!(payload["questions"][0]["ans_list"][0], "A1_correct");
        assert_eq!(payload["questions"][1]["ans_list"][0], "A2_correct");
        assert_eq!(payload["metadata"]["total_questions"], 2);
        assert_eq!(payload["metadata"]["difficulty"], "medium");
    }

    #[test]
    fn download_json_carries_full_source_chunk() {
        let items = vec![item("Q1?", "A1", "http://pub/a")];
        let payload = format_qcm_download(&items, "Python", Difficulty::Easy);
        assert_eq!(payload["questions"][0]["source"]["text"], "extrait complet");
        assert_eq!(payload["questions"][0]["source"]["url"], "http://pub/a");
    }

    #[test]
    fn markdown_contains_all_questions_and_choices() {
        let items = vec![item("Quelle norme?", "La bonne", "http://pub/a")];
        let md = format_qcm_markdown(&items, "BTP", Difficulty::Hard);
        assert!(md.contains("# QCM: BTP"));
        assert!(md.contains("**Quelle norme?**"));
        assert!(md.contains("La bonne"));
        assert!(md.contains("distracteur 1"));
        assert!(md.contains("<details><summary>Voir la réponse</summary>"));
        assert!(md.contains("> extrait complet"));
    }

    #[test]
    fn markdown_sources_are_numbered_in_question_order() {
        let items = vec![
            item("Q1?", "A1", "http://pub/a"),
            item("Q2?", "A2", "http://pub/b"),
            item("Q3?", "A3", "http://pub/a"),
        ];
        let md = format_qcm_markdown(&items, "BTP", Difficulty::Easy);
        assert!(md.contains("- [1] [Titre](http://pub/a)"));
        assert!(md.contains("- [2] [Titre](http://pub/b)"));
        // The duplicated URL reuses citation number 1.
        assert_eq!(md.matches("- [1] [Titre](http://pub/a)").count(), 1);
        assert!(md.contains("Source: [1](http://pub/a)"));
    }

    #[test]
    fn markdown_marks_a_correct_letter() {
        let items = vec![item("Q1?", "A1", "")];
        let md = format_qcm_markdown(&items, "BTP", Difficulty::Easy);
        assert!(
            md.contains("**Réponse correcte: A**")
                || md.contains("**Réponse correcte: B**")
                || md.contains("**Réponse correcte: C**")
        );
    }
}
