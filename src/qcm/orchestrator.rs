//! QCM pipeline driver. A turn either advances the parameter-collection
//! conversation (replying with the next prompt) or, once confirmed, runs the
//! two-phase generation under its wall-clock budget and streams the result.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use super::answers::{self, QcmItem};
use super::questions;
use super::state::{Difficulty, QcmConversation};
use super::QcmTools;
use crate::core::errors::ApiError;
use crate::core::settings::Settings;
use crate::fileserver::FileserverClient;
use crate::llm::{ChatMessage, LlmService};
use crate::retriever::hybrid::HybridRetriever;
use crate::server::sse::{EventSink, StreamEvent};

#[derive(Clone)]
pub struct QcmOrchestrator {
    tools: Arc<QcmTools>,
    fileserver: Arc<FileserverClient>,
}

impl QcmOrchestrator {
    pub fn new(
        settings: Arc<Settings>,
        retriever: Arc<HybridRetriever>,
        llm: Arc<LlmService>,
        fileserver: Arc<FileserverClient>,
    ) -> Self {
        Self {
            tools: Arc::new(QcmTools {
                settings,
                retriever,
                llm,
            }),
            fileserver,
        }
    }

    /// Handle one conversation turn. The state machine is replayed from the
    /// full message history supplied by the caller; nothing is kept between
    /// requests.
    pub fn stream_qcm(
        &self,
        collection: String,
        messages: Vec<ChatMessage>,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        let tools = self.tools.clone();
        let fileserver = self.fileserver.clone();
        let sink = EventSink::new(
            tx,
            tools.settings.rag.chunk_size,
            Duration::from_millis(tools.settings.rag.chunk_delay_ms),
        );
        let budget = Duration::from_secs(tools.settings.limits.qcm_secs);

        tokio::spawn(async move {
            let conversation = QcmConversation::replay(&messages);

            let outcome = match conversation.prompt() {
                Some(reply) => sink.paced_content(&reply).await.map_err(ApiError::from),
                None => {
                    let topic = conversation.topic.clone().unwrap_or_default();
                    let difficulty = conversation.difficulty.unwrap_or(Difficulty::Medium);
                    let count = conversation.count.unwrap_or(1) as usize;
                    match timeout(
                        budget,
                        generate(&tools, &fileserver, &sink, &collection, &topic, difficulty, count),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => {
                            tracing::error!("QCM generation exceeded its time budget");
                            sink.content("\n\nErreur: le délai de génération du QCM est dépassé.")
                                .await
                                .map_err(ApiError::from)
                        }
                    }
                }
            };

            match outcome {
                Ok(()) | Err(ApiError::ClientGone) => {}
                Err(err) => {
                    tracing::error!("QCM turn failed: {err}");
                    let _ = sink.content(format!("\n\nErreur: {err}")).await;
                }
            }
            sink.done().await;
        });
        rx
    }
}

async fn generate(
    tools: &QcmTools,
    fileserver: &FileserverClient,
    sink: &EventSink,
    collection: &str,
    topic: &str,
    difficulty: Difficulty,
    count: usize,
) -> Result<(), ApiError> {
    sink.progress(format!(
        "Génération du QCM\nSujet: {topic}\nDifficulté: {}\nQuestions: {count}\n",
        difficulty.label_fr()
    ))
    .await?;

    // Phase 1: question synthesis over one broad retrieval.
    let (question_list, _broad_sources) =
        questions::generate_questions(tools, sink, collection, topic, difficulty, count).await?;

    // Phase 2: per-question answers, sequential to keep source numbering
    // aligned with question order.
    sink.progress(format!(
        "Phase 2: génération des réponses et choix\nTraitement de {} questions...\n",
        question_list.len()
    ))
    .await?;

    let mut items: Vec<QcmItem> = Vec::with_capacity(question_list.len());
    for (i, question) in question_list.iter().enumerate() {
        sink.progress(format!("[{}/{}] {question}\n", i + 1, question_list.len()))
            .await?;
        match answers::generate_answer(tools, collection, topic, question, difficulty).await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {
                sink.progress("  Aucune source exploitable, question ignorée\n")
                    .await?;
            }
            Err(ApiError::ClientGone) => return Err(ApiError::ClientGone),
            Err(err) => {
                tracing::warn!("Answer generation failed for '{question}': {err}");
                sink.progress("  Échec de génération, question ignorée\n").await?;
            }
        }
    }

    if items.is_empty() {
        sink.content("Je n'ai pas réussi à générer de questions sur ce sujet.")
            .await?;
        return Ok(());
    }

    let mut markdown = answers::format_qcm_markdown(&items, topic, difficulty);
    let download = answers::format_qcm_download(&items, topic, difficulty);

    // Upload failure degrades to a QCM without a download link.
    sink.progress("Upload du JSON téléchargeable...\n").await?;
    match fileserver.upload_json(&download, topic).await {
        Ok(url) => {
            markdown.push_str(&format!("\n\n---\n\n**[Télécharger le QCM (JSON)]({url})**\n"));
        }
        Err(err) => {
            tracing::warn!("QCM upload failed: {err}");
        }
    }

    sink.progress(format!(
        "Terminé: {}/{count} questions générées\n",
        items.len()
    ))
    .await?;
    sink.paced_content(&markdown).await?;
    Ok(())
}
