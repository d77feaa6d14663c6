//! QCM (multiple-choice quiz) generation: a conversational parameter
//! collection front, then a two-phase generation pipeline.

pub mod answers;
pub mod orchestrator;
pub mod prompts;
pub mod questions;
pub mod state;

pub use orchestrator::QcmOrchestrator;

use std::sync::Arc;

use crate::core::settings::Settings;
use crate::llm::{CompletionOptions, LlmService};
use crate::retriever::hybrid::HybridRetriever;

const QCM_MAX_TOKENS: u32 = 8000;

pub struct QcmTools {
    pub settings: Arc<Settings>,
    pub retriever: Arc<HybridRetriever>,
    pub llm: Arc<LlmService>,
}

impl QcmTools {
    pub fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.settings.rag.temperature),
            max_tokens: Some(QCM_MAX_TOKENS),
            stop: None,
        }
    }
}
