use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::core::settings::{AuthUser, Settings};
use crate::course::CourseOrchestrator;
use crate::fileserver::FileserverClient;
use crate::llm::LlmService;
use crate::qcm::QcmOrchestrator;
use crate::rag::RagEngine;
use crate::retriever::hybrid::HybridRetriever;
use crate::retriever::lemmatizer::Lemmatizer;

/// Global application state shared across all routes.
///
/// Everything here is immutable after startup: the settings value, the
/// resolved auth table, and the clients with their connection pools.
pub struct AppState {
    pub settings: Arc<Settings>,
    pub auth_tokens: HashMap<String, AuthUser>,
    pub rag: RagEngine,
    pub course: CourseOrchestrator,
    pub qcm: QcmOrchestrator,
}

impl AppState {
    /// Build every component. A missing lemma lexicon is fatal: without it
    /// the query vocabulary cannot match the lexical index.
    pub fn initialize(settings: Settings) -> anyhow::Result<Arc<Self>> {
        let settings = Arc::new(settings);
        let auth_tokens = settings.auth_table();

        let lemmatizer = Arc::new(Lemmatizer::load(Path::new(&settings.paths.lemma_lexicon))?);
        let retriever = Arc::new(HybridRetriever::new(settings.clone(), lemmatizer));
        let llm = Arc::new(LlmService::from_settings(&settings));
        let fileserver = Arc::new(FileserverClient::new(settings.fileserver.clone()));

        let rag = RagEngine::new(settings.clone(), retriever.clone(), llm.clone());
        let course = CourseOrchestrator::new(settings.clone(), retriever.clone(), llm.clone());
        let qcm = QcmOrchestrator::new(
            settings.clone(),
            retriever.clone(),
            llm.clone(),
            fileserver,
        );

        Ok(Arc::new(Self {
            settings,
            auth_tokens,
            rag,
            course,
            qcm,
        }))
    }
}
