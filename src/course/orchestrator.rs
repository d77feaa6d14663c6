//! Course pipeline driver: researcher, then enhancer, then writer, with
//! progress streamed at every transition and a global wall-clock budget.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use super::{enhancer, researcher, writer, CourseState, CourseTools};
use crate::core::errors::ApiError;
use crate::core::settings::Settings;
use crate::llm::LlmService;
use crate::retriever::hybrid::HybridRetriever;
use crate::server::sse::{EventSink, StreamEvent};

#[derive(Clone)]
pub struct CourseOrchestrator {
    tools: Arc<CourseTools>,
}

impl CourseOrchestrator {
    pub fn new(
        settings: Arc<Settings>,
        retriever: Arc<HybridRetriever>,
        llm: Arc<LlmService>,
    ) -> Self {
        Self {
            tools: Arc::new(CourseTools {
                settings,
                retriever,
                llm,
            }),
        }
    }

    /// Run the three-agent pipeline, streaming progress and a final markdown
    /// document. Dropping the receiver cancels everything in flight.
    pub fn stream_course(&self, collection: String, subject: String) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        let tools = self.tools.clone();
        let sink = EventSink::new(
            tx,
            tools.settings.rag.chunk_size,
            Duration::from_millis(tools.settings.rag.chunk_delay_ms),
        );
        let budget = Duration::from_secs(tools.settings.limits.course_secs);

        tokio::spawn(async move {
            let outcome = timeout(budget, run(&tools, &sink, &collection, &subject)).await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(ApiError::ClientGone)) => return,
                Ok(Err(err)) => {
                    tracing::error!("Course generation failed: {err}");
                    let _ = sink.content(format!("\n\nErreur: {err}")).await;
                }
                Err(_) => {
                    tracing::error!("Course generation exceeded its time budget");
                    let _ = sink
                        .content("\n\nErreur: le délai de génération du cours est dépassé.")
                        .await;
                }
            }
            sink.done().await;
        });
        rx
    }
}

async fn run(
    tools: &CourseTools,
    sink: &EventSink,
    collection: &str,
    subject: &str,
) -> Result<(), ApiError> {
    let mut state = CourseState::default();

    researcher::research(tools, sink, collection, subject, &mut state).await?;
    enhancer::enhance(tools, sink, collection, subject, &mut state).await?;
    let document = writer::write(tools, sink, subject, &state).await?;

    sink.paced_content(&document.markdown).await?;
    Ok(())
}
