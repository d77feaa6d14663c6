pub mod citations;
pub mod engine;
pub mod prompts;

pub use citations::{CitationRewriter, SourceRef};
pub use engine::RagEngine;
