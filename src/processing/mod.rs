//! Analysis pipeline: chunk planning, generation tiers, field parsing and orchestration.

pub mod chunking;
pub mod fields;
mod service;
pub mod types;

pub use fields::{Prefill, StructuredFields};
pub use service::{
    AnalysisApi, AnalysisPipeline, NO_INFORMATION_SENTENCE, SUMMARY_FILE_NAME, SUMMARY_TITLE,
};
pub use types::{
    AnalysisOutcome, ChunkingError, DocumentReport, PipelineError, SourceDocument,
};
