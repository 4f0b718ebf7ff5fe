//! Core data types and error definitions for the analysis pipeline.

use std::path::PathBuf;

use anyhow::Error as TokenizerError;
use serde::Serialize;
use thiserror::Error;

use super::fields::{Prefill, StructuredFields};
use crate::extraction::ExtractionError;
use crate::llm::LlmError;
use crate::render::RenderError;

/// Errors produced while preparing token budgets.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Model or encoding name we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Errors that abort an analysis run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No document was supplied.
    #[error("Aucun PDF uploadé")]
    NoDocuments,
    /// A document could not be turned into text.
    #[error("{0}")]
    Extraction(#[from] ExtractionError),
    /// The final synthesis call failed; no PDF is written.
    #[error("synthèse finale impossible: {0}")]
    FinalSynthesis(#[source] LlmError),
    /// The summary PDF could not be written.
    #[error("{0}")]
    Render(#[from] RenderError),
    /// The output directory could not be prepared.
    #[error("failed to prepare output directory {path}: {source}")]
    OutputDir {
        /// Directory that failed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A document submitted for analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Display name (sanitized upload file name).
    pub name: String,
    /// Location of the PDF on disk.
    pub path: PathBuf,
}

/// Per-document statistics gathered during a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentReport {
    /// Document name.
    pub name: String,
    /// Pages extracted.
    pub pages: usize,
    /// Pages whose text came from OCR.
    pub ocr_pages: usize,
    /// OCR pages kept from the high-resolution retry.
    pub ocr_retries: usize,
    /// Pages whose embedded text was read by `pdftotext` after `pdf-extract` found none.
    pub pdftotext_pages: usize,
    /// Chunks sent to the model.
    pub chunks: usize,
    /// Chunk calls that returned text.
    pub chunk_outputs: usize,
    /// Whether the document contributed a summary.
    pub summarized: bool,
}

/// Result of a completed analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    /// Final Markdown summary, without the structured-field block.
    pub summary_markdown: String,
    /// Structured fields parsed from the final synthesis.
    pub fields: StructuredFields,
    /// Form pre-fill derived from `fields`.
    pub prefill: Prefill,
    /// Written summary PDF.
    #[serde(skip)]
    pub pdf_path: PathBuf,
    /// Per-document statistics.
    pub documents: Vec<DocumentReport>,
    /// Local completion time, ISO 8601 with seconds.
    pub created_at: String,
}
