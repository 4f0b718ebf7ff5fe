//! Analysis pipeline coordinating extraction, chunked generation and PDF output.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::{
    config::{ChunkSettings, Config, LlmSettings},
    extraction::{DocumentExtractor, OcrEngine, PageSource, PdfTextExtractor},
    llm::{GenerationClient, GenerationRequest, LlmError, OllamaClient},
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        chunking::{ChunkPlan, count_prompt_tokens, determine_chunk_size},
        fields::{prefill, split_structured_fields},
        types::{AnalysisOutcome, DocumentReport, PipelineError, SourceDocument},
    },
    prompts::{
        ChunkPrompt, DocumentPrompt, FinalPrompt, STRUCTURED_FIELDS, chunk_extraction_prompt,
        document_synthesis_prompt, final_synthesis_prompt,
    },
    render::{SummaryDocument, write_summary_pdf},
};

/// Summary used when no document produced any text.
pub const NO_INFORMATION_SENTENCE: &str =
    "Aucune information exploitable n'a été extraite des documents fournis.";
/// File name of the generated summary inside the output directory.
pub const SUMMARY_FILE_NAME: &str = "resume_ia.pdf";
/// Title printed at the top of the summary PDF.
pub const SUMMARY_TITLE: &str = "Résumé IA - Mémoire technique";

/// Abstraction over the analysis pipeline used by the HTTP surface and the CLI.
#[async_trait]
pub trait AnalysisApi: Send + Sync {
    /// Analyze `documents` in order and write the summary PDF into `output_dir`.
    async fn analyze(
        &self,
        documents: Vec<SourceDocument>,
        output_dir: PathBuf,
    ) -> Result<AnalysisOutcome, PipelineError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Runs documents through extraction, per-chunk extraction prompts, per-document synthesis and
/// a final cross-document synthesis. Everything is sequential.
///
/// Construct once near process start and share it through an `Arc`.
pub struct AnalysisPipeline {
    extractor: Arc<dyn DocumentExtractor>,
    llm: Arc<dyn GenerationClient>,
    llm_settings: LlmSettings,
    chunk_settings: ChunkSettings,
    chunk_size: usize,
    metrics: Arc<PipelineMetrics>,
}

impl AnalysisPipeline {
    /// Build a pipeline from explicit collaborators.
    pub fn new(
        config: &Config,
        extractor: Arc<dyn DocumentExtractor>,
        llm: Arc<dyn GenerationClient>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let overhead = count_prompt_tokens(
            &config.llm.model,
            &chunk_extraction_prompt(&ChunkPrompt {
                document: "",
                index: 1,
                total: 1,
                text: "",
            }),
        );
        let chunk_size = determine_chunk_size(&config.llm, &config.chunking, overhead);
        tracing::debug!(
            chunk_size,
            prompt_overhead_tokens = overhead,
            num_ctx = config.llm.num_ctx,
            num_predict_chunk = config.llm.num_predict_chunk,
            configured = config.chunking.chunk_size,
            "Derived chunk size"
        );
        Self {
            extractor,
            llm,
            llm_settings: config.llm.clone(),
            chunk_settings: config.chunking.clone(),
            chunk_size,
            metrics,
        }
    }

    /// Build the production pipeline: command-line OCR, `pdf-extract` and Ollama.
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        let ocr = OcrEngine::new(&config.extraction);
        let extractor = PdfTextExtractor::new(config.extraction.clone(), ocr);
        let llm = OllamaClient::new(config.llm.clone())?;
        Ok(Self::new(
            config,
            Arc::new(extractor),
            Arc::new(llm),
            Arc::new(PipelineMetrics::new()),
        ))
    }

    /// Characters per generic chunk used by this pipeline.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Analyze documents and write the summary PDF.
    pub async fn analyze(
        &self,
        documents: Vec<SourceDocument>,
        output_dir: PathBuf,
    ) -> Result<AnalysisOutcome, PipelineError> {
        if documents.is_empty() {
            return Err(PipelineError::NoDocuments);
        }
        let start = Instant::now();
        tracing::info!(documents = documents.len(), output = %output_dir.display(), "Analysis started");

        let mut summaries = Vec::new();
        let mut reports = Vec::with_capacity(documents.len());
        for document in &documents {
            let (summary, report) = self.summarize_document(document).await?;
            if let Some(summary) = summary {
                summaries.push(format!("Document: {}\n{}", document.name, summary));
            }
            reports.push(report);
        }

        let final_text = if summaries.is_empty() {
            tracing::warn!("No document produced a summary; using fallback sentence");
            NO_INFORMATION_SENTENCE.to_string()
        } else {
            let prompt = final_synthesis_prompt(&FinalPrompt {
                summaries: &summaries,
            });
            match self.generate(prompt, self.llm_settings.num_predict_final).await {
                Ok(text) if !text.is_empty() => text,
                Ok(_) => NO_INFORMATION_SENTENCE.to_string(),
                Err(error) => {
                    self.metrics.record_llm_failure();
                    tracing::error!(error = %error, "Final synthesis failed");
                    return Err(PipelineError::FinalSynthesis(error));
                }
            }
        };

        let (fields, summary_markdown) = split_structured_fields(&final_text);
        let pdf_path = output_dir.join(SUMMARY_FILE_NAME);
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|source| PipelineError::OutputDir {
                path: output_dir.clone(),
                source,
            })?;

        let labelled: Vec<(&'static str, String)> = STRUCTURED_FIELDS
            .iter()
            .map(|(key, label)| (*label, fields.get(*key).cloned().unwrap_or_default()))
            .collect();
        let markdown = summary_markdown.clone();
        let target = pdf_path.clone();
        tokio::task::spawn_blocking(move || {
            write_summary_pdf(
                &target,
                &SummaryDocument {
                    title: SUMMARY_TITLE,
                    fields: &labelled,
                    markdown: &markdown,
                },
            )
        })
        .await??;

        self.metrics.record_analysis();
        tracing::info!(
            documents = documents.len(),
            summarized = summaries.len(),
            pdf = %pdf_path.display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Analysis complete"
        );

        Ok(AnalysisOutcome {
            prefill: prefill(&fields),
            fields,
            summary_markdown,
            pdf_path,
            documents: reports,
            created_at: local_timestamp(),
        })
    }

    async fn summarize_document(
        &self,
        document: &SourceDocument,
    ) -> Result<(Option<String>, DocumentReport), PipelineError> {
        let extractor = Arc::clone(&self.extractor);
        let path = document.path.clone();
        let extracted = tokio::task::spawn_blocking(move || extractor.extract(&path)).await??;

        let text = extracted.text();
        let chunks = ChunkPlan::build(&text, &self.chunk_settings, self.chunk_size).into_chunks();
        self.metrics
            .record_document(extracted.ocr_pages as u64, chunks.len() as u64);
        tracing::info!(
            document = %document.name,
            pages = extracted.pages.len(),
            ocr_pages = extracted.ocr_pages,
            ocr_retries = extracted.ocr_retries,
            chars = text.chars().count(),
            chunks = chunks.len(),
            "Document prepared"
        );

        let mut outputs = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            let prompt = chunk_extraction_prompt(&ChunkPrompt {
                document: &document.name,
                index: index + 1,
                total: chunks.len(),
                text: chunk,
            });
            match self.generate(prompt, self.llm_settings.num_predict_chunk).await {
                Ok(output) if !output.is_empty() => outputs.push(output),
                Ok(_) => tracing::debug!(
                    document = %document.name,
                    chunk = index + 1,
                    "Empty chunk extraction"
                ),
                Err(error) => {
                    self.metrics.record_llm_failure();
                    tracing::warn!(
                        document = %document.name,
                        chunk = index + 1,
                        error = %error,
                        "Chunk extraction failed; chunk skipped"
                    );
                }
            }
        }

        let chunk_outputs = outputs.len();
        let summary = match chunk_outputs {
            0 => None,
            1 => outputs.pop(),
            _ => {
                let prompt = document_synthesis_prompt(&DocumentPrompt {
                    document: &document.name,
                    extractions: &outputs,
                });
                match self.generate(prompt, self.llm_settings.num_predict_document).await {
                    Ok(output) if !output.is_empty() => Some(output),
                    Ok(_) => None,
                    Err(error) => {
                        self.metrics.record_llm_failure();
                        tracing::warn!(
                            document = %document.name,
                            error = %error,
                            "Document synthesis failed; document contributes no summary"
                        );
                        None
                    }
                }
            }
        };

        let report = DocumentReport {
            name: document.name.clone(),
            pages: extracted.pages.len(),
            ocr_pages: extracted.ocr_pages,
            ocr_retries: extracted.ocr_retries,
            pdftotext_pages: extracted.pages_from(PageSource::Pdftotext),
            chunks: chunks.len(),
            chunk_outputs,
            summarized: summary.is_some(),
        };
        Ok((summary, report))
    }

    async fn generate(&self, prompt: String, num_predict: u32) -> Result<String, LlmError> {
        self.llm
            .generate(GenerationRequest {
                prompt,
                num_predict,
            })
            .await
    }

    /// Return the current pipeline metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl AnalysisApi for AnalysisPipeline {
    async fn analyze(
        &self,
        documents: Vec<SourceDocument>,
        output_dir: PathBuf,
    ) -> Result<AnalysisOutcome, PipelineError> {
        AnalysisPipeline::analyze(self, documents, output_dir).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        AnalysisPipeline::metrics_snapshot(self)
    }
}

/// Local time as `YYYY-MM-DDTHH:MM:SS`, falling back to UTC when the offset is unknown.
pub(crate) fn local_timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    now.format(format).unwrap_or_default()
}
