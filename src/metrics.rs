use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing analysis activity since startup.
#[derive(Default)]
pub struct PipelineMetrics {
    analyses_completed: AtomicU64,
    documents_processed: AtomicU64,
    pages_ocr: AtomicU64,
    chunks_submitted: AtomicU64,
    llm_failures: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one processed document with its OCR page count and submitted chunk count.
    pub fn record_document(&self, ocr_pages: u64, chunk_count: u64) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
        self.pages_ocr.fetch_add(ocr_pages, Ordering::Relaxed);
        self.chunks_submitted
            .fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a generation call that produced no text.
    pub fn record_llm_failure(&self) {
        self.llm_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed analysis run (PDF written).
    pub fn record_analysis(&self) {
        self.analyses_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            analyses_completed: self.analyses_completed.load(Ordering::Relaxed),
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            pages_ocr: self.pages_ocr.load(Ordering::Relaxed),
            chunks_submitted: self.chunks_submitted.load(Ordering::Relaxed),
            llm_failures: self.llm_failures.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the analysis counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Analysis runs that produced a PDF.
    pub analyses_completed: u64,
    /// Documents that went through extraction and chunking.
    pub documents_processed: u64,
    /// Pages whose text came from OCR.
    pub pages_ocr: u64,
    /// Chunks submitted to the LLM.
    pub chunks_submitted: u64,
    /// Generation calls that failed and contributed no text.
    pub llm_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = PipelineMetrics::new();
        metrics.record_document(2, 4);
        metrics.record_document(0, 3);
        metrics.record_llm_failure();
        metrics.record_analysis();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_processed, 2);
        assert_eq!(snapshot.pages_ocr, 2);
        assert_eq!(snapshot.chunks_submitted, 7);
        assert_eq!(snapshot.llm_failures, 1);
        assert_eq!(snapshot.analyses_completed, 1);
    }

    #[test]
    fn snapshot_starts_empty() {
        let snapshot = PipelineMetrics::new().snapshot();
        assert_eq!(snapshot, MetricsSnapshot::default());
    }
}
