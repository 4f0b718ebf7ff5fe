//! Text extraction from uploaded PDFs: embedded text first, OCR for pages that need it.
//!
//! Extraction is blocking (subprocesses, file IO); async callers run it on
//! `tokio::task::spawn_blocking`.

pub mod boilerplate;
pub mod extractor;
pub mod ocr;
pub mod quality;
#[cfg(all(test, unix))]
mod test_tools;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use extractor::{PdfTextExtractor, count_pages};
pub use ocr::{OcrEngine, OcrError, OcrPage, OcrPreset, OcrRequest};
pub use quality::page_quality;

/// Outcome of one extraction attempt on one page.
///
/// Keeps "the tool ran and found nothing" apart from "the tool failed" so callers can log the
/// difference while still treating both as no text.
#[derive(Debug, Clone, PartialEq)]
pub enum PageExtraction {
    /// Non-blank text.
    Text(String),
    /// The tool succeeded but returned only whitespace.
    Empty,
    /// The tool failed; the message is kept for logs.
    Failed(String),
}

impl PageExtraction {
    /// Classify raw tool output.
    pub fn from_output(text: String) -> Self {
        if text.trim().is_empty() {
            Self::Empty
        } else {
            Self::Text(text)
        }
    }

    /// Text content, empty for `Empty` and `Failed`.
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Empty | Self::Failed(_) => "",
        }
    }

    /// Consume into text content, empty for `Empty` and `Failed`.
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Empty | Self::Failed(_) => String::new(),
        }
    }

    /// Whether the attempt produced non-blank text.
    pub fn has_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

/// Where a page's final text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSource {
    /// Embedded text read by `pdf-extract`.
    PdfExtract,
    /// Embedded text read by Poppler's `pdftotext`.
    Pdftotext,
    /// Tesseract OCR of the rasterized page.
    Ocr,
}

/// Final text of one page with its quality score.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    /// 1-based page number.
    pub number: u32,
    /// Page text after header/footer stripping.
    pub text: String,
    /// [`page_quality`] of `text`.
    pub score: f64,
    /// Backend that produced `text`.
    pub source: PageSource,
}

impl PageText {
    /// Build a page record, scoring the text.
    pub fn new(number: u32, text: String, source: PageSource) -> Self {
        let score = page_quality(&text);
        Self {
            number,
            text,
            score,
            source,
        }
    }
}

/// Extraction result for one document.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    /// Per-page records in page order.
    pub pages: Vec<PageText>,
    /// Number of pages whose text was taken from OCR.
    pub ocr_pages: usize,
    /// Of those, pages whose kept text came from the high-resolution retry.
    pub ocr_retries: usize,
}

impl ExtractedDocument {
    /// Number of pages whose final text came from `source`.
    pub fn pages_from(&self, source: PageSource) -> usize {
        self.pages.iter().filter(|page| page.source == source).count()
    }

    /// Normalized document text with `[Page N]` markers; blank pages are omitted.
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .filter_map(|page| {
                let body = normalize_whitespace(&page.text);
                if body.is_empty() {
                    None
                } else {
                    Some(format!("[Page {}]\n{}", page.number, body))
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Errors that abort extraction of a document.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// No embedded text and OCR could not provide any either.
    #[error("aucun texte exploitable dans {path}: {reason}")]
    NoUsableText {
        /// Offending document.
        path: PathBuf,
        /// Why OCR could not help.
        reason: String,
    },
}

/// Turns a document on disk into page text.
pub trait DocumentExtractor: Send + Sync {
    /// Extract every page of the document at `path`.
    fn extract(&self, path: &Path) -> Result<ExtractedDocument, ExtractionError>;
}

/// Collapse runs of spaces/tabs, trim line ends and cap blank lines at one.
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        let collapsed = line
            .replace('\u{0000}', "")
            .split([' ', '\t', '\u{00A0}'])
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if collapsed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(&collapsed);
        out.push('\n');
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_extraction_classifies_output() {
        assert_eq!(
            PageExtraction::from_output("  \n".into()),
            PageExtraction::Empty
        );
        assert!(PageExtraction::from_output("texte".into()).has_text());
        assert_eq!(PageExtraction::Failed("boom".into()).text(), "");
    }

    #[test]
    fn document_text_uses_page_markers_and_skips_blank_pages() {
        let document = ExtractedDocument {
            pages: vec![
                PageText::new(
                    1,
                    "Règlement   de la\tconsultation".into(),
                    PageSource::PdfExtract,
                ),
                PageText::new(2, "   ".into(), PageSource::PdfExtract),
                PageText::new(3, "Article 5\n\n\n\nCritères".into(), PageSource::Ocr),
            ],
            ocr_pages: 1,
            ocr_retries: 0,
        };
        assert_eq!(
            document.text(),
            "[Page 1]\nRèglement de la consultation\n\n[Page 3]\nArticle 5\n\nCritères"
        );
        assert_eq!(document.pages_from(PageSource::PdfExtract), 2);
        assert_eq!(document.pages_from(PageSource::Ocr), 1);
    }
}
