//! Page-wise text extraction with a selective OCR pass.

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use super::boilerplate::strip_repeated_lines;
use super::ocr::{OcrEngine, OcrRequest, resolve_binary};
use super::{
    DocumentExtractor, ExtractedDocument, ExtractionError, PageExtraction, PageSource, PageText,
};
use crate::config::ExtractionSettings;
use crate::sampling::select_evenly;

/// Extractor combining `pdf-extract`, Poppler's `pdftotext` and the OCR engine.
#[derive(Debug, Clone)]
pub struct PdfTextExtractor {
    settings: ExtractionSettings,
    ocr: OcrEngine,
    pdftotext: Option<PathBuf>,
}

impl PdfTextExtractor {
    /// Create an extractor; `pdftotext` is looked up next to the other Poppler tools.
    pub fn new(settings: ExtractionSettings, ocr: OcrEngine) -> Self {
        let pdftotext = resolve_binary("pdftotext", settings.poppler_path.as_deref());
        if pdftotext.is_none() {
            tracing::debug!("pdftotext not found; embedded text relies on pdf-extract only");
        }
        Self {
            settings,
            ocr,
            pdftotext,
        }
    }

    fn embedded_pages(
        &self,
        path: &Path,
        bytes: &[u8],
    ) -> Option<(Vec<PageExtraction>, PageSource)> {
        match pages_with_pdf_extract(bytes) {
            Ok(pages) if pages.iter().any(PageExtraction::has_text) => {
                return Some((pages, PageSource::PdfExtract));
            }
            Ok(_) => tracing::debug!(document = %path.display(), "pdf-extract found no text"),
            Err(err) => {
                tracing::warn!(document = %path.display(), error = %err, "pdf-extract failed")
            }
        }

        let pdftotext = self.pdftotext.as_deref()?;
        match pages_with_pdftotext(pdftotext, path) {
            Ok(pages) if pages.iter().any(PageExtraction::has_text) => {
                Some((pages, PageSource::Pdftotext))
            }
            Ok(_) => {
                tracing::debug!(document = %path.display(), "pdftotext found no text");
                None
            }
            Err(err) => {
                tracing::warn!(document = %path.display(), error = %err, "pdftotext failed");
                None
            }
        }
    }

    fn apply_ocr(&self, path: &Path, pages: &mut [PageText]) -> Result<OcrReplacements, String> {
        let queue = plan_ocr_queue(pages, &self.settings);
        if queue.is_empty() {
            return Ok(OcrReplacements::default());
        }
        if !self.ocr.is_available() {
            return Err(self.ocr.availability_hint());
        }
        tracing::debug!(
            document = %path.display(),
            queued = queue.len(),
            critical = queue.iter().filter(|request| request.critical).count(),
            "Pages queued for OCR"
        );

        let results = self.ocr.ocr_pages(path, &queue).map_err(|err| err.to_string())?;
        let mut replacements = OcrReplacements::default();
        for result in results {
            let Some(page) = pages.iter_mut().find(|page| page.number == result.page) else {
                continue;
            };
            if let PageExtraction::Failed(reason) = &result.result {
                tracing::debug!(page = result.page, %reason, "OCR produced no text");
                continue;
            }
            if result.result.has_text()
                && (result.score >= page.score || page.text.trim().is_empty())
            {
                tracing::debug!(
                    page = result.page,
                    dpi = result.dpi,
                    retried = result.retried,
                    previous = ?page.source,
                    score = result.score,
                    "Page text replaced by OCR"
                );
                page.text = result.result.into_text();
                page.score = result.score;
                page.source = PageSource::Ocr;
                replacements.pages += 1;
                if result.retried {
                    replacements.retried += 1;
                }
            }
        }
        Ok(replacements)
    }
}

/// Pages whose text was taken from OCR.
#[derive(Debug, Default, Clone, Copy)]
struct OcrReplacements {
    pages: usize,
    retried: usize,
}

impl DocumentExtractor for PdfTextExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument, ExtractionError> {
        let start = Instant::now();
        let bytes = std::fs::read(path).map_err(|source| ExtractionError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let (raw_pages, source) = match self.embedded_pages(path, &bytes) {
            Some((pages, source)) => {
                let texts: Vec<String> = pages.into_iter().map(PageExtraction::into_text).collect();
                (texts, source)
            }
            None => {
                let count = count_pages(path).ok_or_else(|| ExtractionError::NoUsableText {
                    path: path.to_path_buf(),
                    reason: "aucun texte intégré et nombre de pages illisible".into(),
                })?;
                tracing::info!(
                    document = %path.display(),
                    pages = count,
                    "No embedded text, falling back to OCR"
                );
                (vec![String::new(); count], PageSource::Ocr)
            }
        };
        let has_embedded_text = source != PageSource::Ocr;

        let stripped = strip_repeated_lines(&raw_pages, self.settings.boilerplate_line_ratio);
        let mut pages: Vec<PageText> = stripped
            .into_iter()
            .enumerate()
            .map(|(index, text)| PageText::new(index as u32 + 1, text, source))
            .collect();

        let replacements = match self.apply_ocr(path, &mut pages) {
            Ok(replacements) => replacements,
            Err(reason) if !has_embedded_text => {
                return Err(ExtractionError::NoUsableText {
                    path: path.to_path_buf(),
                    reason,
                });
            }
            Err(reason) => {
                tracing::warn!(
                    document = %path.display(),
                    %reason,
                    "OCR skipped, keeping embedded text"
                );
                OcrReplacements::default()
            }
        };

        if pages.iter().all(|page| page.text.trim().is_empty()) {
            return Err(ExtractionError::NoUsableText {
                path: path.to_path_buf(),
                reason: "l'OCR n'a reconnu aucun texte".into(),
            });
        }

        tracing::info!(
            document = %path.display(),
            pages = pages.len(),
            ocr_pages = replacements.pages,
            ocr_retries = replacements.retried,
            embedded = ?source,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Extraction complete"
        );
        Ok(ExtractedDocument {
            pages,
            ocr_pages: replacements.pages,
            ocr_retries: replacements.retried,
        })
    }
}

/// Number of pages in the PDF at `path`, or `None` when it cannot be parsed.
pub fn count_pages(path: &Path) -> Option<usize> {
    match lopdf::Document::load(path) {
        Ok(document) => Some(document.get_pages().len()),
        Err(err) => {
            tracing::debug!(document = %path.display(), error = %err, "Could not count pages");
            None
        }
    }
}

/// Decide which pages go through OCR.
///
/// Pages scoring below the threshold or shorter than the minimum are queued, and pages 1, 2,
/// n-1 and n always are. When the queue exceeds the page cap, critical pages are kept and the
/// remaining slots are filled with evenly spaced picks among the others.
pub fn plan_ocr_queue(pages: &[PageText], settings: &ExtractionSettings) -> Vec<OcrRequest> {
    let total = pages.len() as u32;
    if total == 0 {
        return Vec::new();
    }
    let critical: BTreeSet<u32> = [1, 2, total.saturating_sub(1), total]
        .into_iter()
        .filter(|page| (1..=total).contains(page))
        .collect();

    let mut critical_pages = Vec::new();
    let mut others = Vec::new();
    for page in pages {
        if critical.contains(&page.number) {
            critical_pages.push(page.number);
        } else if page.score < settings.quality_threshold
            || page.text.trim().chars().count() < settings.ocr_min_page_chars
        {
            others.push(page.number);
        }
    }

    let slots = settings.ocr_max_pages.saturating_sub(critical_pages.len());
    let kept_others: Vec<u32> = if others.len() > slots {
        select_evenly(others.len(), slots)
            .into_iter()
            .map(|index| others[index])
            .collect()
    } else {
        others
    };

    let mut queue: Vec<OcrRequest> = critical_pages
        .into_iter()
        .map(OcrRequest::critical)
        .chain(kept_others.into_iter().map(OcrRequest::standard))
        .collect();
    queue.sort_by_key(|request| request.page);
    queue
}

fn pages_with_pdf_extract(bytes: &[u8]) -> Result<Vec<PageExtraction>, String> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }));
    match result {
        Ok(Ok(pages)) => Ok(pages.into_iter().map(PageExtraction::from_output).collect()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err("pdf-extract panicked (malformed document)".into()),
    }
}

fn pages_with_pdftotext(pdftotext: &Path, path: &Path) -> Result<Vec<PageExtraction>, String> {
    let output = Command::new(pdftotext)
        .args(["-enc", "UTF-8", "-layout"])
        .arg(path)
        .arg("-")
        .output()
        .map_err(|err| err.to_string())?;
    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
    }
    Ok(split_form_feeds(&String::from_utf8_lossy(&output.stdout))
        .into_iter()
        .map(PageExtraction::from_output)
        .collect())
}

/// `pdftotext` terminates every page with a form feed; the piece after the last one is dropped.
fn split_form_feeds(raw: &str) -> Vec<String> {
    let mut pages: Vec<String> = raw
        .split('\u{000C}')
        .map(|page| page.replace('\u{0000}', ""))
        .collect();
    if pages.len() > 1 && pages.last().is_some_and(|last| last.trim().is_empty()) {
        pages.pop();
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(number: u32, text: &str) -> PageText {
        PageText::new(number, text.to_string(), PageSource::PdfExtract)
    }

    fn good_text() -> String {
        "Le présent règlement de consultation précise les modalités de remise des offres, \
         les critères de jugement retenus par le maître d'ouvrage, la durée prévisionnelle \
         des travaux et les conditions de visite obligatoire du site avant toute candidature."
            .to_string()
    }

    #[test]
    fn critical_pages_are_always_queued() {
        let pages: Vec<PageText> = (1..=6).map(|n| page(n, &good_text())).collect();
        let queue = plan_ocr_queue(&pages, &ExtractionSettings::default());
        let numbers: Vec<u32> = queue.iter().map(|request| request.page).collect();
        assert_eq!(numbers, vec![1, 2, 5, 6]);
        assert!(queue.iter().all(|request| request.critical));
    }

    #[test]
    fn weak_pages_are_queued_as_standard() {
        let mut pages: Vec<PageText> = (1..=8).map(|n| page(n, &good_text())).collect();
        pages[3] = page(4, "~~ ## ||");
        pages[4] = page(5, "Annexe");
        let queue = plan_ocr_queue(&pages, &ExtractionSettings::default());
        let standard: Vec<u32> = queue
            .iter()
            .filter(|request| !request.critical)
            .map(|request| request.page)
            .collect();
        assert_eq!(standard, vec![4, 5]);
    }

    #[test]
    fn queue_is_capped_keeping_critical_pages() {
        let pages: Vec<PageText> = (1..=40).map(|n| page(n, "")).collect();
        let settings = ExtractionSettings {
            ocr_max_pages: 10,
            ..ExtractionSettings::default()
        };
        let queue = plan_ocr_queue(&pages, &settings);
        assert_eq!(queue.len(), 10);
        for critical in [1, 2, 39, 40] {
            assert!(queue.contains(&OcrRequest::critical(critical)));
        }
        assert!(queue.windows(2).all(|pair| pair[0].page < pair[1].page));
    }

    #[test]
    fn single_page_document_queues_once() {
        let queue = plan_ocr_queue(&[page(1, "")], &ExtractionSettings::default());
        assert_eq!(queue, vec![OcrRequest::critical(1)]);
    }

    #[test]
    fn form_feed_split_drops_trailing_terminator() {
        assert_eq!(split_form_feeds("a\u{000C}b\u{000C}"), vec!["a", "b"]);
        assert_eq!(
            split_form_feeds("a\u{000C}\u{000C}c\u{000C}"),
            vec!["a", "", "c"]
        );
    }

    #[test]
    fn unreadable_file_is_reported() {
        let extractor = PdfTextExtractor::new(
            ExtractionSettings::default(),
            OcrEngine::new(&ExtractionSettings::default()),
        );
        let err = extractor.extract(Path::new("/nonexistent/dce.pdf")).unwrap_err();
        assert!(matches!(err, ExtractionError::Read { .. }));
    }

    #[test]
    fn garbage_bytes_without_ocr_yield_no_usable_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();
        let settings = ExtractionSettings {
            poppler_path: Some(dir.path().to_path_buf()),
            tesseract_cmd: Some(dir.path().join("missing-tesseract")),
            ..ExtractionSettings::default()
        };
        let extractor = PdfTextExtractor::new(settings.clone(), OcrEngine::new(&settings));
        let err = extractor.extract(&path).unwrap_err();
        assert!(matches!(err, ExtractionError::NoUsableText { .. }));
    }

    #[cfg(unix)]
    mod with_fake_tools {
        use super::*;
        use crate::extraction::test_tools::{
            NOISE, PROSE, blank_pdf, fake_pdftoppm, fake_pdftotext, fake_tesseract,
        };

        fn extractor_in(dir: &Path) -> PdfTextExtractor {
            let settings = ExtractionSettings {
                poppler_path: Some(dir.to_path_buf()),
                tesseract_cmd: Some(dir.join("tesseract")),
                ..ExtractionSettings::default()
            };
            PdfTextExtractor::new(settings.clone(), OcrEngine::new(&settings))
        }

        fn garbage_pdf(dir: &Path) -> PathBuf {
            let path = dir.join("scan.pdf");
            std::fs::write(&path, b"not a pdf at all").unwrap();
            path
        }

        #[test]
        fn pdftotext_takes_over_when_pdf_extract_fails() {
            let dir = tempfile::tempdir().unwrap();
            let second = "Article 2 : durée du marché fixée à dix mois.";
            fake_pdftotext(dir.path(), &[PROSE, second]);
            let path = garbage_pdf(dir.path());

            let document = extractor_in(dir.path()).extract(&path).unwrap();

            assert_eq!(document.pages.len(), 2);
            assert_eq!(document.pages_from(PageSource::Pdftotext), 2);
            assert_eq!(document.ocr_pages, 0);
            assert!(document.text().contains("[Page 2]\nArticle 2"));
        }

        #[test]
        fn ocr_replaces_only_pages_it_improves() {
            let dir = tempfile::tempdir().unwrap();
            fake_pdftotext(dir.path(), &[NOISE, PROSE]);
            fake_pdftoppm(dir.path());
            fake_tesseract(dir.path(), &[("*page-1.*", PROSE), ("*", NOISE)]);
            let path = garbage_pdf(dir.path());

            let document = extractor_in(dir.path()).extract(&path).unwrap();

            assert_eq!(document.ocr_pages, 1);
            assert_eq!(document.ocr_retries, 0);
            assert_eq!(document.pages[0].source, PageSource::Ocr);
            assert_eq!(document.pages[0].text, PROSE);
            assert_eq!(document.pages[1].source, PageSource::Pdftotext);
            assert_eq!(document.pages[1].text, PROSE);
        }

        #[test]
        fn retried_pages_are_counted() {
            let dir = tempfile::tempdir().unwrap();
            fake_pdftotext(dir.path(), &[NOISE, PROSE]);
            fake_pdftoppm(dir.path());
            fake_tesseract(dir.path(), &[("*retry-1.*", PROSE), ("*", NOISE)]);
            let path = garbage_pdf(dir.path());

            let document = extractor_in(dir.path()).extract(&path).unwrap();

            assert_eq!(document.ocr_pages, 1);
            assert_eq!(document.ocr_retries, 1);
            assert_eq!(document.pages[0].text, PROSE);
        }

        #[test]
        fn scanned_document_falls_back_to_full_ocr() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("scan.pdf");
            blank_pdf(&path, 3);
            fake_pdftoppm(dir.path());
            fake_tesseract(dir.path(), &[("*", PROSE)]);

            let document = extractor_in(dir.path()).extract(&path).unwrap();

            assert_eq!(document.pages.len(), 3);
            assert_eq!(document.ocr_pages, 3);
            assert_eq!(document.pages_from(PageSource::Ocr), 3);
        }

        #[test]
        fn scanned_document_with_blank_ocr_has_no_usable_text() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("scan.pdf");
            blank_pdf(&path, 2);
            fake_pdftoppm(dir.path());
            fake_tesseract(dir.path(), &[]);

            let err = extractor_in(dir.path()).extract(&path).unwrap_err();

            assert!(matches!(err, ExtractionError::NoUsableText { .. }));
        }
    }
}
