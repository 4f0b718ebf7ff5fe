//! OCR through Poppler's `pdftoppm` and the Tesseract command line.
//!
//! Pages are rasterized in contiguous runs (one `pdftoppm` call per run), preprocessed to
//! grayscale with a contrast stretch, then passed to `tesseract`. Critical pages (cover, last
//! pages) use the dense-layout preset and get one retry at a higher resolution when the first
//! pass scores below the quality threshold.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use image::GrayImage;
use tempfile::TempDir;
use thiserror::Error;

use super::PageExtraction;
use super::quality::page_quality;
use crate::config::ExtractionSettings;

/// Fraction of darkest and brightest pixels ignored when stretching contrast.
const AUTOCONTRAST_CUTOFF: f64 = 0.01;

/// Errors raised by the OCR toolchain.
#[derive(Debug, Error)]
pub enum OcrError {
    /// A required binary could not be located.
    #[error("{0} not found (install poppler-utils/tesseract-ocr, see POPPLER_PATH/TESSERACT_CMD)")]
    ToolNotFound(&'static str),
    /// A tool exited with a failure status.
    #[error("{tool} failed: {stderr}")]
    CommandFailed {
        /// Binary name.
        tool: &'static str,
        /// Captured standard error.
        stderr: String,
    },
    /// `pdftoppm` succeeded but produced no image for the page.
    #[error("no image generated for page {0}")]
    MissingImage(u32),
    /// Temporary files or process spawning failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Tesseract page segmentation presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrPreset {
    /// Automatic page segmentation (`--psm 3`).
    Standard,
    /// Single uniform block with preserved spacing (`--psm 6`), for dense cover pages and forms.
    Dense,
}

impl OcrPreset {
    fn args(self) -> &'static [&'static str] {
        match self {
            Self::Standard => &["--psm", "3"],
            Self::Dense => &["--psm", "6", "-c", "preserve_interword_spaces=1"],
        }
    }
}

/// A page to OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcrRequest {
    /// 1-based page number.
    pub page: u32,
    /// Critical pages use [`OcrPreset::Dense`] and may be retried.
    pub critical: bool,
}

impl OcrRequest {
    /// Cover or closing page: dense preset, eligible for the retry.
    pub fn critical(page: u32) -> Self {
        Self {
            page,
            critical: true,
        }
    }

    /// Any other page.
    pub fn standard(page: u32) -> Self {
        Self {
            page,
            critical: false,
        }
    }

    fn preset(&self) -> OcrPreset {
        if self.critical {
            OcrPreset::Dense
        } else {
            OcrPreset::Standard
        }
    }
}

/// OCR outcome for one requested page.
#[derive(Debug, Clone)]
pub struct OcrPage {
    /// 1-based page number.
    pub page: u32,
    /// Recognized text or the failure.
    pub result: PageExtraction,
    /// Quality score of the recognized text.
    pub score: f64,
    /// Resolution of the kept attempt.
    pub dpi: u32,
    /// Whether the kept text comes from the high-resolution retry.
    pub retried: bool,
}

impl OcrPage {
    fn failed(page: u32, dpi: u32, message: String) -> Self {
        Self {
            page,
            result: PageExtraction::Failed(message),
            score: 0.0,
            dpi,
            retried: false,
        }
    }
}

/// Command-line OCR engine. Tool paths are resolved once at construction.
#[derive(Debug, Clone)]
pub struct OcrEngine {
    pdftoppm: Option<PathBuf>,
    tesseract: Option<PathBuf>,
    lang: String,
    dpi: u32,
    retry_dpi: u32,
    quality_threshold: f64,
}

impl OcrEngine {
    /// Locate `pdftoppm` and `tesseract` using the configured overrides or `PATH`.
    pub fn new(settings: &ExtractionSettings) -> Self {
        let pdftoppm = resolve_binary("pdftoppm", settings.poppler_path.as_deref());
        let tesseract = match &settings.tesseract_cmd {
            Some(cmd) => resolve_command(cmd),
            None => resolve_binary("tesseract", None),
        };
        let engine = Self {
            pdftoppm,
            tesseract,
            lang: settings.ocr_lang.clone(),
            dpi: settings.ocr_dpi,
            retry_dpi: settings.ocr_retry_dpi,
            quality_threshold: settings.quality_threshold,
        };
        if engine.is_available() {
            tracing::info!(
                pdftoppm = ?engine.pdftoppm,
                tesseract = ?engine.tesseract,
                lang = %engine.lang,
                "OCR toolchain detected"
            );
        } else {
            tracing::warn!(hint = %engine.availability_hint(), "OCR disabled");
        }
        engine
    }

    /// Whether both `pdftoppm` and `tesseract` were found.
    pub fn is_available(&self) -> bool {
        self.pdftoppm.is_some() && self.tesseract.is_some()
    }

    /// Human-readable explanation of what is missing.
    pub fn availability_hint(&self) -> String {
        match (&self.pdftoppm, &self.tesseract) {
            (None, _) => {
                "pdftoppm introuvable (installer poppler-utils ou définir POPPLER_PATH)".into()
            }
            (_, None) => {
                "tesseract introuvable (installer tesseract-ocr ou définir TESSERACT_CMD)".into()
            }
            _ => "OCR disponible".into(),
        }
    }

    /// OCR the requested pages of `pdf`.
    ///
    /// Per-page failures are reported as [`PageExtraction::Failed`]; only a missing toolchain is
    /// an error. Results come back sorted by page number.
    pub fn ocr_pages(
        &self,
        pdf: &Path,
        requests: &[OcrRequest],
    ) -> Result<Vec<OcrPage>, OcrError> {
        let pdftoppm = self
            .pdftoppm
            .as_deref()
            .ok_or(OcrError::ToolNotFound("pdftoppm"))?;
        let tesseract = self
            .tesseract
            .as_deref()
            .ok_or(OcrError::ToolNotFound("tesseract"))?;
        let start = Instant::now();

        let mut requests = requests.to_vec();
        requests.sort_by_key(|request| request.page);
        requests.dedup_by_key(|request| request.page);
        let pages: Vec<u32> = requests.iter().map(|request| request.page).collect();
        let runs = contiguous_runs(&pages);

        let mut results = Vec::with_capacity(requests.len());
        for (first, last) in &runs {
            let in_run: Vec<&OcrRequest> = requests
                .iter()
                .filter(|request| (*first..=*last).contains(&request.page))
                .collect();
            let workdir = TempDir::new()?;
            let rasterized = rasterize(
                pdftoppm,
                pdf,
                *first,
                *last,
                self.dpi,
                workdir.path(),
                "page",
            );
            if let Err(err) = rasterized {
                tracing::warn!(first, last, error = %err, "Rasterization failed");
                let reason = err.to_string();
                results.extend(
                    in_run
                        .iter()
                        .map(|request| OcrPage::failed(request.page, self.dpi, reason.clone())),
                );
                continue;
            }
            for request in in_run {
                let page = self.recognize(
                    tesseract,
                    workdir.path(),
                    "page",
                    request.page,
                    request.preset(),
                    self.dpi,
                );
                results.push(page);
            }
        }

        for request in requests.iter().filter(|request| request.critical) {
            let Some(current) = results.iter_mut().find(|page| page.page == request.page) else {
                continue;
            };
            if current.score >= self.quality_threshold || self.retry_dpi <= self.dpi {
                continue;
            }
            let retry = self.retry_page(pdftoppm, tesseract, pdf, request.page);
            tracing::debug!(
                page = request.page,
                first_score = current.score,
                retry_score = retry.score,
                "High-resolution OCR retry"
            );
            if retry.result.has_text() && retry.score > current.score {
                *current = retry;
            }
        }

        tracing::info!(
            document = %pdf.display(),
            pages = results.len(),
            runs = runs.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "OCR complete"
        );
        Ok(results)
    }

    fn retry_page(&self, pdftoppm: &Path, tesseract: &Path, pdf: &Path, page: u32) -> OcrPage {
        let workdir = match TempDir::new() {
            Ok(dir) => dir,
            Err(err) => return OcrPage::failed(page, self.retry_dpi, err.to_string()),
        };
        let rasterized = rasterize(
            pdftoppm,
            pdf,
            page,
            page,
            self.retry_dpi,
            workdir.path(),
            "retry",
        );
        if let Err(err) = rasterized {
            return OcrPage::failed(page, self.retry_dpi, err.to_string());
        }
        let mut result = self.recognize(
            tesseract,
            workdir.path(),
            "retry",
            page,
            OcrPreset::Dense,
            self.retry_dpi,
        );
        result.retried = true;
        result
    }

    fn recognize(
        &self,
        tesseract: &Path,
        dir: &Path,
        prefix: &str,
        page: u32,
        preset: OcrPreset,
        dpi: u32,
    ) -> OcrPage {
        let Some(image) = find_page_image(dir, prefix, page) else {
            return OcrPage::failed(page, dpi, OcrError::MissingImage(page).to_string());
        };
        let input = match preprocess(&image) {
            Ok(prepared) => prepared,
            Err(err) => {
                tracing::debug!(page, error = %err, "Preprocessing failed, using raw image");
                image
            }
        };
        match run_tesseract(tesseract, &input, &self.lang, preset) {
            Ok(text) => {
                let score = page_quality(&text);
                OcrPage {
                    page,
                    result: PageExtraction::from_output(text),
                    score,
                    dpi,
                    retried: false,
                }
            }
            Err(err) => {
                tracing::warn!(page, error = %err, "Tesseract failed");
                OcrPage::failed(page, dpi, err.to_string())
            }
        }
    }
}

/// Locate `name` inside `dir` when given, otherwise on `PATH`.
pub(crate) fn resolve_binary(name: &str, dir: Option<&Path>) -> Option<PathBuf> {
    match dir {
        Some(dir) => {
            let candidate = dir.join(name);
            if candidate.is_file() {
                Some(candidate)
            } else {
                which::which_in(name, Some(dir), dir).ok()
            }
        }
        None => which::which(name).ok(),
    }
}

fn resolve_command(cmd: &Path) -> Option<PathBuf> {
    if cmd.is_file() {
        Some(cmd.to_path_buf())
    } else {
        which::which(cmd).ok()
    }
}

/// Group sorted page numbers into inclusive `(first, last)` runs of consecutive pages.
pub fn contiguous_runs(pages: &[u32]) -> Vec<(u32, u32)> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for &page in pages {
        match runs.last_mut() {
            Some((_, last)) if page == *last + 1 => *last = page,
            Some((_, last)) if page == *last => {}
            _ => runs.push((page, page)),
        }
    }
    runs
}

fn rasterize(
    pdftoppm: &Path,
    pdf: &Path,
    first: u32,
    last: u32,
    dpi: u32,
    output_dir: &Path,
    prefix: &str,
) -> Result<(), OcrError> {
    let output = Command::new(pdftoppm)
        .args(["-png", "-r", &dpi.to_string()])
        .args(["-f", &first.to_string(), "-l", &last.to_string()])
        .arg(pdf)
        .arg(output_dir.join(prefix))
        .output()
        .map_err(|err| spawn_error("pdftoppm", err))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(OcrError::CommandFailed {
            tool: "pdftoppm",
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn run_tesseract(
    tesseract: &Path,
    image: &Path,
    lang: &str,
    preset: OcrPreset,
) -> Result<String, OcrError> {
    let output = Command::new(tesseract)
        .arg(image)
        .arg("stdout")
        .args(["-l", lang])
        .args(preset.args())
        .output()
        .map_err(|err| spawn_error("tesseract", err))?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        Err(OcrError::CommandFailed {
            tool: "tesseract",
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn spawn_error(tool: &'static str, err: std::io::Error) -> OcrError {
    if err.kind() == std::io::ErrorKind::NotFound {
        OcrError::ToolNotFound(tool)
    } else {
        OcrError::Io(err)
    }
}

/// `pdftoppm` zero-pads page numbers to the width of the document's page count.
fn find_page_image(dir: &Path, prefix: &str, page: u32) -> Option<PathBuf> {
    (1..=6usize)
        .map(|width| dir.join(format!("{prefix}-{page:0width$}.png")))
        .find(|path| path.exists())
}

fn preprocess(image: &Path) -> Result<PathBuf, image::ImageError> {
    let mut gray = image::open(image)?.to_luma8();
    autocontrast(&mut gray, AUTOCONTRAST_CUTOFF);
    let prepared = image.with_extension("prep.png");
    gray.save(&prepared)?;
    Ok(prepared)
}

/// Stretch the histogram so the `cutoff` darkest pixels map to 0 and the brightest to 255.
fn autocontrast(image: &mut GrayImage, cutoff: f64) {
    let mut histogram = [0u64; 256];
    for pixel in image.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return;
    }
    let cut = (total as f64 * cutoff) as u64;

    let mut low = 0usize;
    let mut seen = 0u64;
    for (value, count) in histogram.iter().enumerate() {
        seen += count;
        if seen > cut {
            low = value;
            break;
        }
    }
    let mut high = 255usize;
    seen = 0;
    for (value, count) in histogram.iter().enumerate().rev() {
        seen += count;
        if seen > cut {
            high = value;
            break;
        }
    }
    if high <= low {
        return;
    }

    let span = (high - low) as f64;
    for pixel in image.pixels_mut() {
        let value = (pixel.0[0] as usize).clamp(low, high);
        pixel.0[0] = (((value - low) as f64) * 255.0 / span).round() as u8;
    }
}
