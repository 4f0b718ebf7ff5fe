use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::processing::chunking::MIN_CHUNK_CHARS;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value found in the environment.
        value: String,
    },
    /// Values parsed individually but are inconsistent together.
    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Runtime configuration for the DCE assistant.
///
/// Built once at process start and handed to every service that needs it; nothing reads the
/// environment after [`Config::load`] returns.
#[derive(Debug, Clone)]
pub struct Config {
    /// Local LLM generation settings.
    pub llm: LlmSettings,
    /// Text extraction and OCR settings.
    pub extraction: ExtractionSettings,
    /// Chunking budgets.
    pub chunking: ChunkSettings,
    /// Root directory for application data; uploads live under `data_dir/uploads`.
    pub data_dir: PathBuf,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Settings for the Ollama generate endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    /// Full URL of the generate endpoint.
    pub url: String,
    /// Model name passed in every request.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Per-call HTTP timeout.
    pub timeout: Duration,
    /// Context window requested from the runtime (`num_ctx`).
    pub num_ctx: u32,
    /// Output token cap for per-chunk extraction calls.
    pub num_predict_chunk: u32,
    /// Output token cap for per-document synthesis calls.
    pub num_predict_document: u32,
    /// Output token cap for the final cross-document synthesis.
    pub num_predict_final: u32,
    /// Optional GPU layer hint.
    pub num_gpu: Option<u32>,
    /// Optional CPU thread hint.
    pub num_thread: Option<u32>,
}

/// Settings for embedded-text extraction and the OCR fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSettings {
    /// Tesseract language pack.
    pub ocr_lang: String,
    /// Base rasterization DPI.
    pub ocr_dpi: u32,
    /// DPI used for the single retry of low-quality critical pages.
    pub ocr_retry_dpi: u32,
    /// Maximum number of pages sent to OCR per document.
    pub ocr_max_pages: usize,
    /// Pages with fewer characters than this are queued for OCR.
    pub ocr_min_page_chars: usize,
    /// Pages scoring below this are queued for OCR.
    pub quality_threshold: f64,
    /// Lines present on at least this fraction of pages are stripped as headers/footers.
    pub boilerplate_line_ratio: f64,
    /// Directory holding `pdftoppm`/`pdftotext` when they are not on `PATH`.
    pub poppler_path: Option<PathBuf>,
    /// Explicit `tesseract` binary.
    pub tesseract_cmd: Option<PathBuf>,
}

/// Budgets applied by the chunker.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSettings {
    /// Upper bound on a generic chunk, in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive generic chunks.
    pub chunk_overlap: usize,
    /// Maximum number of generic chunks sent per document.
    pub max_chunks: usize,
    /// Character budget a document is trimmed to before splitting.
    pub max_doc_chars: usize,
    /// Width of a keyword window, in characters.
    pub keyword_window_chars: usize,
    /// Maximum number of keyword windows per document.
    pub max_keyword_windows: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434/api/generate".to_string(),
            model: "mistral".to_string(),
            temperature: 0.2,
            timeout: Duration::from_secs(600),
            num_ctx: 8192,
            num_predict_chunk: 512,
            num_predict_document: 900,
            num_predict_final: 1800,
            num_gpu: None,
            num_thread: None,
        }
    }
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            ocr_lang: "fra".to_string(),
            ocr_dpi: 250,
            ocr_retry_dpi: 350,
            ocr_max_pages: 30,
            ocr_min_page_chars: 200,
            quality_threshold: 0.45,
            boilerplate_line_ratio: 0.6,
            poppler_path: None,
            tesseract_cmd: None,
        }
    }
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            chunk_size: 6000,
            chunk_overlap: 400,
            max_chunks: 8,
            max_doc_chars: 60_000,
            keyword_window_chars: 1200,
            max_keyword_windows: 6,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            extraction: ExtractionSettings::default(),
            chunking: ChunkSettings::default(),
            data_dir: PathBuf::from("data"),
            server_port: None,
        }
    }
}

impl Config {
    /// Load `.env` (when present) and build the configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        tracing::debug!(
            llm_url = %config.llm.url,
            model = %config.llm.model,
            num_ctx = config.llm.num_ctx,
            ocr_lang = %config.extraction.ocr_lang,
            data_dir = %config.data_dir.display(),
            server_port = ?config.server_port,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Build configuration from environment variables, falling back to defaults per key.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let llm_defaults = defaults.llm;
        let extraction_defaults = defaults.extraction;
        let chunk_defaults = defaults.chunking;

        let llm = LlmSettings {
            url: load_env_optional("OLLAMA_URL").unwrap_or(llm_defaults.url),
            model: load_env_optional("LLM_MODEL").unwrap_or(llm_defaults.model),
            temperature: parse_env_or("LLM_TEMPERATURE", llm_defaults.temperature)?,
            timeout: Duration::from_secs(parse_env_or(
                "LLM_TIMEOUT_SECS",
                llm_defaults.timeout.as_secs(),
            )?),
            num_ctx: parse_env_or("LLM_NUM_CTX", llm_defaults.num_ctx)?,
            num_predict_chunk: parse_env_or(
                "LLM_NUM_PREDICT_CHUNK",
                llm_defaults.num_predict_chunk,
            )?,
            num_predict_document: parse_env_or(
                "LLM_NUM_PREDICT_DOC",
                llm_defaults.num_predict_document,
            )?,
            num_predict_final: parse_env_or(
                "LLM_NUM_PREDICT_FINAL",
                llm_defaults.num_predict_final,
            )?,
            num_gpu: parse_env_optional("LLM_NUM_GPU")?,
            num_thread: parse_env_optional("LLM_NUM_THREAD")?,
        };

        let extraction = ExtractionSettings {
            ocr_lang: load_env_optional("OCR_LANG").unwrap_or(extraction_defaults.ocr_lang),
            ocr_dpi: parse_env_or("OCR_DPI", extraction_defaults.ocr_dpi)?,
            ocr_retry_dpi: parse_env_or("OCR_RETRY_DPI", extraction_defaults.ocr_retry_dpi)?,
            ocr_max_pages: parse_env_or("OCR_MAX_PAGES", extraction_defaults.ocr_max_pages)?,
            ocr_min_page_chars: parse_env_or(
                "OCR_MIN_PAGE_CHARS",
                extraction_defaults.ocr_min_page_chars,
            )?,
            quality_threshold: parse_env_or(
                "OCR_QUALITY_THRESHOLD",
                extraction_defaults.quality_threshold,
            )?,
            boilerplate_line_ratio: parse_env_or(
                "BOILERPLATE_LINE_RATIO",
                extraction_defaults.boilerplate_line_ratio,
            )?,
            poppler_path: load_env_optional("POPPLER_PATH").map(PathBuf::from),
            tesseract_cmd: load_env_optional("TESSERACT_CMD").map(PathBuf::from),
        };

        let chunking = ChunkSettings {
            chunk_size: parse_env_or("CHUNK_SIZE", chunk_defaults.chunk_size)?,
            chunk_overlap: parse_env_or("CHUNK_OVERLAP", chunk_defaults.chunk_overlap)?,
            max_chunks: parse_env_or("MAX_CHUNKS", chunk_defaults.max_chunks)?,
            max_doc_chars: parse_env_or("MAX_DOC_CHARS", chunk_defaults.max_doc_chars)?,
            keyword_window_chars: parse_env_or(
                "KEYWORD_WINDOW_CHARS",
                chunk_defaults.keyword_window_chars,
            )?,
            max_keyword_windows: parse_env_or(
                "MAX_KEYWORD_WINDOWS",
                chunk_defaults.max_keyword_windows,
            )?,
        };

        let config = Self {
            llm,
            extraction,
            chunking,
            data_dir: load_env_optional("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            server_port: parse_env_optional("SERVER_PORT")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Directory that receives per-session upload folders.
    pub fn uploads_root(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.chunk_size == 0 {
            return Err(ConfigError::Inconsistent(
                "CHUNK_SIZE must be greater than zero".into(),
            ));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(ConfigError::Inconsistent(format!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.chunking.max_doc_chars < MIN_CHUNK_CHARS {
            return Err(ConfigError::Inconsistent(format!(
                "MAX_DOC_CHARS ({}) must be at least {MIN_CHUNK_CHARS}",
                self.chunking.max_doc_chars
            )));
        }
        if !(0.0..=1.0).contains(&self.extraction.quality_threshold) {
            return Err(ConfigError::Inconsistent(
                "OCR_QUALITY_THRESHOLD must be within [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.extraction.boilerplate_line_ratio) {
            return Err(ConfigError::Inconsistent(
                "BOILERPLATE_LINE_RATIO must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env_optional<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value,
                })
        })
        .transpose()
}

fn parse_env_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    Ok(parse_env_optional(key)?.unwrap_or(default))
}
