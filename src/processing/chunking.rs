//! Chunk planning for LLM extraction.
//!
//! A document becomes two kinds of chunks:
//!
//! - Keyword windows: fixed-width spans centered on tender markers (deadlines, award criteria,
//!   contacts, procedure). They come first so the facts most forms need are always seen.
//! - Generic chunks: the text is trimmed to a character budget by sampling head, middle and tail,
//!   split into overlapping windows, then thinned to an evenly spaced subset.
//!
//! Sizes are in characters. The chunk size itself is derived from the model context window:
//! prompt overhead is measured with `tiktoken-rs` and the rest converted with a chars-per-token
//! ratio suited to French prose.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Error as TokenizerError;
use regex::Regex;
use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, r50k_base};

use super::types::ChunkingError;
use crate::config::{ChunkSettings, LlmSettings};
use crate::sampling::select_evenly;

type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Floor for the derived chunk size, in characters.
pub const MIN_CHUNK_CHARS: usize = 1500;
/// Average characters per token for French tender prose.
const CHARS_PER_TOKEN: f64 = 3.5;
const TRIM_SEPARATOR: &str = "\n[...]\n";

/// Markers around which keyword windows are cut. Matched case-insensitively.
pub const KEYWORD_MARKERS: &[&str] = &[
    "date limite",
    "remise des offres",
    "date de remise",
    "heure limite",
    "critères d'attribution",
    "critères de jugement",
    "jugement des offres",
    "pondération",
    "valeur technique",
    "mémoire technique",
    "visite obligatoire",
    "visite du site",
    "maître d'ouvrage",
    "maître d'œuvre",
    "adresse",
    "contact",
    "renseignements",
    "procédure adaptée",
    "appel d'offres",
    "délai d'exécution",
    "durée du marché",
    "montant",
    "variantes",
];

/// Keyword windows and generic chunks for one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkPlan {
    /// Spans centered on marker occurrences, in text order.
    pub keyword_windows: Vec<String>,
    /// Evenly selected overlapping windows of the trimmed text.
    pub generic: Vec<String>,
}

impl ChunkPlan {
    /// Plan chunks for `text` using `chunk_size` characters per generic chunk.
    pub fn build(text: &str, settings: &ChunkSettings, chunk_size: usize) -> Self {
        if text.trim().is_empty() {
            return Self::default();
        }
        let keyword_windows = keyword_windows(
            text,
            settings.keyword_window_chars,
            settings.max_keyword_windows,
        );
        let chunk_size = chunk_size.max(1);
        let overlap = settings.chunk_overlap.min(chunk_size - 1);
        let trimmed = trim_to_budget(text, settings.max_doc_chars);
        let windows = split_overlapping(&trimmed, chunk_size, overlap);
        let generic = select_evenly(windows.len(), settings.max_chunks)
            .into_iter()
            .map(|index| windows[index].clone())
            .collect();
        Self {
            keyword_windows,
            generic,
        }
    }

    /// Keyword windows first, then generic chunks, dropping exact duplicates and blank chunks.
    pub fn into_chunks(self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.keyword_windows
            .into_iter()
            .chain(self.generic)
            .filter(|chunk| !chunk.trim().is_empty())
            .filter(|chunk| seen.insert(chunk.clone()))
            .collect()
    }
}

/// Derive the generic chunk size from the model context budget.
///
/// The context window minus the measured prompt overhead and the chunk output budget gives the
/// input tokens available; converted to characters it is clamped to
/// `[MIN_CHUNK_CHARS, settings.chunk_size]`. A configured size below the floor wins.
pub fn determine_chunk_size(
    llm: &LlmSettings,
    settings: &ChunkSettings,
    prompt_overhead_tokens: usize,
) -> usize {
    let available_tokens = (llm.num_ctx as usize)
        .saturating_sub(prompt_overhead_tokens)
        .saturating_sub(llm.num_predict_chunk as usize);
    let estimated = (available_tokens as f64 * CHARS_PER_TOKEN) as usize;
    let ceiling = settings.chunk_size.max(1);
    let floor = MIN_CHUNK_CHARS.min(ceiling);
    estimated.clamp(floor, ceiling)
}

/// Count tokens of `text` with the model's tokenizer, or `cl100k_base` for local model names.
pub fn count_prompt_tokens(model: &str, text: &str) -> usize {
    build_token_counter(model).as_ref()(text)
}

/// Build a token counter for `model`.
///
/// Local Ollama names (`mistral`, `llama3`, ...) are unknown to `tiktoken-rs`; those fall back to
/// an encoding name lookup, then `cl100k_base`, and finally to whitespace counting.
fn build_token_counter(model: &str) -> TokenCounter {
    match build_tiktoken_counter(model) {
        Ok(counter) => counter,
        Err(error) => {
            tracing::warn!(
                model,
                error = %error,
                "Tokenizer unavailable; falling back to whitespace counter"
            );
            default_token_counter()
        }
    }
}

fn build_tiktoken_counter(model: &str) -> Result<TokenCounter, ChunkingError> {
    let normalized = model.trim();
    let target = if normalized.is_empty() {
        "cl100k_base"
    } else {
        normalized
    };
    let encoding = resolve_encoding(target).map_err(|source| ChunkingError::Tokenizer {
        model: target.to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);
    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            match model {
                "o200k_base" => o200k_base(),
                "p50k_base" => p50k_base(),
                "r50k_base" | "gpt2" => r50k_base(),
                _ => cl100k_base(),
            }
        }
    }
}

fn default_token_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

/// Cut `width`-character windows centered on marker occurrences, at most `max_windows`.
///
/// An occurrence whose center falls inside an already accepted window is skipped.
pub fn keyword_windows(text: &str, width: usize, max_windows: usize) -> Vec<String> {
    if width == 0 || max_windows == 0 {
        return Vec::new();
    }
    let Some(pattern) = marker_pattern() else {
        return Vec::new();
    };
    let chars: Vec<char> = text.chars().collect();
    let byte_offsets: Vec<usize> = text.char_indices().map(|(offset, _)| offset).collect();
    let to_char_index = |byte: usize| byte_offsets.partition_point(|&offset| offset < byte);

    let half = width / 2;
    let mut accepted: Vec<(usize, usize)> = Vec::new();
    for found in pattern.find_iter(text) {
        if accepted.len() >= max_windows {
            break;
        }
        let start = to_char_index(found.start());
        let end = to_char_index(found.end());
        let center = start + (end - start) / 2;
        if accepted
            .iter()
            .any(|(window_start, window_end)| (*window_start..*window_end).contains(&center))
        {
            continue;
        }
        let window_start = center.saturating_sub(half);
        let window_end = (window_start + width).min(chars.len());
        accepted.push((window_start, window_end));
    }

    accepted
        .into_iter()
        .map(|(start, end)| chars[start..end].iter().collect::<String>().trim().to_string())
        .collect()
}

fn marker_pattern() -> Option<Regex> {
    let alternation = KEYWORD_MARKERS
        .iter()
        .map(|marker| regex::escape(marker).replace('\'', "['’]"))
        .collect::<Vec<_>>()
        .join("|");
    match Regex::new(&format!("(?i){alternation}")) {
        Ok(pattern) => Some(pattern),
        Err(err) => {
            tracing::error!(error = %err, "Invalid keyword marker pattern");
            None
        }
    }
}

/// Trim `text` to about `max_chars` characters keeping 40% head, 20% middle and 40% tail.
///
/// Text within budget is returned unchanged.
pub fn trim_to_budget(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }
    let separators = 2 * TRIM_SEPARATOR.chars().count();
    let budget = max_chars.saturating_sub(separators);
    let head_len = budget * 2 / 5;
    let middle_len = budget / 5;
    let tail_len = budget - head_len - middle_len;

    let middle_start = (chars.len() / 2).saturating_sub(middle_len / 2);
    let tail_start = chars.len() - tail_len;
    let head: String = chars[..head_len].iter().collect();
    let middle: String = chars[middle_start..middle_start + middle_len].iter().collect();
    let tail: String = chars[tail_start..].iter().collect();
    format!("{head}{TRIM_SEPARATOR}{middle}{TRIM_SEPARATOR}{tail}")
}

/// Split `text` into `size`-character windows, each sharing `overlap` characters with the
/// previous one. The last window ends at the end of the text.
pub fn split_overlapping(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || size == 0 {
        return Vec::new();
    }
    let step = size - overlap.min(size - 1);
    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    windows
}
