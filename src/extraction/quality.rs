//! Heuristic quality score for extracted page text.
//!
//! The score decides whether a page's embedded text is good enough or must go through OCR, and
//! which of two OCR attempts to keep. It only looks at surface statistics: garbage produced by
//! broken font encodings or bad scans is dominated by symbols, repeated fragments and short
//! tokens, while real tender prose has varied, longer words.

use std::collections::HashSet;

const ALNUM_WEIGHT: f64 = 0.35;
const UNIQUE_WEIGHT: f64 = 0.35;
const LONG_WORD_WEIGHT: f64 = 0.30;
const PUNCTUATION_PENALTY: f64 = 0.5;
const NOISE_PENALTY: f64 = 0.5;

const TYPOGRAPHIC_PUNCTUATION: &[char] = &[
    '«', '»', '’', '‘', '“', '”', '…', '–', '—', '•', '·', '§', '¤', '|',
];

/// Tokens that carry no content on their own (running headers, tables of contents).
pub const NOISE_TOKENS: &[&str] = &[
    "page", "pages", "sommaire", "annexe", "suite", "fin", "total", "p", "pp",
];

/// Score a page's text in `[0, 1]`; empty or whitespace-only text scores `0`.
pub fn page_quality(text: &str) -> f64 {
    let visible: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if visible.is_empty() {
        return 0.0;
    }

    let alnum = visible.iter().filter(|c| c.is_alphanumeric()).count();
    let punctuation = visible
        .iter()
        .filter(|c| c.is_ascii_punctuation() || is_typographic_punctuation(**c))
        .count();
    let alnum_ratio = alnum as f64 / visible.len() as f64;
    let punctuation_density = punctuation as f64 / visible.len() as f64;

    let words = word_tokens(text);
    let (unique_ratio, long_ratio, noise_density) = if words.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        let total = words.len() as f64;
        let unique: HashSet<&str> = words.iter().map(String::as_str).collect();
        let long = words.iter().filter(|word| word.chars().count() > 3).count();
        let noise = words
            .iter()
            .filter(|word| NOISE_TOKENS.contains(&word.as_str()))
            .count();
        (
            unique.len() as f64 / total,
            long as f64 / total,
            noise as f64 / total,
        )
    };

    let score = ALNUM_WEIGHT * alnum_ratio + UNIQUE_WEIGHT * unique_ratio
        + LONG_WORD_WEIGHT * long_ratio
        - PUNCTUATION_PENALTY * punctuation_density
        - NOISE_PENALTY * noise_density;
    score.clamp(0.0, 1.0)
}

/// Lowercased word-like tokens of at least two characters.
fn word_tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

fn is_typographic_punctuation(c: char) -> bool {
    TYPOGRAPHIC_PUNCTUATION.contains(&c)
}
