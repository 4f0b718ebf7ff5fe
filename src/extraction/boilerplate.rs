//! Removal of running headers and footers repeated across pages.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

/// Documents with fewer pages than this never have lines stripped.
const MIN_PAGES_FOR_STRIPPING: usize = 3;
/// Longer lines are body text, even when repeated.
const MAX_BOILERPLATE_LINE_CHARS: usize = 120;

/// Strip lines that appear on at least `ratio` of the pages.
///
/// Lines are compared after trimming, lowercasing and collapsing whitespace. Digits are folded
/// only in page-number lines, so `Page 3 / 12` and `Page 4 / 12` count as the same line while
/// dates and numbered headings stay distinct. Each page contributes at most once per line.
pub fn strip_repeated_lines(pages: &[String], ratio: f64) -> Vec<String> {
    if pages.len() < MIN_PAGES_FOR_STRIPPING {
        return pages.to_vec();
    }

    let mut page_counts: HashMap<String, usize> = HashMap::new();
    for page in pages {
        let keys: HashSet<String> = page.lines().filter_map(line_key).collect();
        for key in keys {
            *page_counts.entry(key).or_default() += 1;
        }
    }

    let threshold = ((pages.len() as f64) * ratio).ceil().max(2.0) as usize;
    let repeated: HashSet<String> = page_counts
        .into_iter()
        .filter(|(_, count)| *count >= threshold)
        .map(|(key, _)| key)
        .collect();
    if repeated.is_empty() {
        return pages.to_vec();
    }
    tracing::debug!(
        repeated_lines = repeated.len(),
        threshold,
        pages = pages.len(),
        "Stripping running headers/footers"
    );

    pages
        .iter()
        .map(|page| {
            page.lines()
                .filter(|line| line_key(line).is_none_or(|key| !repeated.contains(&key)))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect()
}

fn line_key(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_BOILERPLATE_LINE_CHARS {
        return None;
    }
    let key = trimmed
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if page_number_line().is_match(&key) {
        Some(key.replace(|c: char| c.is_ascii_digit(), "#"))
    } else {
        Some(key)
    }
}

fn page_number_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(page|p\.?)?\s*\d+(\s*(/|sur)\s*\d+)?$")
            .expect("page number pattern is a valid regex")
    })
}
