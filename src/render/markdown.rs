//! Minimal Markdown block and inline parsing for the summary PDF.
//!
//! Supports `#`/`##`/`###` headings, bullet runs (`- `, `* `, `1. `) and paragraphs, with
//! `**bold**` and `*italic*` inline. Fenced blocks are kept line by line, except
//! ```` ```markdown ```` fences, whose markers are dropped so a wrapped answer still renders.
//! Everything else is kept as plain text.

use std::sync::OnceLock;

use regex::Regex;

/// Font style of an inline span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStyle {
    /// Regular text.
    Regular,
    /// `**bold**`.
    Bold,
    /// `*italic*`.
    Italic,
}

/// Styled run of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// Font style.
    pub style: SpanStyle,
    /// Text content without markers.
    pub text: String,
}

impl Span {
    fn new(style: SpanStyle, text: impl Into<String>) -> Self {
        Self {
            style,
            text: text.into(),
        }
    }
}

/// One laid-out block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Heading of level 1 to 3.
    Heading {
        /// 1 for `#`, 3 for `###` and deeper.
        level: u8,
        /// Heading text.
        spans: Vec<Span>,
    },
    /// Contiguous list items.
    List {
        /// Items written `1. ` keep their numbering.
        ordered: bool,
        /// One span list per item.
        items: Vec<Vec<Span>>,
    },
    /// Consecutive text lines joined with spaces.
    Paragraph(Vec<Span>),
    /// Lines of a fenced block, unparsed.
    Preformatted(Vec<String>),
}

enum LineKind<'a> {
    Blank,
    Fence(&'a str),
    Rule,
    Heading(u8, &'a str),
    Item(bool, &'a str),
    Text(&'a str),
}

fn ordered_item() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+)[.)]\s+(.*)$").expect("ordered item pattern is a valid regex")
    })
}

fn inline_markers() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\*\*(.+?)\*\*|\*([^*\s](?:[^*]*[^*\s])?)\*|`([^`]+)`")
            .expect("inline marker pattern is a valid regex")
    })
}

fn classify(line: &str) -> LineKind<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if let Some(info) = trimmed.strip_prefix("```") {
        return LineKind::Fence(info.trim());
    }
    if trimmed.len() >= 3 && trimmed.chars().all(|c| c == '-' || c == '_' || c == '=') {
        return LineKind::Rule;
    }
    if trimmed.starts_with('#') {
        let level = trimmed.chars().take_while(|c| *c == '#').count();
        let rest = &trimmed[level..];
        if rest.starts_with(' ') || rest.is_empty() {
            return LineKind::Heading(level.min(3) as u8, rest.trim());
        }
    }
    if let Some(rest) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
        return LineKind::Item(false, rest.trim());
    }
    if ordered_item().is_match(trimmed) {
        return LineKind::Item(true, trimmed);
    }
    LineKind::Text(trimmed)
}

fn is_markdown_info(info: &str) -> bool {
    info.eq_ignore_ascii_case("markdown") || info.eq_ignore_ascii_case("md")
}

/// Parse Markdown into blocks.
pub fn parse(markdown: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut list: Option<(bool, Vec<Vec<Span>>)> = None;
    let mut code: Option<Vec<String>> = None;
    let mut in_markdown_fence = false;

    fn flush_paragraph(paragraph: &mut Vec<&str>, blocks: &mut Vec<Block>) {
        if !paragraph.is_empty() {
            blocks.push(Block::Paragraph(parse_inline(&paragraph.join(" "))));
            paragraph.clear();
        }
    }
    fn flush_list(list: &mut Option<(bool, Vec<Vec<Span>>)>, blocks: &mut Vec<Block>) {
        if let Some((ordered, items)) = list.take() {
            blocks.push(Block::List { ordered, items });
        }
    }
    fn flush_code(code: &mut Option<Vec<String>>, blocks: &mut Vec<Block>) {
        if let Some(lines) = code.take() {
            if lines.iter().any(|line| !line.trim().is_empty()) {
                blocks.push(Block::Preformatted(lines));
            }
        }
    }

    for line in markdown.lines() {
        if let Some(lines) = code.as_mut() {
            if line.trim_start().starts_with("```") {
                flush_code(&mut code, &mut blocks);
            } else {
                lines.push(line.trim_end().to_string());
            }
            continue;
        }
        match classify(line) {
            LineKind::Fence(info) => {
                flush_paragraph(&mut paragraph, &mut blocks);
                flush_list(&mut list, &mut blocks);
                if in_markdown_fence {
                    in_markdown_fence = false;
                } else if is_markdown_info(info) {
                    in_markdown_fence = true;
                } else {
                    code = Some(Vec::new());
                }
            }
            LineKind::Blank | LineKind::Rule => {
                flush_paragraph(&mut paragraph, &mut blocks);
                flush_list(&mut list, &mut blocks);
            }
            LineKind::Heading(level, text) => {
                flush_paragraph(&mut paragraph, &mut blocks);
                flush_list(&mut list, &mut blocks);
                if !text.is_empty() {
                    blocks.push(Block::Heading {
                        level,
                        spans: parse_inline(text),
                    });
                }
            }
            LineKind::Item(ordered, text) => {
                flush_paragraph(&mut paragraph, &mut blocks);
                match &mut list {
                    Some((current, items)) if *current == ordered => {
                        items.push(parse_inline(text))
                    }
                    _ => {
                        flush_list(&mut list, &mut blocks);
                        list = Some((ordered, vec![parse_inline(text)]));
                    }
                }
            }
            LineKind::Text(text) => {
                // A wrapped continuation line belongs to the previous list item.
                if line.starts_with(char::is_whitespace) {
                    if let Some(last) = list.as_mut().and_then(|(_, items)| items.last_mut()) {
                        last.push(Span::new(SpanStyle::Regular, " "));
                        last.extend(parse_inline(text));
                        continue;
                    }
                }
                flush_list(&mut list, &mut blocks);
                paragraph.push(text);
            }
        }
    }
    flush_paragraph(&mut paragraph, &mut blocks);
    flush_list(&mut list, &mut blocks);
    flush_code(&mut code, &mut blocks);
    blocks
}

/// Split a line into styled spans, dropping the Markdown markers.
pub fn parse_inline(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut cursor = 0;
    for captures in inline_markers().captures_iter(text) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        if whole.start() > cursor {
            spans.push(Span::new(SpanStyle::Regular, &text[cursor..whole.start()]));
        }
        if let Some(bold) = captures.get(1) {
            spans.push(Span::new(SpanStyle::Bold, bold.as_str()));
        } else if let Some(italic) = captures.get(2) {
            spans.push(Span::new(SpanStyle::Italic, italic.as_str()));
        } else if let Some(code) = captures.get(3) {
            spans.push(Span::new(SpanStyle::Regular, code.as_str()));
        }
        cursor = whole.end();
    }
    if cursor < text.len() {
        spans.push(Span::new(SpanStyle::Regular, &text[cursor..]));
    }
    spans
}
