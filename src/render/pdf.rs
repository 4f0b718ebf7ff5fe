//! A4 summary PDF written with `lopdf` using the standard Helvetica fonts.
//!
//! Text is WinAnsi-encoded (Windows-1252), which covers French. Line breaking uses the
//! Helvetica advance widths, so wrapping is close to what a viewer shows without embedding fonts.

use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, StringFormat, dictionary};
use thiserror::Error;

use super::markdown::{self, Block, Span, SpanStyle};

const PAGE_WIDTH: f64 = 595.0;
const PAGE_HEIGHT: f64 = 842.0;
/// 2 cm.
const MARGIN: f64 = 57.0;
const TITLE_SIZE: f64 = 16.0;
const BODY_SIZE: f64 = 10.0;
const LINE_SPACING: f64 = 1.3;
const LIST_INDENT: f64 = 14.0;
const BLOCK_GAP: f64 = 4.0;
const BULLET: &str = "•";

/// Errors raised while writing the summary PDF.
#[derive(Debug, Error)]
pub enum RenderError {
    /// PDF serialization failed.
    #[error("PDF generation failed: {0}")]
    Pdf(#[from] lopdf::Error),
    /// The output file could not be written.
    #[error("failed to write PDF: {0}")]
    Io(#[from] std::io::Error),
}

/// Content of the summary PDF.
#[derive(Debug, Clone, Copy)]
pub struct SummaryDocument<'a> {
    /// Title rendered first.
    pub title: &'a str,
    /// `(label, value)` pairs rendered as a list before the summary; empty values read
    /// "Non mentionné". Skipped when empty.
    pub fields: &'a [(&'a str, String)],
    /// Summary body in Markdown.
    pub markdown: &'a str,
}

/// Render `document` and write it to `path`, replacing any existing file.
pub fn write_summary_pdf(path: &Path, document: &SummaryDocument<'_>) -> Result<(), RenderError> {
    let bytes = render_summary_pdf(document)?;
    std::fs::write(path, &bytes)?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "Summary PDF written");
    Ok(())
}

/// Render `document` to PDF bytes.
pub fn render_summary_pdf(document: &SummaryDocument<'_>) -> Result<Vec<u8>, RenderError> {
    let mut layout = Layout::new();
    layout.paragraph(
        &[Span {
            style: SpanStyle::Bold,
            text: document.title.to_string(),
        }],
        TITLE_SIZE,
        MARGIN,
        true,
    );
    layout.gap(BLOCK_GAP * 2.0);

    if !document.fields.is_empty() {
        let heading = heading_spans("Informations extraites");
        layout.paragraph(&heading, heading_size(2), MARGIN, true);
        for (label, value) in document.fields {
            let value = if value.trim().is_empty() {
                "Non mentionné"
            } else {
                value.trim()
            };
            let spans = [
                Span {
                    style: SpanStyle::Bold,
                    text: format!("{label} :"),
                },
                Span {
                    style: SpanStyle::Regular,
                    text: format!(" {value}"),
                },
            ];
            layout.list_item(&spans, false);
        }
        layout.gap(BLOCK_GAP * 2.0);
    }

    for block in markdown::parse(document.markdown) {
        match block {
            Block::Heading { level, spans } => {
                layout.gap(BLOCK_GAP);
                layout.paragraph(&spans, heading_size(level), MARGIN, true);
            }
            Block::List { ordered, items } => {
                for item in &items {
                    layout.list_item(item, ordered);
                }
            }
            Block::Paragraph(spans) => layout.paragraph(&spans, BODY_SIZE, MARGIN, false),
            Block::Preformatted(lines) => {
                for line in &lines {
                    if line.trim().is_empty() {
                        layout.gap(BODY_SIZE * LINE_SPACING);
                        continue;
                    }
                    let spans = [Span {
                        style: SpanStyle::Regular,
                        text: line.clone(),
                    }];
                    layout.paragraph(&spans, BODY_SIZE, MARGIN + LIST_INDENT, false);
                }
            }
        }
        layout.gap(BLOCK_GAP);
    }

    layout.into_pdf()
}

fn heading_spans(text: &str) -> Vec<Span> {
    vec![Span {
        style: SpanStyle::Bold,
        text: text.to_string(),
    }]
}

fn heading_size(level: u8) -> f64 {
    match level {
        1 => 14.0,
        2 => 12.0,
        _ => 11.0,
    }
}

fn font_name(style: SpanStyle) -> &'static str {
    match style {
        SpanStyle::Regular => "F1",
        SpanStyle::Bold => "F2",
        SpanStyle::Italic => "F3",
    }
}

/// A word with its style and whether whitespace precedes it.
#[derive(Debug, Clone, PartialEq)]
struct Word {
    style: SpanStyle,
    text: String,
    space_before: bool,
}

/// A styled run placed on a line at `x` (relative to the line start).
#[derive(Debug, Clone, PartialEq)]
struct Run {
    style: SpanStyle,
    text: String,
    x: f64,
}

struct Layout {
    pages: Vec<Vec<Operation>>,
    y: f64,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn gap(&mut self, amount: f64) {
        self.y -= amount;
    }

    fn advance(&mut self, height: f64) {
        if self.y - height < MARGIN {
            self.pages.push(Vec::new());
            self.y = PAGE_HEIGHT - MARGIN;
        }
        self.y -= height;
    }

    fn paragraph(&mut self, spans: &[Span], size: f64, left: f64, force_bold: bool) {
        let width = PAGE_WIDTH - MARGIN - left;
        for line in wrap(spans, size, width, force_bold) {
            self.advance(size * LINE_SPACING);
            self.draw_line(&line, size, left);
        }
    }

    fn list_item(&mut self, spans: &[Span], ordered: bool) {
        let left = MARGIN + LIST_INDENT;
        let width = PAGE_WIDTH - MARGIN - left;
        for (index, line) in wrap(spans, BODY_SIZE, width, false).into_iter().enumerate() {
            self.advance(BODY_SIZE * LINE_SPACING);
            if index == 0 && !ordered {
                self.draw_run(SpanStyle::Regular, BULLET, BODY_SIZE, MARGIN + 4.0);
            }
            self.draw_line(&line, BODY_SIZE, left);
        }
    }

    fn draw_line(&mut self, runs: &[Run], size: f64, left: f64) {
        for run in runs {
            self.draw_run(run.style, &run.text, size, left + run.x);
        }
    }

    fn draw_run(&mut self, style: SpanStyle, text: &str, size: f64, x: f64) {
        let y = self.y;
        if let Some(page) = self.pages.last_mut() {
            page.extend([
                Operation::new("BT", vec![]),
                Operation::new(
                    "Tf",
                    vec![font_name(style).into(), (size.round() as i64).into()],
                ),
                Operation::new(
                    "Td",
                    vec![(x.round() as i64).into(), (y.round() as i64).into()],
                ),
                Operation::new(
                    "Tj",
                    vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
                ),
                Operation::new("ET", vec![]),
            ]);
        }
    }

    fn into_pdf(self) -> Result<Vec<u8>, RenderError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut fonts = lopdf::Dictionary::new();
        let faces = [
            ("F1", "Helvetica"),
            ("F2", "Helvetica-Bold"),
            ("F3", "Helvetica-Oblique"),
        ];
        for (name, base) in faces {
            let font_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => base,
                "Encoding" => "WinAnsiEncoding",
            });
            fonts.set(name, font_id);
        }
        let resources_id = doc.add_object(dictionary! { "Font" => fonts });

        let mut kids = Vec::with_capacity(self.pages.len());
        for operations in self.pages {
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::from(page_id));
        }
        let count = kids.len() as i64;
        let media_box: Vec<Object> = vec![
            0.into(),
            0.into(),
            (PAGE_WIDTH as i64).into(),
            (PAGE_HEIGHT as i64).into(),
        ];
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => media_box,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Producer" => Object::string_literal("dceassist"),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)?;
        Ok(bytes)
    }
}

/// Break spans into words, remembering where whitespace separated them.
fn words(spans: &[Span], force_bold: bool) -> Vec<Word> {
    let mut words = Vec::new();
    let mut pending_space = false;
    for span in spans {
        let style = if force_bold { SpanStyle::Bold } else { span.style };
        let mut current = String::new();
        for c in span.text.chars() {
            if c.is_whitespace() {
                if !current.is_empty() {
                    words.push(Word {
                        style,
                        text: std::mem::take(&mut current),
                        space_before: pending_space,
                    });
                }
                pending_space = true;
            } else {
                current.push(c);
            }
        }
        if !current.is_empty() {
            words.push(Word {
                style,
                text: current,
                space_before: pending_space,
            });
            pending_space = false;
        }
    }
    words
}

/// Greedy line breaking; words wider than the line are split by characters.
fn wrap(spans: &[Span], size: f64, width: f64, force_bold: bool) -> Vec<Vec<Run>> {
    let mut lines: Vec<Vec<Run>> = Vec::new();
    let mut line: Vec<Run> = Vec::new();
    let mut cursor = 0.0;

    for word in words(spans, force_bold) {
        for piece in split_long_word(&word.text, word.style, size, width) {
            let space = if word.space_before && !line.is_empty() {
                text_width(" ", word.style, size)
            } else {
                0.0
            };
            let piece_width = text_width(&piece, word.style, size);
            if !line.is_empty() && cursor + space + piece_width > width {
                lines.push(std::mem::take(&mut line));
                cursor = 0.0;
            }
            let leading = if line.is_empty() { 0.0 } else { space };
            match line.last_mut() {
                Some(run) if run.style == word.style => {
                    if leading > 0.0 {
                        run.text.push(' ');
                    }
                    run.text.push_str(&piece);
                }
                _ => {
                    let text = if leading > 0.0 && !line.is_empty() {
                        format!(" {piece}")
                    } else {
                        piece.clone()
                    };
                    line.push(Run {
                        style: word.style,
                        text,
                        x: cursor,
                    });
                }
            }
            cursor += leading + piece_width;
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

fn split_long_word(word: &str, style: SpanStyle, size: f64, width: f64) -> Vec<String> {
    if text_width(word, style, size) <= width {
        return vec![word.to_string()];
    }
    let mut pieces = Vec::new();
    let mut current = String::new();
    for c in word.chars() {
        let candidate_width =
            text_width(&current, style, size) + char_width(c, style) * size / 1000.0;
        if !current.is_empty() && candidate_width > width {
            pieces.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

fn text_width(text: &str, style: SpanStyle, size: f64) -> f64 {
    text.chars().map(|c| char_width(c, style)).sum::<f64>() * size / 1000.0
}

/// Helvetica advance width in 1/1000 em; bold is approximated as 10% wider.
fn char_width(c: char, style: SpanStyle) -> f64 {
    let regular = match c {
        ' ' | '!' | ',' | '.' | '/' | ':' | ';' | '[' | '\\' | ']' | 'f' | 't' | 'I' => 278.0,
        '"' => 355.0,
        '\'' => 191.0,
        '(' | ')' | '-' | '`' | 'r' => 333.0,
        '*' => 389.0,
        '+' | '<' | '=' | '>' | '~' => 584.0,
        '%' => 889.0,
        '&' | 'A' | 'B' | 'E' | 'K' | 'P' | 'S' | 'V' | 'X' | 'Y' => 667.0,
        '@' => 1015.0,
        'C' | 'D' | 'H' | 'N' | 'R' | 'U' => 722.0,
        'F' | 'T' | 'Z' => 611.0,
        'G' | 'O' | 'Q' => 778.0,
        'J' | 'c' | 'k' | 's' | 'v' | 'x' | 'y' | 'z' => 500.0,
        'L' => 556.0,
        'M' | 'm' => 833.0,
        'W' => 944.0,
        '^' => 469.0,
        'i' | 'j' | 'l' => 222.0,
        'w' => 722.0,
        '{' | '}' => 334.0,
        '|' => 260.0,
        '•' => 350.0,
        '’' | '‘' => 222.0,
        '…' | '—' => 1000.0,
        c if c.is_uppercase() => 667.0,
        _ => 556.0,
    };
    match style {
        SpanStyle::Bold => regular * 1.1,
        SpanStyle::Regular | SpanStyle::Italic => regular,
    }
}

/// Encode text as Windows-1252; characters outside the code page become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{0000}'..='\u{007F}' => c as u8,
            '\u{00A0}'..='\u{00FF}' => c as u32 as u8,
            '\u{202F}' | '\u{2007}' => 0xA0,
            '€' => 0x80,
            '‚' => 0x82,
            'ƒ' => 0x83,
            '„' => 0x84,
            '…' => 0x85,
            '†' => 0x86,
            '‡' => 0x87,
            'ˆ' => 0x88,
            '‰' => 0x89,
            'Š' => 0x8A,
            '‹' => 0x8B,
            'Œ' => 0x8C,
            'Ž' => 0x8E,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '˜' => 0x98,
            '™' => 0x99,
            'š' => 0x9A,
            '›' => 0x9B,
            'œ' => 0x9C,
            'ž' => 0x9E,
            'Ÿ' => 0x9F,
            _ => b'?',
        })
        .collect()
}
