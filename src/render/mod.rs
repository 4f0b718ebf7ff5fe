//! Rendering of the final synthesis to PDF.

pub mod markdown;
pub mod pdf;

pub use pdf::{RenderError, SummaryDocument, render_summary_pdf, write_summary_pdf};
