#![deny(missing_docs)]

//! Core library for the DCE assistant: OCR-aware text extraction, chunked LLM synthesis and
//! PDF export of French public-tender documents.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// PDF text extraction, quality scoring and OCR fallback.
pub mod extraction;
/// Client for the local text-generation service.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Analysis metrics helpers.
pub mod metrics;
/// Chunking, generation tiers and analysis orchestration.
pub mod processing;
/// Prompt templates for the three generation tiers.
pub mod prompts;
/// Markdown parsing and summary PDF rendering.
pub mod render;
/// Evenly spaced selection helpers.
pub mod sampling;
/// Per-user upload sessions.
pub mod session;
