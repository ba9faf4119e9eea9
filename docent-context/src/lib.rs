//! # docent-context
//!
//! Text-side building blocks for docent: turning source files into normalized
//! `(title, text)` pairs, and turning retrieved documents into a grounded prompt.
//!
//! - [`extract`]: per-format extraction (Markdown, HTML, plain text, PDF)
//! - [`prompt`]: grounding prompt assembly for the answer synthesizer

pub mod extract;
pub mod prompt;

// Re-export the main types for external use
pub use extract::{
    DEFAULT_MAX_TEXT_CHARS, DocumentExtractor, DocumentFormat, ExtractError, ExtractedDocument,
    FileExtractor, SUPPORTED_EXTENSIONS, normalize_whitespace, pdf_supported, truncate_chars,
};
pub use prompt::{ContextPassage, DEFAULT_CONTEXT_CHARS, GroundingPromptBuilder};
