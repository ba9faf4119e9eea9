//! This module turns raw document bytes into the `(title, text)` pair that the index
//! stores and embeds.
//!
//! Every supported format goes through the same three stages:
//!
//! 1.  **Decoding**: Markdown, HTML and plain text are decoded as UTF-8, silently
//!     dropping invalid sequences. PDF bytes are handed to `pdf-extract` when the
//!     `pdf` feature is enabled.
//! 2.  **Title discovery**: Markdown uses its first ATX heading (or first non-empty
//!     line), HTML uses `<title>` or the first `<h1>`, PDF uses the file name and
//!     plain text uses the file stem. A title is never empty.
//! 3.  **Normalization**: all whitespace runs collapse to a single space and the
//!     result is truncated to a character budget, so the text that gets embedded is
//!     exactly the text that gets stored.
//!
//! ```
//! use docent_context::extract::{DocumentExtractor, DocumentFormat, FileExtractor};
//!
//! let extractor = FileExtractor::default();
//! let doc = extractor
//!     .extract("notes.md", b"# Title\nHello   world", DocumentFormat::Markdown)
//!     .unwrap()
//!     .expect("non-empty document");
//!
//! assert_eq!(doc.title, "Title");
//! assert_eq!(doc.text, "# Title Hello world");
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

/// File extensions (lowercase, without the dot) that the indexer picks up.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["md", "markdown", "html", "htm", "txt", "pdf"];

/// Default cap on stored document text, in characters.
pub const DEFAULT_MAX_TEXT_CHARS: usize = 10_000;

/// Maximum length of a title taken from the first line of a Markdown file.
const MAX_LINE_TITLE_CHARS: usize = 120;

/// Elements whose content never contributes to the extracted text.
const SKIPPED_HTML_ELEMENTS: &[&str] = &["script", "style", "noscript", "meta"];

static MARKDOWN_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,6}\s*(.+)").expect("valid heading regex"));
static HTML_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title regex"));
static HTML_H1: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").expect("valid h1 regex"));
static HTML_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"));
static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));
static HTML_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("valid entity regex")
});
static HTML_SKIPPED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    SKIPPED_HTML_ELEMENTS
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>"))
                .expect("valid skipped element regex")
        })
        .collect()
});

/// Format of a source document, derived from its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Markdown,
    Html,
    Text,
    Pdf,
}

impl DocumentFormat {
    /// Map a file extension (case-insensitive, without the dot) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "md" | "markdown" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::Html),
            "txt" => Some(Self::Text),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// Map a path to a format using its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Whether this build can extract the format at all.
    pub fn is_available(&self) -> bool {
        match self {
            Self::Pdf => pdf_supported(),
            _ => true,
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentFormat::Markdown => write!(f, "markdown"),
            DocumentFormat::Html => write!(f, "html"),
            DocumentFormat::Text => write!(f, "text"),
            DocumentFormat::Pdf => write!(f, "pdf"),
        }
    }
}

/// Returns `true` when PDF extraction was compiled in.
pub const fn pdf_supported() -> bool {
    cfg!(feature = "pdf")
}

/// Errors raised while extracting a document.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The format is known but its backend was not compiled in
    #[error("{format} extraction is not available in this build")]
    FormatUnavailable { format: DocumentFormat },

    /// The PDF backend rejected the file
    #[error("PDF extraction failed: {message}")]
    Pdf { message: String },
}

/// Title and normalized text of one source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub title: String,
    pub text: String,
    pub format: DocumentFormat,
}

/// Converts the bytes of a file into an [`ExtractedDocument`].
///
/// `Ok(None)` means the file was readable but produced no text; such files are not
/// indexed.
pub trait DocumentExtractor: Send + Sync {
    fn extract(
        &self,
        file_name: &str,
        bytes: &[u8],
        format: DocumentFormat,
    ) -> Result<Option<ExtractedDocument>, ExtractError>;
}

/// The default extractor used by the indexer.
#[derive(Debug, Clone)]
pub struct FileExtractor {
    max_text_chars: usize,
}

impl Default for FileExtractor {
    fn default() -> Self {
        Self {
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
        }
    }
}

impl FileExtractor {
    pub fn new(max_text_chars: usize) -> Self {
        Self { max_text_chars }
    }

    pub fn max_text_chars(&self) -> usize {
        self.max_text_chars
    }
}

impl DocumentExtractor for FileExtractor {
    fn extract(
        &self,
        file_name: &str,
        bytes: &[u8],
        format: DocumentFormat,
    ) -> Result<Option<ExtractedDocument>, ExtractError> {
        let (title, raw_text) = match format {
            DocumentFormat::Pdf => (Some(file_name.to_string()), pdf_text(bytes)?),
            DocumentFormat::Html => {
                let raw = decode_lossy(bytes);
                (html_title(&raw), html_text(&raw))
            }
            DocumentFormat::Markdown => {
                let raw = decode_lossy(bytes);
                (markdown_title(&raw), raw)
            }
            DocumentFormat::Text => (None, decode_lossy(bytes)),
        };

        let text = truncate_chars(&normalize_whitespace(&raw_text), self.max_text_chars);
        if text.is_empty() {
            tracing::debug!("No text extracted from {}", file_name);
            return Ok(None);
        }

        let title = title
            .map(|t| normalize_whitespace(&t))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| fallback_title(file_name));

        Ok(Some(ExtractedDocument {
            title,
            text,
            format,
        }))
    }
}

/// Collapse every whitespace run to one space and trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep at most `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// File stem, or the whole name when there is no stem.
fn fallback_title(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    if stem.is_empty() {
        file_name.to_string()
    } else {
        stem
    }
}

fn decode_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).replace(char::REPLACEMENT_CHARACTER, "")
}

fn markdown_title(raw: &str) -> Option<String> {
    for line in raw.lines() {
        if let Some(caps) = MARKDOWN_HEADING.captures(line) {
            let heading = caps[1].trim();
            return (!heading.is_empty()).then(|| heading.to_string());
        }
    }
    raw.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| truncate_chars(line, MAX_LINE_TITLE_CHARS))
}

fn html_title(raw: &str) -> Option<String> {
    if let Some(caps) = HTML_TITLE.captures(raw) {
        return Some(decode_entities(&normalize_whitespace(&caps[1])));
    }
    HTML_H1.captures(raw).map(|caps| {
        let inner = HTML_TAG.replace_all(&caps[1], "");
        decode_entities(inner.trim())
    })
}

fn html_text(raw: &str) -> String {
    let mut text = HTML_COMMENT.replace_all(raw, " ").into_owned();
    for skipped in HTML_SKIPPED.iter() {
        text = skipped.replace_all(&text, " ").into_owned();
    }
    let text = HTML_TAG.replace_all(&text, " ");
    decode_entities(&text)
}

fn decode_entities(text: &str) -> String {
    HTML_ENTITY
        .replace_all(text, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                }
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// `pdf-extract` panics on some malformed files (undeclared fonts, broken
/// streams); those surface as an ordinary extraction error.
#[cfg(feature = "pdf")]
fn pdf_text(bytes: &[u8]) -> Result<String, ExtractError> {
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(result) => result.map_err(|e| ExtractError::Pdf {
            message: e.to_string(),
        }),
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ExtractError::Pdf {
                message: format!("PDF parser panicked: {reason}"),
            })
        }
    }
}

#[cfg(not(feature = "pdf"))]
fn pdf_text(_bytes: &[u8]) -> Result<String, ExtractError> {
    Err(ExtractError::FormatUnavailable {
        format: DocumentFormat::Pdf,
    })
}
