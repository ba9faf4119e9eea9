//! The document record persisted in the index.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// One indexed source file.
///
/// `source` is the natural key: the path relative to the scan root with `/`
/// separators. A record with an `embedding` is complete; one without is pending work
/// for a later build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub source: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Hex blake3 of the raw source bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl Document {
    /// Create a pending document. The id is derived from `source`.
    pub fn new(
        source: impl Into<String>,
        title: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let source = source.into();
        Self {
            id: slug_id(&source),
            title: title.into(),
            source,
            text: text.into(),
            embedding: None,
            content_hash: None,
        }
    }

    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn is_complete(&self) -> bool {
        self.embedding.is_some()
    }
}

/// Stable identifier for a source path: lowercase, every run of characters outside
/// `[a-z0-9]` collapsed to one `_`, trimmed of `_`, `"doc"` when nothing remains.
pub fn slug_id(source: &str) -> String {
    let mut id = String::with_capacity(source.len());
    let mut pending_sep = false;
    for c in source.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_sep && !id.is_empty() {
                id.push('_');
            }
            pending_sep = false;
            id.push(c);
        } else {
            pending_sep = true;
        }
    }
    if id.is_empty() { "doc".to_string() } else { id }
}

/// Path of `path` relative to `root`, joined with `/` on every platform.
pub fn relative_source(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Hex blake3 digest of raw file bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_slug_id() {
        assert_eq!(slug_id("docs/Getting Started.md"), "docs_getting_started_md");
        assert_eq!(slug_id("a.md"), "a_md");
        assert_eq!(slug_id("__Weird--name__.TXT"), "weird_name_txt");
        assert_eq!(slug_id("日本語.md"), "md");
        assert_eq!(slug_id("///"), "doc");
        assert_eq!(slug_id(""), "doc");
    }

    #[test]
    fn test_slug_is_stable() {
        let a = Document::new("guide/intro.md", "Intro", "text");
        let b = Document::new("guide/intro.md", "Other title", "other text");
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_relative_source_uses_forward_slashes() {
        let root = PathBuf::from("/data/docs");
        let path = root.join("sub").join("page.html");
        assert_eq!(relative_source(&root, &path).as_deref(), Some("sub/page.html"));
        assert_eq!(relative_source(&root, &root), None);
        assert_eq!(relative_source(&root, Path::new("/elsewhere/x.md")), None);
    }

    #[test]
    fn test_optional_fields_omitted_from_json() {
        let doc = Document::new("a.md", "Title", "body");
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("embedding").is_none());
        assert!(json.get("content_hash").is_none());

        let doc = doc.with_embedding(vec![1.0, 0.0]).with_content_hash("ab");
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["embedding"], serde_json::json!([1.0, 0.0]));
        assert_eq!(json["content_hash"], "ab");
    }

    #[test]
    fn test_legacy_record_without_hash_deserializes() {
        let json = r#"{"id":"a_md","title":"A","source":"a.md","text":"t","embedding":[0.5]}"#;
        let doc: Document = serde_json::from_str(json).unwrap();
        assert!(doc.is_complete());
        assert_eq!(doc.content_hash, None);
    }

    #[test]
    fn test_content_hash_is_hex_blake3() {
        let hash = content_hash(b"hello");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, content_hash(b"hello"));
        assert_ne!(hash, content_hash(b"hello!"));
    }
}
