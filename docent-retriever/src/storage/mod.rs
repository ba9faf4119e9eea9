//! Storage layer for the document index
//!
//! The index is one JSON array of [`Document`] records keyed by `source`. Loading
//! never fails: a missing or corrupt file yields an empty collection and the next
//! build starts fresh. Saving is atomic, so a crash mid-write leaves the previous
//! snapshot in place.
//!
//! ## Key Components
//!
//! - **DocumentMap**: in-memory collection ordered by `source`
//! - **IndexStore**: the seam the builder checkpoints through
//! - **JsonIndexStore**: file-backed implementation

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::retrieval::document::Document;

pub mod json_store;

pub use json_store::JsonIndexStore;

/// Documents keyed by `source`.
pub type DocumentMap = BTreeMap<String, Document>;

/// Persistent home of a document collection.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Load the stored collection. Never fails; problems are logged and yield an
    /// empty map.
    async fn load(&self) -> DocumentMap;

    /// Replace the stored snapshot with `documents`.
    async fn save(&self, documents: &DocumentMap) -> Result<()>;

    /// Human-readable location for log lines.
    fn describe(&self) -> String;
}

/// Overwrite entries of `existing` with `new_docs` by `source`; every other entry is
/// kept as is.
pub fn merge(
    mut existing: DocumentMap,
    new_docs: impl IntoIterator<Item = Document>,
) -> DocumentMap {
    for doc in new_docs {
        existing.insert(doc.source.clone(), doc);
    }
    existing
}

/// Build a map from a list of records. Later duplicates of a `source` win.
pub fn from_documents(documents: impl IntoIterator<Item = Document>) -> DocumentMap {
    merge(DocumentMap::new(), documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(source: &str, text: &str) -> Document {
        Document::new(source, source, text)
    }

    #[test]
    fn test_merge_overwrites_by_source() {
        let existing = from_documents([doc("a.md", "old a"), doc("b.md", "old b")]);
        let merged = merge(existing, [doc("a.md", "new a"), doc("c.md", "new c")]);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged["a.md"].text, "new a");
        assert_eq!(merged["b.md"].text, "old b");
        assert_eq!(merged["c.md"].text, "new c");
    }

    #[test]
    fn test_merge_keeps_sources_unique() {
        let merged = merge(
            DocumentMap::new(),
            [doc("x.txt", "1"), doc("x.txt", "2"), doc("x.txt", "3")],
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged["x.txt"].text, "3");
    }

    #[test]
    fn test_merge_with_nothing_is_identity() {
        let existing = from_documents([doc("a.md", "a")]);
        let merged = merge(existing.clone(), Vec::new());
        assert_eq!(merged, existing);
    }
}
