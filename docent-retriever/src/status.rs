//! Index statistics for `docent stats`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::storage::{DocumentMap, json_store};

/// Summary of a stored index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatistics {
    /// Index file location
    pub index_path: String,
    /// Index file size in bytes, if it exists
    pub index_size_bytes: Option<u64>,
    pub total_documents: usize,
    /// Documents with an embedding
    pub embedded_documents: usize,
    /// Documents waiting for an embedding
    pub pending_documents: usize,
    /// Documents carrying a content hash
    pub hashed_documents: usize,
    /// Distinct embedding lengths; more than one means the index mixes models
    pub embedding_dimensions: Vec<usize>,
    /// Document counts per file extension
    pub documents_by_extension: BTreeMap<String, usize>,
    /// Stored text, in characters
    pub total_text_chars: usize,
}

impl IndexStatistics {
    /// Load the index at `path` and summarize it.
    pub fn collect(path: &Path) -> Self {
        let documents = json_store::load(path);
        let index_size_bytes = std::fs::metadata(path).ok().map(|m| m.len());
        Self::from_documents(path, index_size_bytes, &documents)
    }

    pub fn from_documents(
        path: &Path,
        index_size_bytes: Option<u64>,
        documents: &DocumentMap,
    ) -> Self {
        let mut dimensions = Vec::new();
        let mut by_extension = BTreeMap::new();
        let mut embedded = 0;
        let mut hashed = 0;
        let mut text_chars = 0;

        for doc in documents.values() {
            if let Some(embedding) = &doc.embedding {
                embedded += 1;
                if !dimensions.contains(&embedding.len()) {
                    dimensions.push(embedding.len());
                }
            }
            if doc.content_hash.is_some() {
                hashed += 1;
            }
            text_chars += doc.text.chars().count();

            let extension = Path::new(&doc.source)
                .extension()
                .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_else(|| "(none)".to_string());
            *by_extension.entry(extension).or_insert(0) += 1;
        }
        dimensions.sort_unstable();

        Self {
            index_path: path.display().to_string(),
            index_size_bytes,
            total_documents: documents.len(),
            embedded_documents: embedded,
            pending_documents: documents.len() - embedded,
            hashed_documents: hashed,
            embedding_dimensions: dimensions,
            documents_by_extension: by_extension,
            total_text_chars: text_chars,
        }
    }

    /// Whether every embedding in the index has the same length
    pub fn dimensions_consistent(&self) -> bool {
        self.embedding_dimensions.len() <= 1
    }
}
