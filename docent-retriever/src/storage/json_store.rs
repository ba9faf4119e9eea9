//! JSON file implementation of [`IndexStore`]
//!
//! The whole collection is rewritten on every save: records are serialized as a
//! pretty-printed array sorted by `source` into a temp file next to the target,
//! flushed and fsynced, then renamed over the previous snapshot.

use super::{DocumentMap, IndexStore, from_documents};
use crate::retrieval::document::Document;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Index stored as a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonIndexStore {
    path: PathBuf,
}

impl JsonIndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl IndexStore for JsonIndexStore {
    async fn load(&self) -> DocumentMap {
        load(&self.path)
    }

    async fn save(&self, documents: &DocumentMap) -> Result<()> {
        save(documents, &self.path)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Read the index at `path`. A missing file or unparseable content yields an empty
/// map; duplicate sources in the file resolve to the last record.
pub fn load(path: &Path) -> DocumentMap {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No existing index at {}, starting fresh", path.display());
            return DocumentMap::new();
        }
        Err(e) => {
            warn!(
                "Failed to read index {}: {}; starting fresh",
                path.display(),
                e
            );
            return DocumentMap::new();
        }
    };

    match serde_json::from_slice::<Vec<Document>>(&bytes) {
        Ok(records) => {
            let count = records.len();
            let documents = from_documents(records);
            if documents.len() < count {
                debug!(
                    "Collapsed {} duplicate records in {}",
                    count - documents.len(),
                    path.display()
                );
            }
            info!(
                "Loaded {} documents from {}",
                documents.len(),
                path.display()
            );
            documents
        }
        Err(e) => {
            warn!(
                "Index {} is not a valid document list ({}); starting fresh",
                path.display(),
                e
            );
            DocumentMap::new()
        }
    }
}

/// Atomically replace the index at `path` with `documents`.
pub fn save(documents: &DocumentMap, path: &Path) -> Result<()> {
    let records: Vec<&Document> = documents.values().collect();
    save_atomically(path, |writer| {
        serde_json::to_writer_pretty(&mut *writer, &records)
            .context("Failed to serialize documents")?;
        writer.write_all(b"\n")?;
        Ok(())
    })?;
    debug!("Saved {} documents to {}", records.len(), path.display());
    Ok(())
}

/// Write a file through `write` and rename it onto `path` only if every step
/// succeeds. On failure the temp file is removed and `path` is untouched.
pub fn save_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush().context("Failed to flush index")?;
    }
    tmp.as_file()
        .sync_all()
        .context("Failed to sync index to disk")?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
