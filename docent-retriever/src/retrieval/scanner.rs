//! Discovery of indexable source files under a root directory.

use anyhow::{Result, bail};
use docent_context::DocumentFormat;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::document::relative_source;

/// A file the builder should consider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    /// Path relative to the scan root, `/`-separated
    pub source: String,
    pub format: DocumentFormat,
}

/// Options for [`scan_documents`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// Honour `.gitignore`, `.ignore` and global git excludes
    pub respect_gitignore: bool,
}

/// Recursively list supported files under `root`, sorted by `source`.
///
/// Hidden files and directories are skipped. Extensions are matched
/// case-insensitively. Unreadable entries are logged and skipped.
pub fn scan_documents(root: &Path, options: ScanOptions) -> Result<Vec<ScannedFile>> {
    if !root.is_dir() {
        bail!("Scan root {} is not a directory", root.display());
    }

    let mut walker = WalkBuilder::new(root);
    walker
        .hidden(true)
        .git_ignore(options.respect_gitignore)
        .git_exclude(options.respect_gitignore)
        .git_global(options.respect_gitignore)
        .ignore(options.respect_gitignore)
        .parents(options.respect_gitignore)
        .require_git(false)
        .follow_links(false);

    let mut files = Vec::new();
    for entry in walker.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }

        let path = entry.path();
        let Some(format) = DocumentFormat::from_path(path) else {
            continue;
        };
        let Some(source) = relative_source(root, path) else {
            continue;
        };

        debug!("Found {} document: {}", format, source);
        files.push(ScannedFile {
            path: path.to_path_buf(),
            source,
            format,
        });
    }

    files.sort_by(|a, b| a.source.cmp(&b.source));
    Ok(files)
}
