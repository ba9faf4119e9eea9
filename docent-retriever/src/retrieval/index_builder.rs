//! Incremental index builder.
//!
//! Orchestrates one build: scan the root, skip files whose stored record is already
//! complete and current, extract the rest, embed them in batches and merge the
//! results into the loaded index. Progress is checkpointed through the
//! [`IndexStore`] every few batches and saved once more at the end, so an
//! interrupted or crashed build loses at most the batches since the last checkpoint.
//!
//! ## Failure handling
//!
//! - Unreadable files and files with no extractable text are logged and skipped.
//! - A failed batch call is retried one document at a time; documents that still
//!   fail are stored without an embedding and picked up by the next build.
//! - A failed checkpoint is logged and retried at the next checkpoint. Only the
//!   final save can fail the build.
//!
//! ## Shutdown
//!
//! The builder watches a `tokio::sync::watch` flag between files and while an
//! embedding call is outstanding. When it flips to `true` the in-flight batch is
//! dropped and the build ends with its final save.

use anyhow::{Context, Result};
use docent_context::{DEFAULT_MAX_TEXT_CHARS, DocumentExtractor, FileExtractor, truncate_chars};
use docent_embed::{EmbedRole, EmbeddingProvider};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::build_state::{BuildEvent, BuildPhase, BuildState};
use super::document::{Document, content_hash};
use super::scanner::{ScanOptions, ScannedFile, scan_documents};
use crate::storage::{DocumentMap, IndexStore, JsonIndexStore, merge};

pub const DEFAULT_BATCH_SIZE: usize = 16;
pub const DEFAULT_CHECKPOINT_EVERY: usize = 10;

/// Rule deciding whether an already-embedded record is still current.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ResumePolicy {
    /// Embedded records are current only while the source bytes hash the same.
    /// Records without a stored hash are trusted.
    #[default]
    ContentHash,
    /// Any embedded record for the path is current.
    PathOnly,
}

impl ResumePolicy {
    /// Whether `stored` can be kept as is for a file whose bytes hash to `hash`.
    pub fn is_current(&self, stored: &Document, hash: &str) -> bool {
        if !stored.is_complete() {
            return false;
        }
        match self {
            ResumePolicy::PathOnly => true,
            ResumePolicy::ContentHash => stored
                .content_hash
                .as_deref()
                .is_none_or(|stored_hash| stored_hash == hash),
        }
    }
}

impl std::fmt::Display for ResumePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResumePolicy::ContentHash => write!(f, "content-hash"),
            ResumePolicy::PathOnly => write!(f, "path-only"),
        }
    }
}

/// Configuration for an index build
#[derive(Debug, Clone)]
pub struct IndexBuilderConfig {
    /// Directory scanned for documents
    pub root: PathBuf,
    /// Index file written by the default store
    pub output: PathBuf,
    /// Documents per embedding call, capped by the provider's own limit
    pub batch_size: usize,
    /// Save progress after this many batches
    pub checkpoint_every: usize,
    pub resume_policy: ResumePolicy,
    /// Stored text is cut to this many characters
    pub max_text_chars: usize,
    pub respect_gitignore: bool,
}

impl IndexBuilderConfig {
    pub fn new(root: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output: output.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
            resume_policy: ResumePolicy::default(),
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
            respect_gitignore: false,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_checkpoint_every(mut self, batches: usize) -> Self {
        self.checkpoint_every = batches;
        self
    }

    pub fn with_resume_policy(mut self, policy: ResumePolicy) -> Self {
        self.resume_policy = policy;
        self
    }

    pub fn with_max_text_chars(mut self, max_text_chars: usize) -> Self {
        self.max_text_chars = max_text_chars;
        self
    }

    pub fn with_respect_gitignore(mut self, respect: bool) -> Self {
        self.respect_gitignore = respect;
        self
    }
}

/// Counters describing one build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Supported files found under the root
    pub scanned: usize,
    /// Files whose stored record was complete and current
    pub skipped_complete: usize,
    /// Files that could not be read or produced no text
    pub extraction_failed: usize,
    /// Records created or replaced
    pub documents_written: usize,
    pub embedded: usize,
    /// Records stored without an embedding after a failed call
    pub embedding_failed: usize,
    pub batches: usize,
    pub checkpoints: usize,
    pub interrupted: bool,
}

/// Runs incremental builds. See module docs for the algorithm.
pub struct IndexBuilder {
    config: IndexBuilderConfig,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    extractor: Arc<dyn DocumentExtractor>,
    store: Arc<dyn IndexStore>,
}

impl std::fmt::Debug for IndexBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexBuilder")
            .field("config", &self.config)
            .field(
                "provider",
                &self.provider.as_ref().map(|p| p.provider_name().to_string()),
            )
            .field("store", &self.store.describe())
            .finish()
    }
}

impl IndexBuilder {
    /// Builder with the default extractor, a JSON store at `config.output` and no
    /// embedding provider.
    pub fn new(config: IndexBuilderConfig) -> Self {
        let extractor = Arc::new(FileExtractor::new(config.max_text_chars));
        let store = Arc::new(JsonIndexStore::new(config.output.clone()));
        Self {
            config,
            provider: None,
            extractor,
            store,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn DocumentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn IndexStore>) -> Self {
        self.store = store;
        self
    }

    pub fn config(&self) -> &IndexBuilderConfig {
        &self.config
    }

    /// Effective documents per batch.
    pub fn batch_capacity(&self) -> usize {
        let configured = self.config.batch_size.max(1);
        match &self.provider {
            Some(provider) => configured.min(provider.max_batch_size().max(1)),
            None => configured,
        }
    }

    /// Run a build that cannot be interrupted.
    pub async fn build(&self) -> Result<BuildReport> {
        let (_keep_alive, shutdown) = watch::channel(false);
        self.build_with_shutdown(shutdown).await
    }

    /// Run a build that stops early once `shutdown` becomes `true`.
    pub async fn build_with_shutdown(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<BuildReport> {
        info!(
            "Building index of {} into {} (embedder: {}, batch size: {}, resume: {})",
            self.config.root.display(),
            self.store.describe(),
            self.provider
                .as_ref()
                .map(|p| p.provider_name())
                .unwrap_or("none"),
            self.batch_capacity(),
            self.config.resume_policy
        );

        let mut documents = self.store.load().await;
        let mut state = BuildState::new(self.batch_capacity(), self.config.checkpoint_every);
        let mut report = BuildReport::default();
        let mut files = Vec::new().into_iter();
        let mut batch: Vec<Document> = Vec::new();

        loop {
            match state.phase() {
                BuildPhase::Scanning => {
                    let scanned = scan_documents(
                        &self.config.root,
                        ScanOptions {
                            respect_gitignore: self.config.respect_gitignore,
                        },
                    )?;
                    report.scanned = scanned.len();
                    info!("Found {} candidate documents", scanned.len());
                    files = scanned.into_iter();
                    state.apply(BuildEvent::ScanComplete)?;
                }
                BuildPhase::Batching => {
                    if *shutdown.borrow() {
                        info!(
                            "Shutdown requested, discarding {} queued documents",
                            batch.len()
                        );
                        batch.clear();
                        state.apply(BuildEvent::Interrupted)?;
                        continue;
                    }
                    match files.next() {
                        Some(file) => {
                            if let Some(doc) = self.prepare(&file, &documents, &mut report).await
                            {
                                batch.push(doc);
                                state.apply(BuildEvent::DocumentQueued)?;
                            }
                        }
                        None => {
                            state.apply(BuildEvent::InputExhausted)?;
                        }
                    }
                }
                BuildPhase::Embedding => {
                    let pending = std::mem::take(&mut batch);
                    match self.embed_batch(pending, &mut shutdown, &mut report).await {
                        Some(done) => {
                            report.batches += 1;
                            report.documents_written += done.len();
                            documents = merge(documents, done);
                            state.apply(BuildEvent::BatchEmbedded)?;
                        }
                        None => {
                            warn!("Shutdown requested, discarding in-flight batch");
                            state.apply(BuildEvent::Interrupted)?;
                        }
                    }
                }
                BuildPhase::Checkpointing => {
                    match self.store.save(&documents).await {
                        Ok(()) => {
                            report.checkpoints += 1;
                            info!(
                                "Checkpoint {}: {} documents saved to {}",
                                report.checkpoints,
                                documents.len(),
                                self.store.describe()
                            );
                        }
                        Err(e) => {
                            error!("Checkpoint failed, retrying at the next one: {:#}", e);
                        }
                    }
                    state.apply(BuildEvent::CheckpointWritten)?;
                }
                BuildPhase::Done => break,
            }
        }

        report.interrupted = state.is_interrupted();
        self.store
            .save(&documents)
            .await
            .with_context(|| format!("Failed to save index to {}", self.store.describe()))?;

        info!(
            "Index build {}: {} documents in index, {} written, {} embedded, {} skipped, {} failed",
            if report.interrupted {
                "interrupted"
            } else {
                "complete"
            },
            documents.len(),
            report.documents_written,
            report.embedded,
            report.skipped_complete,
            report.extraction_failed + report.embedding_failed
        );
        Ok(report)
    }

    /// Read, resume-check and extract one file. `None` means nothing to queue.
    async fn prepare(
        &self,
        file: &ScannedFile,
        existing: &DocumentMap,
        report: &mut BuildReport,
    ) -> Option<Document> {
        let stored = existing
            .get(&file.source)
            .filter(|stored| self.matches_provider(stored));

        if self.config.resume_policy == ResumePolicy::PathOnly
            && stored.is_some_and(Document::is_complete)
        {
            debug!("Skipping {} (already embedded)", file.source);
            report.skipped_complete += 1;
            return None;
        }

        let bytes = match tokio::fs::read(&file.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to read {}: {}", file.path.display(), e);
                report.extraction_failed += 1;
                return None;
            }
        };
        let hash = content_hash(&bytes);

        if stored.is_some_and(|stored| self.config.resume_policy.is_current(stored, &hash)) {
            debug!("Skipping {} (unchanged)", file.source);
            report.skipped_complete += 1;
            return None;
        }

        let file_name = file
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.source.clone());

        let extractor = Arc::clone(&self.extractor);
        let format = file.format;
        let extracted =
            tokio::task::spawn_blocking(move || extractor.extract(&file_name, &bytes, format))
                .await;

        match extracted {
            Err(e) => {
                warn!("Extraction of {} panicked: {}", file.source, e);
                report.extraction_failed += 1;
                None
            }
            Ok(Ok(Some(extracted))) => {
                debug!(
                    "Extracted {} ({} chars, title {:?})",
                    file.source,
                    extracted.text.chars().count(),
                    extracted.title
                );
                Some(
                    Document::new(file.source.clone(), extracted.title, extracted.text)
                        .with_content_hash(hash),
                )
            }
            Ok(Ok(None)) => {
                warn!("No text extracted from {}, skipping", file.source);
                report.extraction_failed += 1;
                None
            }
            Ok(Err(e)) => {
                warn!("Failed to extract {}: {}", file.source, e);
                report.extraction_failed += 1;
                None
            }
        }
    }

    /// False when `stored` was embedded at a width the current provider does not
    /// produce. Such records are rebuilt instead of mixed into the index.
    fn matches_provider(&self, stored: &Document) -> bool {
        let (Some(provider), Some(embedding)) = (&self.provider, &stored.embedding) else {
            return true;
        };
        let expected = provider.embedding_dimension();
        if embedding.len() == expected {
            return true;
        }
        info!(
            "Re-embedding {}: stored dimension {} differs from {} ({})",
            stored.source,
            embedding.len(),
            provider.provider_name(),
            expected
        );
        false
    }

    /// Attach embeddings to `batch`. Returns `None` if shutdown fired while a call
    /// was outstanding.
    async fn embed_batch(
        &self,
        mut batch: Vec<Document>,
        shutdown: &mut watch::Receiver<bool>,
        report: &mut BuildReport,
    ) -> Option<Vec<Document>> {
        let Some(provider) = &self.provider else {
            return Some(batch);
        };

        let texts: Vec<String> = batch
            .iter()
            .map(|doc| provider_input(&doc.text, provider.max_input_chars()))
            .collect();

        debug!("Embedding batch of {} documents", batch.len());
        let result = tokio::select! {
            biased;
            _ = shutdown_requested(shutdown) => return None,
            result = provider.embed_texts(&texts, EmbedRole::Passage) => result,
        };

        let failure = match result {
            Ok(embedded) if embedded.len() == batch.len() => {
                for (doc, embedding) in batch.iter_mut().zip(embedded.embeddings) {
                    doc.embedding = Some(embedding);
                }
                report.embedded += batch.len();
                return Some(batch);
            }
            Ok(embedded) => format!(
                "provider returned {} embeddings for {} documents",
                embedded.len(),
                batch.len()
            ),
            Err(e) => e.to_string(),
        };

        if batch.len() == 1 {
            warn!(
                "Embedding failed for {}: {}; storing without embedding",
                batch[0].source, failure
            );
            report.embedding_failed += 1;
            return Some(batch);
        }

        warn!(
            "Batch embedding of {} documents failed: {}; retrying individually",
            batch.len(),
            failure
        );
        for (doc, text) in batch.iter_mut().zip(&texts) {
            let result = tokio::select! {
                biased;
                _ = shutdown_requested(shutdown) => return None,
                result = provider.embed_text(text, EmbedRole::Passage) => result,
            };
            match result {
                Ok(embedding) => {
                    doc.embedding = Some(embedding);
                    report.embedded += 1;
                }
                Err(e) => {
                    warn!(
                        "Embedding failed for {}: {}; storing without embedding",
                        doc.source, e
                    );
                    report.embedding_failed += 1;
                }
            }
        }
        Some(batch)
    }
}

fn provider_input(text: &str, limit: Option<usize>) -> String {
    match limit {
        Some(max_chars) => truncate_chars(text, max_chars),
        None => text.to_string(),
    }
}

/// Resolves once the flag reads `true`. Never resolves if the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
