//! Integration tests for incremental index builds
//!
//! These tests drive `IndexBuilder` against real temp directories and verify:
//! - Extraction and storage without an embedder
//! - Idempotent rebuilds
//! - Resume after a partial build, under both resume policies
//! - Checkpoint failures and interruption
//! - Malformed PDFs and switching embedders

use anyhow::{Result, bail};
use async_trait::async_trait;
use docent_embed::{EmbedRole, EmbeddingProvider, EmbeddingResult};
use docent_retriever::retrieval::index_builder::{
    IndexBuilder, IndexBuilderConfig, ResumePolicy,
};
use docent_retriever::retrieval::retriever::{Retriever, SimilarityMetric};
use docent_retriever::status::IndexStatistics;
use docent_retriever::storage::{DocumentMap, IndexStore, JsonIndexStore, json_store};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;
use tokio::sync::watch;

/// Counts embedded texts; the vector encodes the text length.
#[derive(Default)]
struct CountingProvider {
    texts: AtomicUsize,
}

impl CountingProvider {
    fn embedded(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for CountingProvider {
    async fn embed_texts(
        &self,
        texts: &[String],
        role: EmbedRole,
    ) -> docent_embed::Result<EmbeddingResult> {
        assert_eq!(role, EmbedRole::Passage);
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(EmbeddingResult::new(
            texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect(),
        ))
    }

    fn embedding_dimension(&self) -> usize {
        2
    }

    fn provider_name(&self) -> &str {
        "counting"
    }

    fn max_batch_size(&self) -> usize {
        32
    }

    fn normalized(&self) -> bool {
        false
    }
}

fn write(root: &Path, name: &str, contents: &str) -> Result<()> {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}

fn config(root: &Path, output: &Path) -> IndexBuilderConfig {
    IndexBuilderConfig::new(root, output).with_batch_size(2)
}

/// Build a two-document index with no embedder and check the stored records
#[tokio::test]
async fn test_build_without_embedder() -> Result<()> {
    let docs = tempdir()?;
    let out = tempdir()?;
    let index = out.path().join("rag_index.json");
    write(docs.path(), "a.md", "# Title\n\nHello   world")?;
    write(docs.path(), "b.txt", "plain\ntext")?;
    write(docs.path(), "notes.json", "{}")?;

    let report = IndexBuilder::new(config(docs.path(), &index)).build().await?;

    assert_eq!(report.scanned, 2);
    assert_eq!(report.documents_written, 2);
    assert_eq!(report.embedded, 0);
    assert!(!report.interrupted);

    let stored = json_store::load(&index);
    let sources: Vec<&str> = stored.keys().map(String::as_str).collect();
    assert_eq!(sources, vec!["a.md", "b.txt"]);
    assert_eq!(stored["a.md"].title, "Title");
    assert_eq!(stored["b.txt"].title, "b");
    assert_eq!(stored["b.txt"].text, "plain text");
    assert!(stored.values().all(|d| d.embedding.is_none()));
    assert!(stored.values().all(|d| d.content_hash.is_some()));

    // the file is a plain JSON array without embedding keys
    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&index)?)?;
    let records = raw.as_array().expect("index is an array");
    assert_eq!(records.len(), 2);
    assert!(records[0].get("embedding").is_none());
    Ok(())
}

/// Rebuilding an unchanged tree leaves the index byte for byte the same
#[tokio::test]
async fn test_rebuild_is_idempotent() -> Result<()> {
    let docs = tempdir()?;
    let index = docs.path().join("index.json");
    write(docs.path(), "guide/intro.md", "# Intro\nWelcome")?;
    write(docs.path(), "faq.html", "<title>FAQ</title><p>Ask away</p>")?;

    let provider = Arc::new(CountingProvider::default());
    let builder = IndexBuilder::new(config(docs.path(), &index)).with_provider(provider.clone());

    builder.build().await?;
    let first = std::fs::read(&index)?;
    let report = builder.build().await?;
    let second = std::fs::read(&index)?;

    assert_eq!(first, second);
    assert_eq!(report.skipped_complete, 2);
    assert_eq!(report.documents_written, 0);
    assert_eq!(provider.embedded(), 2);
    Ok(())
}

/// A second build embeds only the files the first one did not cover
#[tokio::test]
async fn test_resume_embeds_only_new_files() -> Result<()> {
    let docs = tempdir()?;
    let out = tempdir()?;
    let index = out.path().join("index.json");
    for name in ["one.md", "two.md", "three.txt"] {
        write(docs.path(), name, &format!("contents of {name}"))?;
    }

    let provider = Arc::new(CountingProvider::default());
    let builder = IndexBuilder::new(config(docs.path(), &index)).with_provider(provider.clone());
    builder.build().await?;
    assert_eq!(provider.embedded(), 3);

    write(docs.path(), "four.md", "fresh")?;
    write(docs.path(), "nested/five.html", "<p>also fresh</p>")?;
    let report = builder.build().await?;

    assert_eq!(provider.embedded(), 5);
    assert_eq!(report.skipped_complete, 3);
    assert_eq!(report.embedded, 2);

    let stored = json_store::load(&index);
    assert_eq!(stored.len(), 5);
    assert!(stored.values().all(|d| d.is_complete()));
    assert!(stored.contains_key("nested/five.html"));
    Ok(())
}

/// Records stored without an embedding are picked up by the next embedding build
#[tokio::test]
async fn test_pending_records_are_embedded_later() -> Result<()> {
    let docs = tempdir()?;
    let index = docs.path().join("index.json");
    write(docs.path(), "a.md", "alpha")?;

    IndexBuilder::new(config(docs.path(), &index)).build().await?;
    assert!(json_store::load(&index)["a.md"].embedding.is_none());

    let provider = Arc::new(CountingProvider::default());
    let report = IndexBuilder::new(config(docs.path(), &index))
        .with_provider(provider.clone())
        .build()
        .await?;

    assert_eq!(report.embedded, 1);
    assert_eq!(json_store::load(&index)["a.md"].embedding, Some(vec![5.0, 1.0]));
    Ok(())
}

/// Edited files are re-embedded under the content-hash policy but not path-only
#[tokio::test]
async fn test_changed_file_and_resume_policy() -> Result<()> {
    let docs = tempdir()?;
    let index = docs.path().join("index.json");
    write(docs.path(), "a.md", "first draft")?;
    write(docs.path(), "b.md", "stable")?;

    let provider = Arc::new(CountingProvider::default());
    let build = |policy: ResumePolicy| {
        IndexBuilder::new(config(docs.path(), &index).with_resume_policy(policy))
            .with_provider(provider.clone())
    };
    build(ResumePolicy::ContentHash).build().await?;
    assert_eq!(provider.embedded(), 2);

    write(docs.path(), "a.md", "second draft, longer")?;

    let report = build(ResumePolicy::PathOnly).build().await?;
    assert_eq!(report.skipped_complete, 2);
    assert_eq!(provider.embedded(), 2);
    assert_eq!(json_store::load(&index)["a.md"].text, "first draft");

    let report = build(ResumePolicy::ContentHash).build().await?;
    assert_eq!(report.skipped_complete, 1);
    assert_eq!(provider.embedded(), 3);
    let stored = json_store::load(&index);
    assert_eq!(stored["a.md"].text, "second draft, longer");
    assert_eq!(stored["a.md"].embedding, Some(vec![20.0, 1.0]));
    Ok(())
}

/// Long documents are cut to the configured limit before embedding
#[tokio::test]
async fn test_text_truncated_before_embedding() -> Result<()> {
    let docs = tempdir()?;
    let index = docs.path().join("index.json");
    write(docs.path(), "long.txt", "abcdefghij klmnop")?;

    let provider = Arc::new(CountingProvider::default());
    IndexBuilder::new(config(docs.path(), &index).with_max_text_chars(5))
        .with_provider(provider)
        .build()
        .await?;

    let stored = json_store::load(&index);
    assert_eq!(stored["long.txt"].text, "abcde");
    assert_eq!(stored["long.txt"].embedding, Some(vec![5.0, 1.0]));
    Ok(())
}

/// Records of deleted files stay in the index
#[tokio::test]
async fn test_deleted_files_are_retained() -> Result<()> {
    let docs = tempdir()?;
    let index = docs.path().join("index.json");
    write(docs.path(), "keep.md", "keep")?;
    write(docs.path(), "gone.md", "gone")?;

    let builder = IndexBuilder::new(config(docs.path(), &index));
    builder.build().await?;
    std::fs::remove_file(docs.path().join("gone.md"))?;
    builder.build().await?;

    let stored = json_store::load(&index);
    assert_eq!(stored.len(), 2);
    assert_eq!(stored["gone.md"].text, "gone");
    Ok(())
}

/// Store that fails its first `fail_first` saves and records the size of each
/// successful one.
struct FlakyStore {
    inner: JsonIndexStore,
    fail_first: usize,
    attempts: AtomicUsize,
    saved_sizes: Mutex<Vec<usize>>,
}

impl FlakyStore {
    fn new(path: &Path, fail_first: usize) -> Self {
        Self {
            inner: JsonIndexStore::new(path),
            fail_first,
            attempts: AtomicUsize::new(0),
            saved_sizes: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl IndexStore for FlakyStore {
    async fn load(&self) -> DocumentMap {
        self.inner.load().await
    }

    async fn save(&self, documents: &DocumentMap) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            bail!("disk full");
        }
        self.inner.save(documents).await?;
        self.saved_sizes.lock().unwrap().push(documents.len());
        Ok(())
    }

    fn describe(&self) -> String {
        "flaky store".to_string()
    }
}

/// A failed checkpoint is retried at the next one and does not fail the build
#[tokio::test]
async fn test_checkpoint_failure_is_retried() -> Result<()> {
    let docs = tempdir()?;
    let index = docs.path().join("index.json");
    for name in ["a.md", "b.md", "c.md"] {
        write(docs.path(), name, name)?;
    }

    let store = Arc::new(FlakyStore::new(&index, 1));
    let report = IndexBuilder::new(
        IndexBuilderConfig::new(docs.path(), &index)
            .with_batch_size(1)
            .with_checkpoint_every(1),
    )
    .with_provider(Arc::new(CountingProvider::default()))
    .with_store(store.clone())
    .build()
    .await?;

    assert_eq!(report.batches, 3);
    assert_eq!(report.checkpoints, 2);
    // checkpoint after b.md carries a.md too, then c.md, then the final save
    assert_eq!(*store.saved_sizes.lock().unwrap(), vec![2, 3, 3]);
    assert_eq!(json_store::load(&index).len(), 3);
    Ok(())
}

/// Only the final save can fail a build
#[tokio::test]
async fn test_final_save_failure_fails_build() -> Result<()> {
    let docs = tempdir()?;
    let index = docs.path().join("index.json");
    write(docs.path(), "a.md", "alpha")?;

    let store = Arc::new(FlakyStore::new(&index, usize::MAX));
    let result = IndexBuilder::new(config(docs.path(), &index))
        .with_store(store)
        .build()
        .await;

    let err = result.expect_err("final save fails");
    assert!(format!("{err:#}").contains("disk full"));
    assert!(!index.exists());
    Ok(())
}

/// A shutdown requested before the build starts leaves the previous index intact
#[tokio::test]
async fn test_shutdown_before_start() -> Result<()> {
    let docs = tempdir()?;
    let index = docs.path().join("index.json");
    write(docs.path(), "a.md", "alpha")?;
    IndexBuilder::new(config(docs.path(), &index)).build().await?;
    write(docs.path(), "b.md", "beta")?;

    let (_tx, rx) = watch::channel(true);
    let report = IndexBuilder::new(config(docs.path(), &index))
        .with_provider(Arc::new(CountingProvider::default()))
        .build_with_shutdown(rx)
        .await?;

    assert!(report.interrupted);
    assert_eq!(report.documents_written, 0);
    let stored = json_store::load(&index);
    assert_eq!(stored.len(), 1);
    assert!(stored["a.md"].embedding.is_none());
    Ok(())
}

/// Requests shutdown from inside its first call, then either completes the call
/// or never answers.
struct InterruptingProvider {
    shutdown: watch::Sender<bool>,
    calls: AtomicUsize,
    hang: bool,
}

#[async_trait]
impl EmbeddingProvider for InterruptingProvider {
    async fn embed_texts(
        &self,
        texts: &[String],
        _role: EmbedRole,
    ) -> docent_embed::Result<EmbeddingResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.shutdown.send(true);
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok(EmbeddingResult::new(
            texts.iter().map(|_| vec![1.0, 0.0]).collect(),
        ))
    }

    fn embedding_dimension(&self) -> usize {
        2
    }

    fn provider_name(&self) -> &str {
        "interrupting"
    }

    fn max_batch_size(&self) -> usize {
        1
    }

    fn normalized(&self) -> bool {
        true
    }
}

/// Completed batches are saved on interruption and the next build finishes the rest
#[tokio::test]
async fn test_interrupt_between_batches_then_resume() -> Result<()> {
    let docs = tempdir()?;
    let index = docs.path().join("index.json");
    for name in ["a.md", "b.md", "c.md"] {
        write(docs.path(), name, name)?;
    }

    let (tx, rx) = watch::channel(false);
    let provider = Arc::new(InterruptingProvider {
        shutdown: tx,
        calls: AtomicUsize::new(0),
        hang: false,
    });
    let report = IndexBuilder::new(config(docs.path(), &index))
        .with_provider(provider.clone())
        .build_with_shutdown(rx)
        .await?;

    assert!(report.interrupted);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    let stored = json_store::load(&index);
    assert_eq!(stored.keys().collect::<Vec<_>>(), vec!["a.md"]);
    assert!(stored["a.md"].is_complete());

    let counting = Arc::new(CountingProvider::default());
    let report = IndexBuilder::new(config(docs.path(), &index))
        .with_provider(counting.clone())
        .build()
        .await?;
    assert!(!report.interrupted);
    assert_eq!(report.skipped_complete, 1);
    assert_eq!(counting.embedded(), 2);
    assert_eq!(json_store::load(&index).len(), 3);
    Ok(())
}

/// A batch whose call is still outstanding at shutdown is dropped
#[tokio::test]
async fn test_interrupt_drops_in_flight_batch() -> Result<()> {
    let docs = tempdir()?;
    let index = docs.path().join("index.json");
    write(docs.path(), "a.md", "alpha")?;
    write(docs.path(), "b.md", "beta")?;

    let (tx, rx) = watch::channel(false);
    let provider = Arc::new(InterruptingProvider {
        shutdown: tx,
        calls: AtomicUsize::new(0),
        hang: true,
    });
    let report = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        IndexBuilder::new(config(docs.path(), &index))
            .with_provider(provider)
            .build_with_shutdown(rx),
    )
    .await??;

    assert!(report.interrupted);
    assert_eq!(report.batches, 0);
    assert!(json_store::load(&index).is_empty());
    assert!(index.exists());
    Ok(())
}

/// Produces constant vectors of a fixed width, like a model with that output size
struct WidthProvider {
    width: usize,
}

#[async_trait]
impl EmbeddingProvider for WidthProvider {
    async fn embed_texts(
        &self,
        texts: &[String],
        _role: EmbedRole,
    ) -> docent_embed::Result<EmbeddingResult> {
        Ok(EmbeddingResult::new(vec![vec![1.0; self.width]; texts.len()]))
    }

    fn embedding_dimension(&self) -> usize {
        self.width
    }

    fn provider_name(&self) -> &str {
        "width"
    }

    fn max_batch_size(&self) -> usize {
        8
    }

    fn normalized(&self) -> bool {
        false
    }
}

/// Rebuilding with a model of a different width re-embeds every stored record,
/// whichever resume policy is in force
#[tokio::test]
async fn test_switching_embedder_reembeds_old_records() -> Result<()> {
    for policy in [ResumePolicy::ContentHash, ResumePolicy::PathOnly] {
        let docs = tempdir()?;
        let out = tempdir()?;
        let index = out.path().join("index.json");
        write(docs.path(), "a.md", "# A\nalpha")?;

        IndexBuilder::new(config(docs.path(), &index).with_resume_policy(policy))
            .with_provider(Arc::new(WidthProvider { width: 768 }))
            .build()
            .await?;

        write(docs.path(), "b.md", "# B\nbeta")?;
        let report = IndexBuilder::new(config(docs.path(), &index).with_resume_policy(policy))
            .with_provider(Arc::new(WidthProvider { width: 1024 }))
            .build()
            .await?;
        assert_eq!(report.skipped_complete, 0, "{policy}");
        assert_eq!(report.embedded, 2, "{policy}");

        let stored = json_store::load(&index);
        let stats = IndexStatistics::from_documents(&index, None, &stored);
        assert_eq!(stats.embedding_dimensions, vec![1024], "{policy}");

        let hits = Retriever::new(stored, SimilarityMetric::Cosine).top_k(&[1.0; 1024], 2)?;
        assert_eq!(hits.len(), 2);
    }
    Ok(())
}

/// One-page PDF whose content stream selects a font the page never declares
fn pdf_with_undeclared_font() -> Vec<u8> {
    let content = "BT /F9 12 Tf 72 712 Td (Hello) Tj ET";
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << >> \
         /Contents 4 0 R >>"
            .to_string(),
        format!("<< /Length {} >>\nstream\n{content}\nendstream", content.len()),
    ];

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }
    let xref_start = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    pdf.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        pdf.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_start}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    pdf
}

/// A PDF the parser chokes on is counted as failed and the rest of the build is saved
#[tokio::test]
async fn test_malformed_pdf_does_not_abort_build() -> Result<()> {
    let docs = tempdir()?;
    let out = tempdir()?;
    let index = out.path().join("index.json");
    write(docs.path(), "a.md", "# A\nalpha")?;
    std::fs::write(docs.path().join("broken.pdf"), pdf_with_undeclared_font())?;

    let report = IndexBuilder::new(config(docs.path(), &index))
        .with_provider(Arc::new(CountingProvider::default()))
        .build()
        .await?;

    assert_eq!(report.scanned, 2);
    assert_eq!(report.extraction_failed, 1);
    assert_eq!(report.embedded, 1);

    let stored = json_store::load(&index);
    assert!(stored["a.md"].is_complete());
    assert!(!stored.contains_key("broken.pdf"));
    Ok(())
}
