//! End-to-end example: build an index, resume it, and search it
//!
//! This example shows how to:
//! 1. Create a small documentation tree with Markdown, HTML and text files
//! 2. Build an index with an offline bag-of-words embedder
//! 3. Add a file and rebuild, embedding only the new document
//! 4. Rank the index against a few questions
//!
//! Note: the hashing embedder keeps this runnable without downloads or API keys.
//! Real builds use the local E5 model or the remote Gemini provider.

use anyhow::Result;
use async_trait::async_trait;
use docent_embed::{EmbedRole, EmbeddingProvider, EmbeddingResult, l2_normalize};
use docent_retriever::{
    retrieval::{
        index_builder::{IndexBuilder, IndexBuilderConfig},
        synthesizer::QueryEngine,
    },
    storage::json_store,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

const DIMENSION: usize = 64;

/// Hashes lowercase words into a fixed number of buckets.
struct HashingEmbedder;

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed_texts(
        &self,
        texts: &[String],
        _role: EmbedRole,
    ) -> docent_embed::Result<EmbeddingResult> {
        let embeddings = texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; DIMENSION];
                for word in text.split(|c: char| !c.is_alphanumeric()) {
                    if word.len() < 3 {
                        continue;
                    }
                    let hash = blake3::hash(word.to_lowercase().as_bytes());
                    vector[hash.as_bytes()[0] as usize % DIMENSION] += 1.0;
                }
                l2_normalize(&mut vector);
                vector
            })
            .collect();
        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        DIMENSION
    }

    fn provider_name(&self) -> &str {
        "hashing"
    }

    fn max_batch_size(&self) -> usize {
        8
    }

    fn normalized(&self) -> bool {
        true
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("🚀 Starting end-to-end indexing and search example...\n");

    let temp_dir = tempdir()?;
    let docs = temp_dir.path().join("docs");
    let index = temp_dir.path().join("rag_index.json");
    create_test_files(&docs)?;
    println!("📁 Created documentation tree at: {}", docs.display());

    let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder);
    let builder = IndexBuilder::new(IndexBuilderConfig::new(&docs, &index).with_batch_size(2))
        .with_provider(provider.clone());

    let report = builder.build().await?;
    println!(
        "✅ First build: {} scanned, {} embedded in {} batches",
        report.scanned, report.embedded, report.batches
    );

    std::fs::write(
        docs.join("guide/upgrading.md"),
        "# Upgrading\n\nStop the service, install the new package, then run the migration.",
    )?;
    let report = builder.build().await?;
    println!(
        "🔄 Second build: {} unchanged, {} embedded",
        report.skipped_complete, report.embedded
    );

    let engine = QueryEngine::new(provider, json_store::load(&index)).with_top_k(2);
    for question in [
        "How do I install the package?",
        "When are invoices sent?",
        "How do I reset my password?",
    ] {
        println!("\n🔍 {question}");
        for scored in engine.search(question).await? {
            println!(
                "   {:.3}  {} ({})",
                scored.score, scored.document.title, scored.document.source
            );
        }
    }

    println!("\n🎉 Example completed");
    Ok(())
}

fn create_test_files(root: &Path) -> Result<()> {
    std::fs::create_dir_all(root.join("guide"))?;
    std::fs::write(
        root.join("guide/install.md"),
        "# Installation\n\nDownload the package and run the installer. The install takes a minute.",
    )?;
    std::fs::write(
        root.join("billing.html"),
        "<html><head><title>Billing</title></head><body><p>Invoices are sent on the first of every month.</p></body></html>",
    )?;
    std::fs::write(
        root.join("account.txt"),
        "To reset your password open Settings, choose Account and press Reset password.",
    )?;
    Ok(())
}
