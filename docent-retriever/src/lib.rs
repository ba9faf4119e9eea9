//! docent-retriever: incremental document index and grounded question answering
//!
//! This crate walks a directory of Markdown, HTML, plain text and PDF files, embeds
//! each document once, and keeps the results in a single JSON index that survives
//! interruption. Questions are answered by ranking the index against an embedded
//! query and asking a generator to answer from the top documents.
//!
//! ## Key Modules
//!
//! - **[`retrieval`]**: scanning, the build state machine, the index builder, ranking
//!   and answer synthesis
//! - **[`storage`]**: the document collection and its atomic JSON store
//! - **[`status`]**: index statistics
//! - **[`config`]** / **[`logging`]**: TOML configuration and tracing setup
//! - **[`capabilities`]**: which optional backends were compiled in
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docent_retriever::retrieval::index_builder::{IndexBuilder, IndexBuilderConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = IndexBuilderConfig::new("docs", "rag_index.json").with_batch_size(8);
//! let report = IndexBuilder::new(config).build().await?;
//! println!("{} documents written", report.documents_written);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Scanner → Extractor → Batches → EmbeddingProvider → merge → JsonIndexStore
//!                                                               ↓
//!              Answer ← Generator ← prompt ← Retriever ← QueryEngine
//! ```

pub mod capabilities;
pub mod config;
pub mod logging;
pub mod retrieval;
pub mod status;
pub mod storage;
