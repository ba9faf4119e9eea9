//! # docent-embed
//!
//! Text embedding providers behind one async trait. Two backends are available:
//!
//! - **Local**: multilingual E5 ONNX models run through FastEmbed (cargo feature
//!   `local`, on by default). Texts are embedded in batches with the E5
//!   `passage: ` / `query: ` prefixes and come back L2-normalized.
//! - **Remote**: the Gemini `embedContent` endpoint, one rate-limited request per
//!   text. Requires an API key.
//!
//! ## Quick Start
//!
//! ```no_run
//! use docent_embed::{EmbedRole, EmbeddingProvider, GeminiEmbedProvider, RemoteEmbedConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = GeminiEmbedProvider::new(RemoteEmbedConfig::gemini("my-api-key"))?;
//! let vector = provider.embed_text("How do I reset my password?", EmbedRole::Query).await?;
//! println!("dimension {}", vector.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] using the crate's [`EmbedError`] type.
//! [`EmbedError::is_fatal`] separates startup failures (missing credential, model
//! load) from per-text failures a caller can retry.

pub mod config;
pub mod error;
pub mod provider;
pub mod remote;

pub use config::{EmbedRole, LocalEmbedConfig, RemoteEmbedConfig};
pub use error::{EmbedError, Result};
pub use provider::{EmbeddingProvider, EmbeddingResult, l2_normalize};
pub use remote::GeminiEmbedProvider;

#[cfg(feature = "local")]
pub use provider::FastEmbedProvider;

/// Whether the local FastEmbed backend was compiled into this build.
pub const fn local_supported() -> bool {
    cfg!(feature = "local")
}
