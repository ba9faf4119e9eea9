//! TOML configuration for the `docent` binary.
//!
//! Every field has a default, so an empty file (or no file) is valid. Command-line
//! flags override file values.
//!
//! ```toml
//! [build]
//! root = "docs"
//! output = "rag_index.json"
//! batch_size = 16
//! checkpoint_every = 10
//! resume_policy = "content-hash"
//!
//! [embedding]
//! backend = "auto"
//! request_delay_secs = 10
//!
//! [query]
//! index = "rag_index.json"
//! top_k = 3
//!
//! [logging]
//! level = "info"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::logging::LoggingConfig;
use crate::retrieval::index_builder::{DEFAULT_BATCH_SIZE, DEFAULT_CHECKPOINT_EVERY, ResumePolicy};
use crate::retrieval::retriever::DEFAULT_TOP_K;
use crate::retrieval::synthesizer::DEFAULT_GENERATION_MODEL;

pub const DEFAULT_INDEX_FILE: &str = "rag_index.json";

/// Which embedding backend a command uses.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderChoice {
    /// Remote when an API key is available, otherwise none
    #[default]
    Auto,
    Local,
    Remote,
    /// Store documents without embeddings
    None,
}

impl std::fmt::Display for EmbedderChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EmbedderChoice::Auto => "auto",
            EmbedderChoice::Local => "local",
            EmbedderChoice::Remote => "remote",
            EmbedderChoice::None => "none",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocentConfig {
    pub build: BuildSection,
    pub embedding: EmbeddingSection,
    pub query: QuerySection,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    pub root: PathBuf,
    pub output: PathBuf,
    pub batch_size: usize,
    pub checkpoint_every: usize,
    pub resume_policy: ResumePolicy,
    pub max_text_chars: usize,
    pub respect_gitignore: bool,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            output: PathBuf::from(DEFAULT_INDEX_FILE),
            batch_size: DEFAULT_BATCH_SIZE,
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
            resume_policy: ResumePolicy::default(),
            max_text_chars: docent_context::DEFAULT_MAX_TEXT_CHARS,
            respect_gitignore: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    /// Backend for `docent build`
    pub backend: EmbedderChoice,
    /// Local model name (multilingual-e5-large, -base or -small)
    pub local_model: String,
    /// Where local models are downloaded; defaults to `~/.docent/models`
    pub cache_dir: Option<PathBuf>,
    /// Remote embedding model
    pub remote_model: String,
    /// Pause before every remote request, in seconds
    pub request_delay_secs: u64,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            backend: EmbedderChoice::Auto,
            local_model: docent_embed::config::DEFAULT_LOCAL_MODEL.to_string(),
            cache_dir: None,
            remote_model: docent_embed::config::DEFAULT_REMOTE_MODEL.to_string(),
            request_delay_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySection {
    pub index: PathBuf,
    pub top_k: usize,
    /// Backend used to embed questions; must match the one that built the index
    pub embedder: EmbedderChoice,
    pub generation_model: String,
    /// Characters of each retrieved document included in the prompt
    pub context_chars: usize,
}

impl Default for QuerySection {
    fn default() -> Self {
        Self {
            index: PathBuf::from(DEFAULT_INDEX_FILE),
            top_k: DEFAULT_TOP_K,
            embedder: EmbedderChoice::Local,
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            context_chars: docent_context::DEFAULT_CONTEXT_CHARS,
        }
    }
}

impl DocentConfig {
    /// Parse a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Parse `path` if given, otherwise use defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}
