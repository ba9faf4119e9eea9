//! Configuration for embedding providers

use crate::error::{EmbedError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default multilingual E5 model used for local embeddings.
pub const DEFAULT_LOCAL_MODEL: &str = "multilingual-e5-large";

/// Default Gemini embedding model.
pub const DEFAULT_REMOTE_MODEL: &str = "embedding-001";

/// Default base URL of the Gemini REST API.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Which side of an asymmetric embedding space a text belongs to.
///
/// E5-style models are trained with distinct prefixes for stored passages and for
/// search queries; embedding a query with the passage prefix silently degrades
/// retrieval quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedRole {
    Passage,
    Query,
}

impl std::fmt::Display for EmbedRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbedRole::Passage => write!(f, "passage"),
            EmbedRole::Query => write!(f, "query"),
        }
    }
}

/// Configuration for the local (batched, ONNX) embedding provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalEmbedConfig {
    /// Name of the embedding model (e.g. "multilingual-e5-large")
    pub model_name: String,
    /// Directory where downloaded model files are cached
    pub cache_dir: PathBuf,
    /// Maximum batch size for one inference call
    pub batch_size: usize,
    /// Whether to L2-normalize embeddings
    pub normalize: bool,
    /// Prefix prepended to stored passages
    pub passage_prefix: String,
    /// Prefix prepended to search queries
    pub query_prefix: String,
    /// Show a progress bar while the model downloads
    pub show_download_progress: bool,
}

impl Default for LocalEmbedConfig {
    fn default() -> Self {
        Self::multilingual_e5(DEFAULT_LOCAL_MODEL, default_cache_dir())
    }
}

impl LocalEmbedConfig {
    /// Create a configuration for one of the multilingual E5 models.
    pub fn multilingual_e5<P: AsRef<Path>>(model_name: impl Into<String>, cache_dir: P) -> Self {
        Self {
            model_name: model_name.into(),
            cache_dir: cache_dir.as_ref().to_path_buf(),
            batch_size: 16,
            normalize: true,
            passage_prefix: "passage: ".to_string(),
            query_prefix: "query: ".to_string(),
            show_download_progress: true,
        }
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set whether to normalize embeddings (builder style)
    pub fn with_normalize(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }

    /// Set the model cache directory (builder style)
    pub fn with_cache_dir<P: AsRef<Path>>(self, cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            ..self
        }
    }

    /// Prefix for the given role
    pub fn prefix(&self, role: EmbedRole) -> &str {
        match role {
            EmbedRole::Passage => &self.passage_prefix,
            EmbedRole::Query => &self.query_prefix,
        }
    }

    /// Apply the role prefix to `text`
    pub fn prefixed(&self, text: &str, role: EmbedRole) -> String {
        format!("{}{}", self.prefix(role), text)
    }

    /// Validate the configuration before loading a model
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(EmbedError::invalid_config("model name must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch size must be at least 1"));
        }
        Ok(())
    }
}

/// Configuration for the remote (one request per document) embedding provider
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEmbedConfig {
    /// API key sent with every request
    pub api_key: String,
    /// Base URL of the REST API
    pub base_url: String,
    /// Embedding model name, without the "models/" prefix
    pub model: String,
    /// Fixed delay inserted before every request to stay under provider rate limits
    pub request_delay: Duration,
    /// Texts longer than this many characters are cut before sending
    pub max_input_chars: usize,
    /// Dimension of the vectors the model returns
    pub dimension: usize,
}

// The API key stays out of debug output.
impl std::fmt::Debug for RemoteEmbedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEmbedConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("request_delay", &self.request_delay)
            .field("max_input_chars", &self.max_input_chars)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl RemoteEmbedConfig {
    /// Create a Gemini configuration with the default model and a 10 second delay
    pub fn gemini(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            model: DEFAULT_REMOTE_MODEL.to_string(),
            request_delay: Duration::from_secs(10),
            max_input_chars: 2_000,
            dimension: 768,
        }
    }

    /// Set the delay before each request (builder style)
    pub fn with_request_delay(self, request_delay: Duration) -> Self {
        Self {
            request_delay,
            ..self
        }
    }

    /// Set the model name (builder style)
    pub fn with_model(self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self
        }
    }

    /// Set the API base URL (builder style)
    pub fn with_base_url(self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..self
        }
    }

    /// Full URL of the embedContent endpoint
    pub fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:embedContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    /// Validate the configuration before creating a client
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(EmbedError::MissingCredential {
                provider: "gemini".to_string(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(EmbedError::invalid_config("model name must not be empty"));
        }
        if self.max_input_chars == 0 {
            return Err(EmbedError::invalid_config(
                "max_input_chars must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Default location for downloaded models: `$HOME/.docent/models`, or `./models`
/// when no home directory is known.
pub fn default_cache_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".docent").join("models"))
        .unwrap_or_else(|| PathBuf::from("models"))
}
