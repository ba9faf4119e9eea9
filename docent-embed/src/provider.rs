//! Embedding provider implementations

use crate::config::EmbedRole;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;

#[cfg(feature = "local")]
use crate::config::LocalEmbedConfig;
#[cfg(feature = "local")]
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
#[cfg(feature = "local")]
use std::sync::{Arc, Mutex};

/// Result of embedding generation
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f32>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result. The dimension is taken from the first vector,
    /// or 0 when there are none.
    pub fn new(embeddings: Vec<Vec<f32>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text
///
/// Providers own their input conventions: a provider that expects role prefixes adds
/// them itself, and callers only say whether a text is a stored passage or a query.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for multiple texts in one call.
    ///
    /// Callers must not pass more than [`max_batch_size`](Self::max_batch_size) texts.
    /// Either every text gets a vector or the whole call fails.
    async fn embed_texts(&self, texts: &[String], role: EmbedRole) -> Result<EmbeddingResult>;

    /// Generate an embedding for a single text
    async fn embed_text(&self, text: &str, role: EmbedRole) -> Result<Vec<f32>> {
        let result = self.embed_texts(&[text.to_string()], role).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::invalid_response("No embedding generated for text"))
    }

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;

    /// Largest number of texts accepted by one [`embed_texts`](Self::embed_texts) call
    fn max_batch_size(&self) -> usize;

    /// Texts longer than this many characters are cut before embedding
    fn max_input_chars(&self) -> Option<usize> {
        None
    }

    /// Whether returned vectors have unit length
    fn normalized(&self) -> bool;
}

/// Scale `vector` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Map a configured model name onto one of the fastembed E5 models
#[cfg(feature = "local")]
pub fn fastembed_model(model_name: &str) -> Result<EmbeddingModel> {
    match model_name.to_ascii_lowercase().as_str() {
        "multilingual-e5-large" | "intfloat/multilingual-e5-large" => {
            Ok(EmbeddingModel::MultilingualE5Large)
        }
        "multilingual-e5-base" | "intfloat/multilingual-e5-base" => {
            Ok(EmbeddingModel::MultilingualE5Base)
        }
        "multilingual-e5-small" | "intfloat/multilingual-e5-small" => {
            Ok(EmbeddingModel::MultilingualE5Small)
        }
        other => Err(EmbedError::invalid_config(format!(
            "unsupported local model '{other}' (expected multilingual-e5-large, -base or -small)"
        ))),
    }
}

/// FastEmbed-based embedding provider running a multilingual E5 ONNX model locally
#[cfg(feature = "local")]
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: LocalEmbedConfig,
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

#[cfg(feature = "local")]
impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("dimension", &self.dimension)
            .finish()
    }
}

#[cfg(feature = "local")]
impl FastEmbedProvider {
    /// Load the model (downloading it into the cache directory on first use) and check
    /// its dimension.
    pub async fn create(config: LocalEmbedConfig) -> Result<Self> {
        config.validate()?;
        let model_kind = fastembed_model(&config.model_name)?;

        tracing::info!(
            "Initializing FastEmbed provider for model: {} (cache: {})",
            config.model_name,
            config.cache_dir.display()
        );

        let cache_dir = config.cache_dir.clone();
        let show_progress = config.show_download_progress;
        let (model, dimension) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                let init_options = InitOptions::new(model_kind)
                    .with_cache_dir(cache_dir)
                    .with_show_download_progress(show_progress);

                let mut model = TextEmbedding::try_new(init_options)
                    .map_err(|e| EmbedError::ModelInitialization { source: e.into() })?;

                let sample = model
                    .embed(vec!["passage: dimension check".to_string()], None)
                    .map_err(|e| EmbedError::ModelInitialization { source: e.into() })?;
                let dimension = sample.first().map(|emb| emb.len()).unwrap_or(0);
                if dimension == 0 {
                    return Err(EmbedError::invalid_response(
                        "Model validation failed: empty embedding",
                    ));
                }

                Ok((model, dimension))
            })
            .await??;

        tracing::info!("Model loaded successfully. Dimension: {}", dimension);

        Ok(Self {
            config,
            model: Arc::new(Mutex::new(model)),
            dimension,
        })
    }

    pub fn config(&self) -> &LocalEmbedConfig {
        &self.config
    }
}

#[cfg(feature = "local")]
#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_texts(&self, texts: &[String], role: EmbedRole) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        let inputs: Vec<String> = texts
            .iter()
            .map(|text| self.config.prefixed(text, role))
            .collect();
        let model = Arc::clone(&self.model);

        tracing::debug!("Embedding {} {} texts", inputs.len(), role);

        let mut embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
            let mut guard = model
                .lock()
                .map_err(|_| EmbedError::EmbeddingGeneration {
                    source: "embedding model lock poisoned".into(),
                })?;
            guard
                .embed(inputs, None)
                .map_err(|e| EmbedError::EmbeddingGeneration { source: e.into() })
        })
        .await??;

        if embeddings.len() != texts.len() {
            return Err(EmbedError::invalid_response(format!(
                "model returned {} embeddings for {} texts",
                embeddings.len(),
                texts.len()
            )));
        }

        if self.config.normalize {
            for embedding in &mut embeddings {
                l2_normalize(embedding);
            }
        }

        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }

    fn max_batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn normalized(&self) -> bool {
        self.config.normalize
    }
}
