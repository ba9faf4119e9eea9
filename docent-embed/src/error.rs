//! Error types for the embedding system

/// Result type for embedding operations.
///
/// This is a convenience type alias that uses [`EmbedError`] as the error type.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// # Error Categories
///
/// - **Configuration Errors**: invalid model settings, missing credentials, backends
///   that were not compiled in
/// - **Initialization Errors**: failures while loading a local model
/// - **Runtime Errors**: failures during embedding generation, local or remote,
///   including responses that carry no usable vectors
/// - **External Errors**: failures from dependencies
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// A remote provider was requested without an API key
    #[error("Missing API credential for {provider}")]
    MissingCredential { provider: String },

    /// The requested backend was not compiled into this build
    #[error("Embedding backend '{backend}' is not available in this build")]
    BackendUnavailable { backend: String },

    /// Error when model configuration is invalid
    #[error("Invalid model configuration: {message}")]
    InvalidConfig { message: String },

    /// Error during model initialization
    #[error("Model initialization failed: {source}")]
    ModelInitialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error during embedding generation
    #[error("Embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The backend answered, but not with the vectors that were asked for
    #[error("Unusable embedding response: {message}")]
    InvalidResponse { message: String },

    /// The remote API answered with a non-success status
    #[error("Embedding API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// Transport-level HTTP failure
    #[error("HTTP error: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    /// Async task join errors
    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Generic errors from other libraries
    #[error("External error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Create a model initialization error from any error type.
    pub fn model_init<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ModelInitialization {
            source: Box::new(source),
        }
    }

    /// Create an embedding generation error from any error type.
    pub fn embedding_gen<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::EmbeddingGeneration {
            source: Box::new(source),
        }
    }

    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an error for a response with missing or miscounted vectors.
    pub fn invalid_response<S: Into<String>>(message: S) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Whether this error stops the tool from starting at all.
    ///
    /// Missing credentials, unavailable backends and model load failures cannot be
    /// recovered by retrying a single document.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential { .. }
                | Self::BackendUnavailable { .. }
                | Self::ModelInitialization { .. }
        )
    }
}
