//! Remote embedding through the Gemini `embedContent` REST endpoint.
//!
//! One request per text, preceded by a fixed delay so long builds stay under the
//! free-tier rate limit. Inputs are cut to the configured character cap and vectors
//! come back unnormalized.

use crate::config::{EmbedRole, RemoteEmbedConfig};
use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use docent_context::truncate_chars;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Embedding provider backed by the Gemini API
#[derive(Clone)]
pub struct GeminiEmbedProvider {
    config: RemoteEmbedConfig,
    client: Client,
    endpoint: String,
}

impl std::fmt::Debug for GeminiEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiEmbedProvider")
            .field("config", &self.config)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl GeminiEmbedProvider {
    /// Build a client. Fails with [`EmbedError::MissingCredential`] when the key is empty.
    pub fn new(config: RemoteEmbedConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder().build()?;
        let endpoint = config.endpoint();
        tracing::info!(
            "Remote embedding via {} (delay {:?} per request)",
            config.model,
            config.request_delay
        );
        Ok(Self {
            config,
            client,
            endpoint,
        })
    }

    pub fn config(&self) -> &RemoteEmbedConfig {
        &self.config
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        if !self.config.request_delay.is_zero() {
            tokio::time::sleep(self.config.request_delay).await;
        }

        let input = truncate_chars(text, self.config.max_input_chars);
        let model = format!("models/{}", self.config.model);
        let request = EmbedContentRequest::new(&model, &input);

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", self.config.api_key.trim())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbedError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbedContentResponse = response.json().await?;
        parsed.into_values()
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedProvider {
    // Gemini embeddings have no passage/query convention, so the role is unused.
    async fn embed_texts(&self, texts: &[String], role: EmbedRole) -> Result<EmbeddingResult> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            tracing::debug!("Requesting {} embedding ({} chars)", role, text.len());
            embeddings.push(self.embed_one(text).await?);
        }
        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.config.dimension
    }

    fn provider_name(&self) -> &str {
        "gemini"
    }

    fn max_batch_size(&self) -> usize {
        1
    }

    fn max_input_chars(&self) -> Option<usize> {
        Some(self.config.max_input_chars)
    }

    fn normalized(&self) -> bool {
        false
    }
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
}

impl<'a> EmbedContentRequest<'a> {
    fn new(model: &'a str, text: &'a str) -> Self {
        Self {
            model,
            content: Content {
                parts: vec![Part { text }],
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: Option<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

impl EmbedContentResponse {
    fn into_values(self) -> Result<Vec<f32>> {
        match self.embedding {
            Some(embedding) if !embedding.values.is_empty() => Ok(embedding.values),
            _ => Err(EmbedError::invalid_response(
                "embedding response contained no values",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_request_body_shape() {
        let request = EmbedContentRequest::new("models/embedding-001", "hello");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "models/embedding-001",
                "content": { "parts": [ { "text": "hello" } ] }
            })
        );
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"embedding":{"values":[0.25,-0.5,1.0]}}"#;
        let parsed: EmbedContentResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.into_values().unwrap(), vec![0.25, -0.5, 1.0]);

        let empty: EmbedContentResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            empty.into_values(),
            Err(EmbedError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_missing_key_is_fatal() {
        let err = GeminiEmbedProvider::new(RemoteEmbedConfig::gemini("")).unwrap_err();
        assert!(matches!(err, EmbedError::MissingCredential { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_provider_limits() {
        let provider = GeminiEmbedProvider::new(
            RemoteEmbedConfig::gemini("key").with_request_delay(Duration::ZERO),
        )
        .unwrap();
        assert_eq!(provider.max_batch_size(), 1);
        assert_eq!(provider.max_input_chars(), Some(2_000));
        assert_eq!(provider.embedding_dimension(), 768);
        assert!(!provider.normalized());
        assert!(!format!("{provider:?}").contains("\"key\""));
    }

    /// Address with nothing listening, so every request fails fast.
    fn closed_local_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{port}")
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_delay_precedes_every_request() {
        let delay = Duration::from_secs(5);
        let provider = GeminiEmbedProvider::new(
            RemoteEmbedConfig::gemini("key")
                .with_base_url(closed_local_url())
                .with_request_delay(delay),
        )
        .unwrap();

        let start = tokio::time::Instant::now();
        for text in ["first", "second"] {
            let err = provider.embed_text(text, EmbedRole::Passage).await.unwrap_err();
            assert!(matches!(err, EmbedError::Http { .. }));
        }
        assert!(start.elapsed() >= delay * 2);
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_requests() {
        let provider = GeminiEmbedProvider::new(RemoteEmbedConfig::gemini("key")).unwrap();
        // A request would sleep the full default delay first.
        let result = tokio::time::timeout(
            Duration::from_millis(100),
            provider.embed_texts(&[], EmbedRole::Passage),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(result.is_empty());
    }
}
