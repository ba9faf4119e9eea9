//! Grounded answer generation.
//!
//! [`QueryEngine`] embeds a question with the query role, ranks the index, and hands
//! the top documents to an [`AnswerSynthesizer`], which builds the grounding prompt
//! and calls a [`Generator`]. The generator's reply is returned verbatim.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use docent_context::{ContextPassage, GroundingPromptBuilder};
use docent_embed::{EmbedRole, EmbeddingProvider};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::retriever::{DEFAULT_TOP_K, Retriever, ScoredDocument, SimilarityMetric};
use crate::storage::DocumentMap;

pub const DEFAULT_GENERATION_MODEL: &str = "gemini-1.5-flash";

/// Text generation backend: prompt in, text out.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    fn name(&self) -> &str;
}

/// Gemini `generateContent` client
pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for GeminiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiGenerator")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiGenerator {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        anyhow::ensure!(
            !api_key.trim().is_empty(),
            "missing Gemini API key (pass --api-key or set GEMINI_API_KEY)"
        );
        let client = Client::builder()
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self {
            client,
            api_key,
            base_url: docent_embed::config::DEFAULT_GEMINI_BASE_URL.to_string(),
            model: DEFAULT_GENERATION_MODEL.to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = GenerateRequest::new(prompt);
        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.trim())
            .json(&body)
            .send()
            .await
            .context("failed to call Gemini generateContent")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("Gemini returned {}: {}", status, text);
        }
        let parsed: GenerateResponse = resp
            .json()
            .await
            .context("failed to parse Gemini response")?;
        parsed.into_text()
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

impl<'a> GenerateRequest<'a> {
    fn new(prompt: &'a str) -> Self {
        Self {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        }
    }
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn into_text(self) -> Result<String> {
        let Some(content) = self.candidates.into_iter().next().and_then(|c| c.content) else {
            bail!("Gemini response contained no candidates");
        };
        Ok(content
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect::<String>())
    }
}

/// Builds grounded prompts and asks the generator.
pub struct AnswerSynthesizer {
    generator: Arc<dyn Generator>,
    prompt: GroundingPromptBuilder,
}

impl AnswerSynthesizer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            prompt: GroundingPromptBuilder::default(),
        }
    }

    pub fn with_prompt_builder(mut self, prompt: GroundingPromptBuilder) -> Self {
        self.prompt = prompt;
        self
    }

    /// The exact prompt sent for `question` with `documents` as context.
    pub fn prompt_for(&self, question: &str, documents: &[ScoredDocument]) -> String {
        let passages: Vec<ContextPassage<'_>> = documents
            .iter()
            .map(|scored| ContextPassage {
                source: &scored.document.source,
                title: &scored.document.title,
                text: &scored.document.text,
            })
            .collect();
        self.prompt.build(question, &passages)
    }

    pub async fn synthesize(&self, question: &str, documents: &[ScoredDocument]) -> Result<String> {
        let prompt = self.prompt_for(question, documents);
        debug!(
            "Sending {} char prompt to {}",
            prompt.len(),
            self.generator.name()
        );
        self.generator.generate(&prompt).await
    }
}

/// A generated answer and the documents it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<ScoredDocument>,
}

/// Question answering over a loaded index.
pub struct QueryEngine {
    provider: Arc<dyn EmbeddingProvider>,
    retriever: Retriever,
    synthesizer: Option<AnswerSynthesizer>,
    top_k: usize,
}

impl QueryEngine {
    /// Rank with the metric matching the provider's vectors.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, documents: DocumentMap) -> Self {
        let metric = SimilarityMetric::for_normalized(provider.normalized());
        info!(
            "Query engine over {} documents ({} metric, {} embedder)",
            documents.len(),
            match metric {
                SimilarityMetric::Dot => "dot",
                SimilarityMetric::Cosine => "cosine",
            },
            provider.provider_name()
        );
        Self {
            provider,
            retriever: Retriever::new(documents, metric),
            synthesizer: None,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_synthesizer(mut self, synthesizer: AnswerSynthesizer) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Embed `question` and return the best matching documents.
    pub async fn search(&self, question: &str) -> Result<Vec<ScoredDocument>> {
        let query = self
            .provider
            .embed_text(question.trim(), EmbedRole::Query)
            .await
            .context("Failed to embed question")?;
        Ok(self.retriever.top_k(&query, self.top_k)?)
    }

    /// Retrieve context for `question` and generate a grounded answer.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let Some(synthesizer) = &self.synthesizer else {
            bail!("No generator configured; answers need a Gemini API key");
        };
        let sources = self.search(question).await?;
        let text = synthesizer.synthesize(question, &sources).await?;
        Ok(Answer { text, sources })
    }
}
