//! Exact top-k retrieval over stored document embeddings.

use serde::Serialize;
use tracing::debug;

use super::document::Document;
use crate::storage::DocumentMap;

pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetrievalError {
    /// A stored embedding and the query vector have different lengths
    #[error(
        "embedding dimension mismatch for {document}: query has {expected}, document has {found}"
    )]
    DimensionMismatch {
        document: String,
        expected: usize,
        found: usize,
    },

    #[error("top-k must be at least 1")]
    InvalidTopK,
}

/// How query and document vectors are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    /// Plain dot product; equals cosine similarity for unit vectors
    Dot,
    Cosine,
}

impl SimilarityMetric {
    /// Dot for providers that return unit vectors, cosine otherwise.
    pub fn for_normalized(normalized: bool) -> Self {
        if normalized { Self::Dot } else { Self::Cosine }
    }

    /// Score two vectors of equal length.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            SimilarityMetric::Dot => dot(a, b),
            SimilarityMetric::Cosine => cosine_similarity(a, b),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cosine similarity; 0 when either vector has zero norm or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot_product = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let norm_a = norm_a.sqrt();
    let norm_b = norm_b.sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// A retrieved document and its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDocument {
    pub score: f32,
    pub document: Document,
}

/// Rank `documents` against `query` and return the best `k`, highest score first.
///
/// Documents without an embedding are not ranked. Equal scores keep collection order.
/// `k` larger than the number of ranked documents returns them all.
pub fn rank<'a>(
    query: &[f32],
    documents: impl IntoIterator<Item = &'a Document>,
    k: usize,
    metric: SimilarityMetric,
) -> Result<Vec<ScoredDocument>, RetrievalError> {
    if k == 0 {
        return Err(RetrievalError::InvalidTopK);
    }

    let mut scored: Vec<(f32, &Document)> = Vec::new();
    let mut unembedded = 0usize;
    for doc in documents {
        let Some(embedding) = &doc.embedding else {
            unembedded += 1;
            continue;
        };
        if embedding.len() != query.len() {
            return Err(RetrievalError::DimensionMismatch {
                document: doc.source.clone(),
                expected: query.len(),
                found: embedding.len(),
            });
        }
        scored.push((metric.score(query, embedding), doc));
    }
    if unembedded > 0 {
        debug!("{} documents without embeddings were not ranked", unembedded);
    }

    // sort_by is stable, so ties keep collection order
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    Ok(scored
        .into_iter()
        .take(k)
        .map(|(score, doc)| ScoredDocument {
            score,
            document: doc.clone(),
        })
        .collect())
}

/// Search handle over a loaded index.
#[derive(Debug, Clone)]
pub struct Retriever {
    documents: DocumentMap,
    metric: SimilarityMetric,
}

impl Retriever {
    pub fn new(documents: DocumentMap, metric: SimilarityMetric) -> Self {
        Self { documents, metric }
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    pub fn documents(&self) -> &DocumentMap {
        &self.documents
    }

    /// Number of documents that carry an embedding
    pub fn searchable(&self) -> usize {
        self.documents.values().filter(|d| d.is_complete()).count()
    }

    pub fn top_k(&self, query: &[f32], k: usize) -> Result<Vec<ScoredDocument>, RetrievalError> {
        rank(query, self.documents.values(), k, self.metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::from_documents;

    fn embedded(source: &str, embedding: Vec<f32>) -> Document {
        Document::new(source, source, "text").with_embedding(embedding)
    }

    fn sources(results: &[ScoredDocument]) -> Vec<&str> {
        results.iter().map(|r| r.document.source.as_str()).collect()
    }

    #[test]
    fn test_cosine_similarity() {
        assert_eq!(cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]), 1.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), -1.0);
        assert!((cosine_similarity(&[0.6, 0.8], &[0.8, 0.6]) - 0.96).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn test_metric_selection() {
        assert_eq!(SimilarityMetric::for_normalized(true), SimilarityMetric::Dot);
        assert_eq!(
            SimilarityMetric::for_normalized(false),
            SimilarityMetric::Cosine
        );
        // unnormalized vectors: dot grows with length, cosine does not
        assert_eq!(SimilarityMetric::Dot.score(&[2.0, 0.0], &[3.0, 0.0]), 6.0);
        assert_eq!(SimilarityMetric::Cosine.score(&[2.0, 0.0], &[3.0, 0.0]), 1.0);
    }

    #[test]
    fn test_orthogonal_unit_vectors() {
        let docs = from_documents([
            embedded("x.md", vec![1.0, 0.0, 0.0]),
            embedded("y.md", vec![0.0, 1.0, 0.0]),
            embedded("z.md", vec![0.0, 0.0, 1.0]),
        ]);
        let retriever = Retriever::new(docs, SimilarityMetric::Cosine);

        let top = retriever.top_k(&[0.0, 1.0, 0.0], 1).unwrap();
        assert_eq!(sources(&top), vec!["y.md"]);
        assert_eq!(top[0].score, 1.0);

        let all = retriever.top_k(&[0.0, 1.0, 0.0], 5).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].document.source, "y.md");
    }

    #[test]
    fn test_ties_keep_collection_order() {
        let docs = from_documents([
            embedded("c.md", vec![1.0, 0.0]),
            embedded("a.md", vec![1.0, 0.0]),
            embedded("b.md", vec![0.0, 1.0]),
        ]);
        let results = rank(&[1.0, 0.0], docs.values(), 3, SimilarityMetric::Dot).unwrap();
        assert_eq!(sources(&results), vec!["a.md", "c.md", "b.md"]);
    }

    #[test]
    fn test_unembedded_documents_are_skipped() {
        let docs = from_documents([
            embedded("a.md", vec![1.0, 0.0]),
            Document::new("pending.md", "Pending", "no vector yet"),
        ]);
        let retriever = Retriever::new(docs, SimilarityMetric::Dot);
        assert_eq!(retriever.searchable(), 1);

        let results = retriever.top_k(&[1.0, 0.0], 3).unwrap();
        assert_eq!(sources(&results), vec!["a.md"]);
    }

    #[test]
    fn test_dimension_mismatch_is_an_error() {
        let docs = from_documents([
            embedded("a.md", vec![1.0, 0.0]),
            embedded("b.md", vec![1.0, 0.0, 0.0]),
        ]);
        let err = rank(&[1.0, 0.0], docs.values(), 3, SimilarityMetric::Cosine).unwrap_err();
        assert_eq!(
            err,
            RetrievalError::DimensionMismatch {
                document: "b.md".to_string(),
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn test_zero_k_is_rejected() {
        let docs = from_documents([embedded("a.md", vec![1.0])]);
        let err = rank(&[1.0], docs.values(), 0, SimilarityMetric::Dot).unwrap_err();
        assert_eq!(err, RetrievalError::InvalidTopK);
    }

    #[test]
    fn test_empty_collection_returns_nothing() {
        let retriever = Retriever::new(DocumentMap::new(), SimilarityMetric::Cosine);
        assert!(retriever.top_k(&[1.0, 0.0], 3).unwrap().is_empty());
    }
}
