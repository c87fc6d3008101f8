//! Query-time retrieval: embed the query, then search the index.

use std::sync::Arc;

use tracing::{error, info};

use crate::cancel::{CancellationToken, run_cancellable};
use crate::config::DEFAULT_TOP_K;
use crate::document::RetrievalResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;

/// Wraps a [`VectorIndex`] with the embedding step and a top-k policy.
///
/// The provider must be the one (same model and version) the index was built
/// with; scores between embeddings of different models are meaningless. This
/// is a precondition, not something that can be checked here.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use rag_core::Retriever;
///
/// let retriever = Retriever::new(Arc::new(index), provider.clone());
/// let results = retriever.retrieve("What is the capital of France?", 4).await?;
/// ```
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    provider: Arc<dyn EmbeddingProvider>,
    default_top_k: usize,
    similarity_threshold: Option<f32>,
}

impl Retriever {
    /// Create a retriever over `index` that embeds queries with `provider`.
    pub fn new(index: Arc<VectorIndex>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { index, provider, default_top_k: DEFAULT_TOP_K, similarity_threshold: None }
    }

    /// Set the `k` used by [`retrieve_default`](Self::retrieve_default).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `k == 0`.
    pub fn with_default_top_k(mut self, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        self.default_top_k = k;
        Ok(self)
    }

    /// Drop results scoring below `threshold`.
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }

    /// The underlying index.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// The `k` used by [`retrieve_default`](Self::retrieve_default).
    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Retrieve the top `k` chunks for `query_text`.
    ///
    /// # Errors
    ///
    /// See [`retrieve_with_cancel`](Self::retrieve_with_cancel).
    pub async fn retrieve(&self, query_text: &str, k: usize) -> Result<RetrievalResult> {
        self.retrieve_with_cancel(query_text, k, &CancellationToken::new()).await
    }

    /// Retrieve the configured default number of chunks for `query_text`.
    ///
    /// # Errors
    ///
    /// See [`retrieve_with_cancel`](Self::retrieve_with_cancel).
    pub async fn retrieve_default(&self, query_text: &str) -> Result<RetrievalResult> {
        self.retrieve(query_text, self.default_top_k).await
    }

    /// Retrieve the top `k` chunks for `query_text`, aborting if `cancel` fires.
    ///
    /// # Errors
    ///
    /// - Any error from the embedding provider, unchanged.
    /// - Any error from [`VectorIndex::query`] (`InvalidArgument`,
    ///   `DimensionMismatch`).
    /// - [`RagError::Cancelled`](crate::RagError::Cancelled) on cancellation.
    pub async fn retrieve_with_cancel(
        &self,
        query_text: &str,
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<RetrievalResult> {
        let query_embedding =
            run_cancellable(cancel, self.provider.embed(query_text)).await.map_err(|e| {
                error!(provider = self.provider.name(), error = %e, "embedding failed during query");
                e
            })?;

        let mut results = self.index.query(&query_embedding, k)?;
        if let Some(threshold) = self.similarity_threshold {
            results.retain(|r| r.score >= threshold);
        }

        info!(k, result_count = results.len(), "retrieval completed");
        Ok(results)
    }
}
