//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;

use crate::document::Embedding;
use crate::error::Result;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends (OpenAI, a local model,
/// a hashing trick) behind a unified async interface. The default
/// [`embed_batch`](EmbeddingProvider::embed_batch) implementation calls
/// [`embed`](EmbeddingProvider::embed) sequentially; backends that support
/// native batching should override it.
///
/// Query and corpus embeddings are only comparable when they come from the
/// same provider, model, and version. Nothing checks this at runtime: the
/// [`Retriever`](crate::Retriever) must be given the provider the index was
/// built with.
///
/// Failures are reported as [`RagError::EmbeddingError`](crate::RagError::EmbeddingError).
///
/// # Example
///
/// ```rust,ignore
/// use rag_core::{EmbeddingProvider, HashingEmbeddingProvider};
///
/// let provider = HashingEmbeddingProvider::new(256)?;
/// let vectors = provider.embed_batch(&["Paris is in France.", "Lyon too."]).await?;
/// assert!(vectors.iter().all(|v| v.len() == provider.dimensions()));
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Generate embedding vectors for a batch of text inputs, in input order.
    ///
    /// The default implementation calls [`embed`](EmbeddingProvider::embed)
    /// sequentially for each input. Override this method if the backend
    /// supports native batch embedding for better throughput.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Length of the vectors this provider is expected to return.
    fn dimensions(&self) -> usize;

    /// A short label identifying the backend in errors and logs.
    fn name(&self) -> &str {
        "embedding"
    }
}
