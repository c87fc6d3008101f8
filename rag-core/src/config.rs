//! Configuration for chunking, indexing, and retrieval.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chunking::RecursiveChunker;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::{DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, IndexBuilder, VectorIndex};
use crate::retriever::Retriever;

/// Number of chunks retrieved per question unless configured otherwise.
pub const DEFAULT_TOP_K: usize = 4;

/// Configuration parameters for the RAG pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Maximum number of characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of top results to retrieve per question.
    pub top_k: usize,
    /// Minimum similarity score for results; `None` keeps everything.
    pub similarity_threshold: Option<f32>,
    /// Number of chunk texts per embedding request during index build.
    pub embed_batch_size: usize,
    /// Number of embedding requests in flight during index build.
    pub embed_concurrency: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 100,
            top_k: DEFAULT_TOP_K,
            similarity_threshold: None,
            embed_batch_size: DEFAULT_BATCH_SIZE,
            embed_concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `embed_batch_size == 0` or `embed_concurrency == 0`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.embed_batch_size == 0 {
            return Err(RagError::ConfigError(
                "embed_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.embed_concurrency == 0 {
            return Err(RagError::ConfigError(
                "embed_concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// A [`RecursiveChunker`] using this configuration's size and overlap.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] if size and overlap are inconsistent.
    pub fn chunker(&self) -> Result<RecursiveChunker> {
        RecursiveChunker::new(self.chunk_size, self.chunk_overlap)
    }

    /// An [`IndexBuilder`] using this configuration's batching parameters.
    pub fn index_builder(&self) -> IndexBuilder {
        IndexBuilder::default()
            .batch_size(self.embed_batch_size)
            .concurrency(self.embed_concurrency)
    }

    /// A [`Retriever`] over `index` using this configuration's `top_k` and
    /// similarity threshold.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `top_k == 0`.
    pub fn retriever(
        &self,
        index: Arc<VectorIndex>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Retriever> {
        let retriever = Retriever::new(index, provider).with_default_top_k(self.top_k)?;
        Ok(match self.similarity_threshold {
            Some(threshold) => retriever.with_similarity_threshold(threshold),
            None => retriever,
        })
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of top results to retrieve.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = Some(threshold);
        self
    }

    /// Set the number of texts per embedding request.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Set the number of concurrent embedding requests.
    pub fn embed_concurrency(mut self, concurrency: usize) -> Self {
        self.config.embed_concurrency = concurrency;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
