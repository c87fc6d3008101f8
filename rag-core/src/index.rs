//! Exact in-memory vector index.
//!
//! [`VectorIndex`] is built once from a set of chunks and is read-only
//! afterwards, so an `Arc<VectorIndex>` can serve any number of concurrent
//! queries without locking. Queries are a brute-force scan with exact top-k
//! selection.

use std::cmp::Ordering;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, error, info, warn};

use crate::cancel::{CancellationToken, run_cancellable};
use crate::chunking::Chunker;
use crate::document::{Chunk, Document, Embedding, RetrievalResult, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::similarity::DistanceMetric;

/// Default number of chunk texts sent to the provider per request.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Default number of embedding requests in flight during a build.
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug)]
struct Entry {
    chunk: Arc<Chunk>,
    embedding: Embedding,
}

/// An immutable collection of chunk embeddings supporting exact top-k search.
///
/// All stored vectors share one dimensionality, fixed by the first embedding
/// at build time. Entries keep their insertion order, which breaks ties
/// between equal scores.
///
/// # Example
///
/// ```rust,ignore
/// use rag_core::VectorIndex;
///
/// let index = VectorIndex::build(chunks, &provider).await?;
/// let results = index.query(&query_embedding, 4)?;
/// ```
#[derive(Debug)]
pub struct VectorIndex {
    entries: Vec<Entry>,
    dimensions: Option<usize>,
    metric: DistanceMetric,
}

impl VectorIndex {
    /// Create a new [`IndexBuilder`] with default batching and cosine similarity.
    pub fn builder() -> IndexBuilder {
        IndexBuilder::default()
    }

    /// Embed every chunk with `provider` and build an index using the defaults.
    ///
    /// # Errors
    ///
    /// See [`IndexBuilder::build_with_cancel`].
    pub async fn build(chunks: Vec<Chunk>, provider: &dyn EmbeddingProvider) -> Result<Self> {
        Self::builder().build(chunks, provider).await
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dimensionality of the stored vectors, or `None` for an empty index.
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    /// The similarity metric used by [`query`](Self::query).
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Stored chunks in insertion order.
    pub fn chunks(&self) -> impl Iterator<Item = &Arc<Chunk>> + '_ {
        self.entries.iter().map(|entry| &entry.chunk)
    }

    /// Return the `k` stored chunks most similar to `vector`.
    ///
    /// Results are ordered by descending score; equal scores keep insertion
    /// order. If `k` exceeds the number of entries every entry is returned.
    /// An empty index yields an empty result.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidArgument`] if `k == 0` or `vector` contains a
    ///   non-finite component.
    /// - [`RagError::DimensionMismatch`] if `vector` has the wrong length.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(RagError::InvalidArgument("k must be greater than zero".into()));
        }
        let Some(dimensions) = self.dimensions else {
            return Ok(Vec::new());
        };
        if vector.len() != dimensions {
            return Err(RagError::DimensionMismatch { expected: dimensions, actual: vector.len() });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(RagError::InvalidArgument("query vector must be finite".into()));
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, canonical(self.metric.similarity(&entry.embedding, vector))))
            .collect();

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_rank);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_rank);

        debug!(k, result_count = scored.len(), "vector index query");

        Ok(scored
            .into_iter()
            .map(|(i, score)| SearchResult { chunk: Arc::clone(&self.entries[i].chunk), score })
            .collect())
    }
}

/// Descending score, then ascending insertion index.
fn by_rank(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}

/// Fold `-0.0` into `0.0` and NaN to the bottom so `total_cmp` ranks like `==`.
fn canonical(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else if score == 0.0 {
        0.0
    } else {
        score
    }
}

/// Builder controlling how a [`VectorIndex`] is embedded and scored.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    batch_size: usize,
    concurrency: usize,
    metric: DistanceMetric,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            metric: DistanceMetric::default(),
        }
    }
}

impl IndexBuilder {
    /// Set how many chunk texts go into one `embed_batch` call (minimum 1).
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set how many `embed_batch` calls may be in flight at once (minimum 1).
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the similarity metric.
    pub fn metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Build an index that cannot be cancelled.
    ///
    /// # Errors
    ///
    /// See [`build_with_cancel`](Self::build_with_cancel).
    pub async fn build(
        &self,
        chunks: Vec<Chunk>,
        provider: &dyn EmbeddingProvider,
    ) -> Result<VectorIndex> {
        self.build_with_cancel(chunks, provider, &CancellationToken::new()).await
    }

    /// Split each document with `chunker`, then build an index over all chunks.
    ///
    /// # Errors
    ///
    /// See [`build_with_cancel`](Self::build_with_cancel).
    pub async fn build_from_documents(
        &self,
        documents: &[Document],
        chunker: &dyn Chunker,
        provider: &dyn EmbeddingProvider,
    ) -> Result<VectorIndex> {
        let chunks = documents.iter().flat_map(|document| chunker.split(document)).collect();
        self.build(chunks, provider).await
    }

    /// Embed every chunk and build the index.
    ///
    /// Chunk texts are embedded in batches of `batch_size`, with up to
    /// `concurrency` batches in flight; results are re-joined in chunk order.
    /// The index is only assembled once every embedding has arrived and
    /// passed validation, so a failure never leaves a partial index behind.
    ///
    /// # Errors
    ///
    /// - Any error returned by the provider, unchanged.
    /// - [`RagError::EmbeddingError`] if a batch returns the wrong number of
    ///   vectors, or a vector is empty, non-finite, or of a different length
    ///   than the first.
    /// - [`RagError::Cancelled`] if `cancel` fires before the build finishes.
    pub async fn build_with_cancel(
        &self,
        chunks: Vec<Chunk>,
        provider: &dyn EmbeddingProvider,
        cancel: &CancellationToken,
    ) -> Result<VectorIndex> {
        if chunks.is_empty() {
            info!(entry_count = 0, "built empty vector index");
            return Ok(VectorIndex { entries: Vec::new(), dimensions: None, metric: self.metric });
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let requests = texts.chunks(self.batch_size).map(|batch| async move {
            let vectors = provider.embed_batch(batch).await?;
            if vectors.len() != batch.len() {
                return Err(RagError::embedding(
                    provider.name(),
                    format!("requested {} embeddings, received {}", batch.len(), vectors.len()),
                ));
            }
            Ok::<_, RagError>(vectors)
        });

        let batches: Vec<Vec<Embedding>> = run_cancellable(
            cancel,
            stream::iter(requests).buffered(self.concurrency).try_collect(),
        )
        .await
        .map_err(|e| {
            error!(chunk_count = chunks.len(), error = %e, "embedding failed during index build");
            e
        })?;
        let embeddings: Vec<Embedding> = batches.into_iter().flatten().collect();

        let dimensions = validate_embeddings(&chunks, &embeddings, provider.name())?;
        if dimensions != provider.dimensions() {
            warn!(
                provider = provider.name(),
                reported = provider.dimensions(),
                actual = dimensions,
                "provider returned vectors of a different size than it reports"
            );
        }

        let entries: Vec<Entry> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| Entry { chunk: Arc::new(chunk), embedding })
            .collect();

        info!(entry_count = entries.len(), dimensions, metric = ?self.metric, "built vector index");

        Ok(VectorIndex { entries, dimensions: Some(dimensions), metric: self.metric })
    }
}

/// Check every vector and return the shared dimensionality.
fn validate_embeddings(chunks: &[Chunk], embeddings: &[Embedding], provider: &str) -> Result<usize> {
    let mut dimensions = None;
    for (chunk, embedding) in chunks.iter().zip(embeddings) {
        if embedding.is_empty() {
            return Err(RagError::embedding(
                provider,
                format!("empty embedding for chunk '{}'", chunk.id),
            ));
        }
        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(RagError::embedding(
                provider,
                format!("non-finite embedding for chunk '{}'", chunk.id),
            ));
        }
        match dimensions {
            None => dimensions = Some(embedding.len()),
            Some(expected) if expected != embedding.len() => {
                return Err(RagError::embedding(
                    provider,
                    format!(
                        "inconsistent embedding length for chunk '{}': expected {expected}, got {}",
                        chunk.id,
                        embedding.len()
                    ),
                ));
            }
            Some(_) => {}
        }
    }
    dimensions.ok_or_else(|| RagError::embedding(provider, "no embeddings returned"))
}
