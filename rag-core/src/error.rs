//! Error types for the `rag-core` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in RAG operations.
///
/// Every failure surfaces as one of these variants so callers can branch on
/// the kind. Nothing in this crate retries or degrades silently.
#[derive(Debug, Error)]
pub enum RagError {
    /// The requested document does not exist.
    #[error("Document not found: {}", path.display())]
    NotFound {
        /// The path that was requested.
        path: PathBuf,
    },

    /// Reading a document failed for a reason other than absence.
    #[error("I/O error reading {}: {source}", path.display())]
    IoError {
        /// The path being read.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generation provider failed or produced no usable output.
    #[error("Generation error ({provider}): {message}")]
    GenerationError {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A query vector does not match the dimensionality of the index.
    #[error("Dimension mismatch: index stores {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch {
        /// The dimensionality of the stored vectors.
        expected: usize,
        /// The dimensionality of the offending vector.
        actual: usize,
    },

    /// A caller supplied an argument outside the accepted domain.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The operation was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,
}

impl RagError {
    pub(crate) fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmbeddingError { provider: provider.into(), message: message.into() }
    }

    pub(crate) fn generation(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GenerationError { provider: provider.into(), message: message.into() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
