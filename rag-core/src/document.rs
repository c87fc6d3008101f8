//! Data types for documents, chunks, search results, and conversation turns.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Key-value metadata attached to a [`Document`].
///
/// Ordered so that anything rendered from it (prompts, logs) is stable.
pub type Metadata = BTreeMap<String, String>;

/// A fixed-length embedding vector.
pub type Embedding = Vec<f32>;

/// The metadata key under which loaders record where a document came from.
pub const SOURCE_KEY: &str = "source";

/// A source document containing text content and metadata.
///
/// Documents are immutable once loaded. Metadata is held behind an [`Arc`]
/// so chunks can point back at it without copying or owning it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    pub metadata: Arc<Metadata>,
}

impl Document {
    /// Create a document with empty metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: Arc::new(Metadata::new()) }
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.metadata).insert(key.into(), value.into());
        self
    }

    /// The originating location recorded under [`SOURCE_KEY`], if any.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

/// A contiguous segment of a [`Document`].
///
/// `metadata` is a shared handle to the parent document's metadata; the
/// document itself never references its chunks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk, `{document_id}_{ordinal}`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Position of this chunk among its document's chunks.
    pub ordinal: usize,
    /// Byte offset of `text` within the parent document's text.
    pub start: usize,
    /// The text content of the chunk.
    pub text: String,
    /// Metadata of the parent document.
    pub metadata: Arc<Metadata>,
}

impl Chunk {
    /// Byte offset one past the end of this chunk in the parent document.
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }

    /// The originating location of the parent document, if recorded.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Arc<Chunk>,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// Search results ordered by descending score, ties in insertion order.
pub type RetrievalResult = Vec<SearchResult>;

/// One completed question/answer exchange.
///
/// History is owned by the caller and passed into each call; nothing in this
/// crate keeps conversation state between calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    /// The question the user asked.
    pub question: String,
    /// The answer that was given.
    pub answer: String,
}

impl ConversationTurn {
    /// Create a turn from a question and its answer.
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self { question: question.into(), answer: answer.into() }
    }
}
