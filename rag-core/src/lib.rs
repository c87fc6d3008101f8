//! # rag-core
//!
//! Retrieval-augmented question answering over a document corpus.
//!
//! ## Overview
//!
//! The crate covers the path from raw text to a grounded, attributed answer:
//!
//! - [`DocumentLoader`] / [`TextLoader`] read files into [`Document`]s
//! - [`RecursiveChunker`] splits documents into overlapping [`Chunk`]s
//! - [`EmbeddingProvider`] turns text into vectors
//! - [`VectorIndex`] stores chunk embeddings and answers exact top-k queries
//! - [`Retriever`] embeds a question and searches the index
//! - [`ConversationalAnswerer`] prompts a [`GenerationProvider`] with history
//!   and retrieved chunks, and reports which chunks the answer cites
//! - [`ConversationalRetrievalChain`] ties retrieval and answering together,
//!   rewriting follow-up questions into standalone ones first
//!
//! Providers are traits so any backend can be plugged in. The `openai`
//! feature adds HTTP providers for the OpenAI API; [`HashingEmbeddingProvider`]
//! is a deterministic offline embedder for tests and demos.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rag_core::*;
//!
//! let config = RagConfig::builder().chunk_size(100).chunk_overlap(20).build()?;
//! let document = TextLoader::new().load("example.txt".as_ref()).await?;
//!
//! let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbeddingProvider::new(256)?);
//! let index = config
//!     .index_builder()
//!     .build_from_documents(&[document], &config.chunker()?, embedder.as_ref())
//!     .await?;
//!
//! let retriever = config.retriever(Arc::new(index), embedder)?;
//! let answerer = ConversationalAnswerer::new(generator, GenerationParams::default())?;
//! let chain = ConversationalRetrievalChain::builder()
//!     .retriever(retriever)
//!     .answerer(answerer)
//!     .build()?;
//!
//! let output = chain.call("What is the capital of France?", &[]).await?;
//! println!("{} ({:?})", output.answer, output.sources.first().and_then(|c| c.source()));
//! ```
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `openai` | [`openai::OpenAIEmbeddingProvider`] and [`openai::OpenAIChatProvider`] |
//! | `full` | All of the above |

pub mod answerer;
pub mod cancel;
pub mod chain;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod hashing;
pub mod index;
pub mod loader;
pub mod retriever;
pub mod similarity;

#[cfg(feature = "openai")]
pub mod openai;

pub use answerer::{Answer, Attribution, ConversationalAnswerer, DEFAULT_SYSTEM_INSTRUCTION};
pub use cancel::CancellationToken;
pub use chain::{ChainOutput, ConversationalRetrievalChain, ConversationalRetrievalChainBuilder};
pub use chunking::{Boundary, Chunker, DEFAULT_BOUNDARIES, RecursiveChunker};
pub use config::{DEFAULT_TOP_K, RagConfig, RagConfigBuilder};
pub use document::{
    Chunk, ConversationTurn, Document, Embedding, Metadata, RetrievalResult, SOURCE_KEY,
    SearchResult,
};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use generation::{
    DEFAULT_MODEL, GenerationParams, GenerationProvider, Message, Prompt, Role,
};
pub use hashing::HashingEmbeddingProvider;
pub use index::{DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, IndexBuilder, VectorIndex};
pub use loader::{DocumentLoader, TextLoader};
pub use retriever::Retriever;
pub use similarity::{DistanceMetric, cosine_similarity};
