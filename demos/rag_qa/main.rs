//! # RAG Question Answering Demo
//!
//! Loads a text file, splits it into small overlapping chunks, indexes them
//! with OpenAI embeddings, and asks one question through the conversational
//! retrieval chain.
//!
//! Requires `OPENAI_API_KEY` (a `.env` file is honoured).
//!
//! Run: `cargo run --example rag_qa -- path/to/file.txt`
//! (defaults to `./example.txt`)

use std::path::PathBuf;
use std::sync::Arc;

use rag_core::openai::{OpenAIChatProvider, OpenAIEmbeddingProvider};
use rag_core::{
    ConversationalAnswerer, ConversationalRetrievalChain, DocumentLoader, EmbeddingProvider,
    GenerationParams, RagConfig, TextLoader,
};
use tracing_subscriber::EnvFilter;

const QUESTION: &str = "What is the capital of France?";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let path = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| "example.txt".into());

    // Small chunks so a short file still yields several candidates.
    let config = RagConfig::builder().chunk_size(100).chunk_overlap(20).build()?;

    let document = TextLoader::new().load(&path).await?;
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OpenAIEmbeddingProvider::from_env()?);
    let index = config
        .index_builder()
        .build_from_documents(&[document], &config.chunker()?, embedder.as_ref())
        .await?;
    println!("Indexed {} chunks from {}", index.len(), path.display());

    let retriever = config.retriever(Arc::new(index), embedder)?;
    let answerer = ConversationalAnswerer::new(
        Arc::new(OpenAIChatProvider::from_env()?),
        GenerationParams::default(),
    )?;
    let chain = ConversationalRetrievalChain::builder()
        .retriever(retriever)
        .answerer(answerer)
        .build()?;

    let output = chain.call(QUESTION, &[]).await?;

    println!("Question: {}", output.question);
    println!("Answer: {}", output.answer);
    match output.sources.first().and_then(|chunk| chunk.source()) {
        Some(source) => println!("Source: {source}"),
        None => println!("Source: (none)"),
    }

    Ok(())
}
