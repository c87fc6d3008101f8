//! The full path from a document to an attributed answer.

mod common;

use std::sync::Arc;

use common::ScriptedGenerator;
use rag_core::{
    Attribution, Chunker, ConversationalAnswerer, Document, EmbeddingProvider, GenerationParams,
    GenerationProvider, HashingEmbeddingProvider, RagConfig, RecursiveChunker, Retriever,
    VectorIndex,
};

const TEXT: &str = "Paris is the capital of France. Lyon is known for its cuisine.";
const QUESTION: &str = "What is the capital of France?";

async fn build() -> (Retriever, Vec<rag_core::Chunk>) {
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbeddingProvider::new(1024).unwrap());
    let doc = Document::new("example.txt", TEXT).with_metadata("source", "example.txt");
    let chunks = RecursiveChunker::new(40, 10).unwrap().split(&doc);
    let index = VectorIndex::build(chunks.clone(), provider.as_ref()).await.unwrap();
    (Retriever::new(Arc::new(index), provider), chunks)
}

#[tokio::test]
async fn capital_question_is_answered_from_the_paris_chunk() {
    let (retriever, chunks) = build().await;
    assert_eq!(chunks.len(), 2);
    assert!(chunks[0].text.contains("Paris is the capital of France."));

    let results = retriever.retrieve(QUESTION, 1).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.id, chunks[0].id);

    let generator = Arc::new(ScriptedGenerator::new(["The capital of France is Paris.\nSOURCES: 1"]));
    let provider: Arc<dyn GenerationProvider> = generator.clone();
    let answerer = ConversationalAnswerer::new(provider, GenerationParams::default()).unwrap();

    let retrieved: Vec<_> = results.iter().map(|r| Arc::clone(&r.chunk)).collect();
    let answer = answerer.answer(QUESTION, &[], &retrieved).await.unwrap();

    assert!(answer.answer.contains("Paris"));
    assert_eq!(answer.attribution, Attribution::Cited);
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(*answer.sources[0], chunks[0]);
    assert_eq!(answer.sources[0].source(), Some("example.txt"));
}

#[tokio::test]
async fn repeated_queries_return_identical_results() {
    let (retriever, _) = build().await;
    let first = retriever.retrieve(QUESTION, 2).await.unwrap();
    let second = retriever.retrieve(QUESTION, 2).await.unwrap();

    let key = |rs: &[rag_core::SearchResult]| {
        rs.iter().map(|r| (r.chunk.id.clone(), r.score.to_bits())).collect::<Vec<_>>()
    };
    assert_eq!(key(&first), key(&second));
    assert!(first[0].score > first[1].score);
}

#[tokio::test]
async fn config_drives_chunking_batching_and_retrieval() {
    let config = RagConfig::builder()
        .chunk_size(40)
        .chunk_overlap(10)
        .embed_batch_size(1)
        .top_k(2)
        .similarity_threshold(0.5)
        .build()
        .unwrap();
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbeddingProvider::new(1024).unwrap());
    let doc = Document::new("example.txt", TEXT);

    let index = config
        .index_builder()
        .build_from_documents(&[doc], &config.chunker().unwrap(), provider.as_ref())
        .await
        .unwrap();
    assert_eq!(index.len(), 2);

    let retriever = config.retriever(Arc::new(index), provider).unwrap();
    assert_eq!(retriever.default_top_k(), 2);
    let results = retriever.retrieve_default(QUESTION).await.unwrap();
    assert_eq!(results.len(), 1, "the Lyon chunk scores below the threshold");
    assert!(results[0].chunk.text.contains("Paris"));
    assert!(results[0].score >= 0.5);

    assert!(RagConfig::builder().chunk_size(10).chunk_overlap(10).build().is_err());
    assert!(RagConfig::builder().top_k(0).build().is_err());
    assert_eq!(RagConfig::default().top_k, 4);
}
