//! Retriever: query embedding, error propagation, thresholds, cancellation.

mod common;

use std::sync::Arc;

use common::{FnEmbedder, PendingEmbedder};
use rag_core::{
    CancellationToken, Chunker, Document, EmbeddingProvider, HashingEmbeddingProvider, RagError,
    RecursiveChunker, Retriever, VectorIndex,
};

async fn fruit_index(provider: &dyn EmbeddingProvider) -> VectorIndex {
    let doc = Document::new(
        "fruit",
        "Apples are red or green. Bananas are long and yellow. Cherries are small and red. \
         Grapes grow in bunches.",
    );
    let chunks = RecursiveChunker::new(30, 0).unwrap().split(&doc);
    VectorIndex::build(chunks, provider).await.unwrap()
}

fn hashing() -> Arc<dyn EmbeddingProvider> {
    Arc::new(HashingEmbeddingProvider::new(1024).unwrap())
}

#[tokio::test]
async fn retrieves_most_similar_chunk_first() {
    let provider = hashing();
    let index = Arc::new(fruit_index(provider.as_ref()).await);
    assert_eq!(index.len(), 4);

    let retriever = Retriever::new(index, provider);
    let results = retriever.retrieve("yellow bananas", 2).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].chunk.text.contains("Bananas"));
    assert!(results[0].score >= results[1].score);
}

#[tokio::test]
async fn default_top_k_is_four() {
    let provider = hashing();
    let index = Arc::new(fruit_index(provider.as_ref()).await);
    let retriever = Retriever::new(index, provider);
    assert_eq!(retriever.default_top_k(), 4);
    assert_eq!(retriever.retrieve_default("red fruit").await.unwrap().len(), 4);

    let narrow = retriever.clone().with_default_top_k(1).unwrap();
    assert_eq!(narrow.retrieve_default("red fruit").await.unwrap().len(), 1);
}

#[tokio::test]
async fn zero_default_top_k_is_a_config_error() {
    let provider = hashing();
    let index = Arc::new(fruit_index(provider.as_ref()).await);
    let result = Retriever::new(index, provider).with_default_top_k(0);
    assert!(matches!(result, Err(RagError::ConfigError(_))));
}

#[tokio::test]
async fn threshold_drops_low_scores() {
    let provider = hashing();
    let index = Arc::new(fruit_index(provider.as_ref()).await);
    let retriever = Retriever::new(index, provider).with_similarity_threshold(0.3);
    let results = retriever.retrieve("grapes grow in bunches", 4).await.unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.score >= 0.3));
    assert!(results[0].chunk.text.contains("Grapes"));
}

#[tokio::test]
async fn provider_errors_propagate_unchanged() {
    let provider = hashing();
    let index = Arc::new(fruit_index(provider.as_ref()).await);
    let failing: Arc<dyn EmbeddingProvider> = Arc::new(FnEmbedder::new(1024, |_: &str| {
        Err(RagError::EmbeddingError { provider: "Fn".into(), message: "quota exceeded".into() })
    }));

    let err = Retriever::new(index, failing).retrieve("anything", 2).await.unwrap_err();
    assert!(matches!(
        err,
        RagError::EmbeddingError { ref provider, ref message } if provider == "Fn" && message == "quota exceeded"
    ));
}

#[tokio::test]
async fn mismatched_provider_is_a_dimension_mismatch() {
    let provider = hashing();
    let index = Arc::new(fruit_index(provider.as_ref()).await);
    let other: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbeddingProvider::new(8).unwrap());

    let err = Retriever::new(index, other).retrieve("bananas", 2).await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: 1024, actual: 8 }));
}

#[tokio::test]
async fn k_zero_is_rejected() {
    let provider = hashing();
    let index = Arc::new(fruit_index(provider.as_ref()).await);
    let err = Retriever::new(index, provider).retrieve("bananas", 0).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidArgument(_)));
}

#[tokio::test]
async fn cancellation_interrupts_query_embedding() {
    let provider = hashing();
    let index = Arc::new(fruit_index(provider.as_ref()).await);
    let retriever = Retriever::new(index, Arc::new(PendingEmbedder));

    let token = CancellationToken::new();
    let (result, ()) = tokio::join!(retriever.retrieve_with_cancel("bananas", 2, &token), async {
        tokio::task::yield_now().await;
        token.cancel();
    });
    assert!(matches!(result, Err(RagError::Cancelled)));
}

#[tokio::test]
async fn concurrent_queries_share_one_index() {
    let provider = hashing();
    let index = Arc::new(fruit_index(provider.as_ref()).await);
    let retriever = Retriever::new(index, provider);

    let handles: Vec<_> = ["apples", "bananas", "cherries", "grapes"]
        .into_iter()
        .map(|q| {
            let retriever = retriever.clone();
            tokio::spawn(async move { retriever.retrieve(q, 1).await })
        })
        .collect();

    for (handle, word) in handles.into_iter().zip(["Apples", "Bananas", "Cherries", "Grapes"]) {
        let results = handle.await.unwrap().unwrap();
        assert!(results[0].chunk.text.contains(word), "{word}: {}", results[0].chunk.text);
    }
}
