//! Conversational retrieval chain: condensing, retrieval, answering.

mod common;

use std::sync::Arc;

use common::ScriptedGenerator;
use rag_core::{
    Attribution, Chunker, ConversationTurn, ConversationalAnswerer, ConversationalRetrievalChain,
    Document, EmbeddingProvider, GenerationParams, GenerationProvider, HashingEmbeddingProvider,
    RagError, RecursiveChunker, Retriever, VectorIndex,
};

const TEXT: &str = "Paris is the capital of France. The Eiffel Tower stands in Paris. \
                    Lyon is known for its cuisine. Marseille is a port on the Mediterranean.";

async fn retriever() -> Retriever {
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbeddingProvider::new(1024).unwrap());
    let doc = Document::new("france.txt", TEXT).with_metadata("source", "france.txt");
    let chunks = RecursiveChunker::new(40, 0).unwrap().split(&doc);
    let index = VectorIndex::build(chunks, provider.as_ref()).await.unwrap();
    Retriever::new(Arc::new(index), provider)
}

fn chain(generator: &Arc<ScriptedGenerator>, retriever: Retriever) -> ConversationalRetrievalChain {
    let provider: Arc<dyn GenerationProvider> = generator.clone();
    let answerer = ConversationalAnswerer::new(provider, GenerationParams::default()).unwrap();
    ConversationalRetrievalChain::builder()
        .retriever(retriever)
        .answerer(answerer)
        .top_k(2)
        .build()
        .unwrap()
}

#[tokio::test]
async fn first_question_is_not_condensed() {
    let generator = Arc::new(ScriptedGenerator::new(["Paris.\nSOURCES: 1"]));
    let chain = chain(&generator, retriever().await);

    let output = chain.call("What is the capital of France?", &[]).await.unwrap();

    assert_eq!(generator.call_count(), 1);
    assert_eq!(output.question, "What is the capital of France?");
    assert!(output.generated_question.is_none());
    assert_eq!(output.answer, "Paris.");
    assert_eq!(output.attribution, Attribution::Cited);
    assert_eq!(output.retrieved.len(), 2);
    assert!(output.retrieved[0].chunk.text.starts_with("Paris is the capital"));
    assert_eq!(output.sources[0].source(), Some("france.txt"));
}

#[tokio::test]
async fn follow_up_is_condensed_before_retrieval() {
    let generator = Arc::new(ScriptedGenerator::new([
        "What food is Lyon known for?",
        "Its cuisine.\nSOURCES: 1",
    ]));
    let chain = chain(&generator, retriever().await);
    let history = vec![ConversationTurn::new("Tell me about Lyon", "Lyon is a city in France.")];

    let output = chain.call("What is it known for?", &history).await.unwrap();

    assert_eq!(generator.call_count(), 2);
    assert_eq!(output.generated_question.as_deref(), Some("What food is Lyon known for?"));
    assert!(output.retrieved[0].chunk.text.contains("Lyon"));

    let condense = generator.prompt(0);
    let condense_text = condense.render();
    assert!(condense_text.contains("Human: Tell me about Lyon\nAssistant: Lyon is a city in France."));
    assert!(condense_text.contains("Follow-up question: What is it known for?"));

    // The answer prompt carries the original question, not the rewrite.
    let answer_prompt = generator.prompt(1);
    let last = &answer_prompt.messages.last().unwrap().content;
    assert!(last.ends_with("Question: What is it known for?"));
    assert_eq!(output.to_turn(), ConversationTurn::new("What is it known for?", "Its cuisine."));
}

#[tokio::test]
async fn condensing_can_be_disabled() {
    let generator = Arc::new(ScriptedGenerator::new(["Its cuisine."]));
    let provider: Arc<dyn GenerationProvider> = generator.clone();
    let chain = ConversationalRetrievalChain::builder()
        .retriever(retriever().await)
        .answerer(ConversationalAnswerer::new(provider, GenerationParams::default()).unwrap())
        .condense_question(false)
        .build()
        .unwrap();
    let history = vec![ConversationTurn::new("Tell me about Lyon", "A city.")];

    let output = chain.call("What is Lyon known for?", &history).await.unwrap();
    assert_eq!(generator.call_count(), 1);
    assert!(output.generated_question.is_none());
    assert_eq!(chain.top_k(), 4);
}

#[tokio::test]
async fn condense_params_are_used_for_the_rewrite() {
    let generator = Arc::new(ScriptedGenerator::new(["Standalone?", "Answer."]));
    let provider: Arc<dyn GenerationProvider> = generator.clone();
    let chain = ConversationalRetrievalChain::builder()
        .retriever(retriever().await)
        .answerer(ConversationalAnswerer::new(provider, GenerationParams::default()).unwrap())
        .condense_params(GenerationParams::new("small-model"))
        .build()
        .unwrap();
    let history = vec![ConversationTurn::new("q", "a")];

    chain.call("follow up", &history).await.unwrap();
    let params = generator.params.lock().unwrap().clone();
    assert_eq!(params[0].model, "small-model");
    assert_eq!(params[1].model, GenerationParams::default().model);
}

#[tokio::test]
async fn empty_rewrite_is_a_generation_error() {
    let generator = Arc::new(ScriptedGenerator::new(["  "]));
    let chain = chain(&generator, retriever().await);
    let history = vec![ConversationTurn::new("q", "a")];

    let err = chain.call("follow up", &history).await.unwrap_err();
    assert!(matches!(err, RagError::GenerationError { .. }));
    assert_eq!(generator.call_count(), 1);
}

#[tokio::test]
async fn builder_requires_retriever_and_answerer() {
    let generator = Arc::new(ScriptedGenerator::new(Vec::<String>::new()));
    let provider: Arc<dyn GenerationProvider> = generator.clone();
    let answerer = ConversationalAnswerer::new(provider, GenerationParams::default()).unwrap();

    let missing_retriever = ConversationalRetrievalChain::builder().answerer(answerer.clone()).build();
    assert!(matches!(missing_retriever, Err(RagError::ConfigError(_))));

    let missing_answerer = ConversationalRetrievalChain::builder().retriever(retriever().await).build();
    assert!(matches!(missing_answerer, Err(RagError::ConfigError(_))));

    let zero_k = ConversationalRetrievalChain::builder()
        .retriever(retriever().await)
        .answerer(answerer)
        .top_k(0)
        .build();
    assert!(matches!(zero_k, Err(RagError::ConfigError(_))));
}
