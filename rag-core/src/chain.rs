//! Conversational retrieval: condense, retrieve, answer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::answerer::{Attribution, ConversationalAnswerer};
use crate::cancel::{CancellationToken, run_cancellable};
use crate::document::{Chunk, ConversationTurn, RetrievalResult};
use crate::error::{RagError, Result};
use crate::generation::{GenerationParams, Message, Prompt};
use crate::retriever::Retriever;

const CONDENSE_INSTRUCTION: &str = "Rewrite the follow-up question so that it can be understood \
without the conversation before it. Keep the language of the original question. Reply with the \
rewritten question only.";

/// The result of one [`ConversationalRetrievalChain::call`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainOutput {
    /// The question as the user asked it.
    pub question: String,
    /// The standalone rewrite used for retrieval, when one was generated.
    pub generated_question: Option<String>,
    /// The answer text.
    pub answer: String,
    /// Chunks the answer is attributed to.
    pub sources: Vec<Arc<Chunk>>,
    /// How `sources` were determined.
    pub attribution: Attribution,
    /// Everything the retriever returned, with scores.
    pub retrieved: RetrievalResult,
}

impl ChainOutput {
    /// The turn to append to the conversation history.
    pub fn to_turn(&self) -> ConversationTurn {
        ConversationTurn::new(self.question.clone(), self.answer.clone())
    }
}

/// Retrieval-augmented question answering over a conversation.
///
/// For a follow-up question (non-empty history) the chain first asks the
/// model for a standalone version of the question, retrieves with that,
/// then answers the original question against the retrieved chunks. The
/// chain keeps no session state; callers thread history through each call
/// with [`ChainOutput::to_turn`].
///
/// # Example
///
/// ```rust,ignore
/// use rag_core::ConversationalRetrievalChain;
///
/// let chain = ConversationalRetrievalChain::builder()
///     .retriever(retriever)
///     .answerer(answerer)
///     .build()?;
///
/// let mut history = Vec::new();
/// let output = chain.call("What is the capital of France?", &history).await?;
/// history.push(output.to_turn());
/// ```
#[derive(Clone)]
pub struct ConversationalRetrievalChain {
    retriever: Retriever,
    answerer: ConversationalAnswerer,
    top_k: usize,
    condense_question: bool,
    condense_params: GenerationParams,
}

impl ConversationalRetrievalChain {
    /// Create a new [`ConversationalRetrievalChainBuilder`].
    pub fn builder() -> ConversationalRetrievalChainBuilder {
        ConversationalRetrievalChainBuilder::default()
    }

    /// The retriever.
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// The answerer.
    pub fn answerer(&self) -> &ConversationalAnswerer {
        &self.answerer
    }

    /// Number of chunks retrieved per call.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Answer `question` in the context of `history`.
    ///
    /// # Errors
    ///
    /// See [`call_with_cancel`](Self::call_with_cancel).
    pub async fn call(&self, question: &str, history: &[ConversationTurn]) -> Result<ChainOutput> {
        self.call_with_cancel(question, history, &CancellationToken::new()).await
    }

    /// Answer `question` in the context of `history`, aborting if `cancel` fires.
    ///
    /// # Errors
    ///
    /// - Provider and index errors from each step, unchanged.
    /// - [`RagError::GenerationError`] if the standalone rewrite comes back empty.
    /// - [`RagError::Cancelled`] on cancellation.
    pub async fn call_with_cancel(
        &self,
        question: &str,
        history: &[ConversationTurn],
        cancel: &CancellationToken,
    ) -> Result<ChainOutput> {
        let generated_question = if self.condense_question && !history.is_empty() {
            Some(self.condense(question, history, cancel).await?)
        } else {
            None
        };
        let search_query = generated_question.as_deref().unwrap_or(question);

        let retrieved = self.retriever.retrieve_with_cancel(search_query, self.top_k, cancel).await?;
        let chunks: Vec<Arc<Chunk>> = retrieved.iter().map(|r| Arc::clone(&r.chunk)).collect();

        let answer = self.answerer.answer_with_cancel(question, history, &chunks, cancel).await?;

        info!(
            history_turns = history.len(),
            condensed = generated_question.is_some(),
            retrieved = retrieved.len(),
            "conversational retrieval completed"
        );

        Ok(ChainOutput {
            question: question.to_string(),
            generated_question,
            answer: answer.answer,
            sources: answer.sources,
            attribution: answer.attribution,
            retrieved,
        })
    }

    async fn condense(
        &self,
        question: &str,
        history: &[ConversationTurn],
        cancel: &CancellationToken,
    ) -> Result<String> {
        let transcript = history
            .iter()
            .map(|turn| format!("Human: {}\nAssistant: {}", turn.question, turn.answer))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = Prompt::new(vec![
            Message::system(CONDENSE_INSTRUCTION),
            Message::user(format!(
                "Conversation:\n{transcript}\n\nFollow-up question: {question}\n\nStandalone question:"
            )),
        ]);

        let provider = self.answerer.provider();
        let rewritten = run_cancellable(cancel, provider.generate(&prompt, &self.condense_params))
            .await
            .map_err(|e| {
                error!(provider = provider.name(), error = %e, "question condensing failed");
                e
            })?;

        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            return Err(RagError::generation(provider.name(), "standalone question was empty"));
        }
        debug!(original = question, standalone = rewritten, "condensed follow-up question");
        Ok(rewritten.to_string())
    }
}

/// Builder for [`ConversationalRetrievalChain`].
#[derive(Default)]
pub struct ConversationalRetrievalChainBuilder {
    retriever: Option<Retriever>,
    answerer: Option<ConversationalAnswerer>,
    top_k: Option<usize>,
    condense_question: Option<bool>,
    condense_params: Option<GenerationParams>,
}

impl ConversationalRetrievalChainBuilder {
    /// Set the retriever.
    pub fn retriever(mut self, retriever: Retriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Set the answerer. Its provider also condenses follow-up questions.
    pub fn answerer(mut self, answerer: ConversationalAnswerer) -> Self {
        self.answerer = Some(answerer);
        self
    }

    /// Set the number of chunks retrieved per call. Defaults to the
    /// retriever's default top-k.
    pub fn top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    /// Enable or disable rewriting follow-ups into standalone questions.
    pub fn condense_question(mut self, enabled: bool) -> Self {
        self.condense_question = Some(enabled);
        self
    }

    /// Parameters for the condensing call. Defaults to the answerer's.
    pub fn condense_params(mut self, params: GenerationParams) -> Self {
        self.condense_params = Some(params);
        self
    }

    /// Build the chain.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the retriever or answerer is
    /// missing, `top_k` is zero, or `condense_params` are invalid.
    pub fn build(self) -> Result<ConversationalRetrievalChain> {
        let retriever = self
            .retriever
            .ok_or_else(|| RagError::ConfigError("retriever is required".to_string()))?;
        let answerer = self
            .answerer
            .ok_or_else(|| RagError::ConfigError("answerer is required".to_string()))?;
        let top_k = self.top_k.unwrap_or_else(|| retriever.default_top_k());
        if top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        let condense_params = self.condense_params.unwrap_or_else(|| answerer.params().clone());
        condense_params.validate()?;

        Ok(ConversationalRetrievalChain {
            retriever,
            answerer,
            top_k,
            condense_question: self.condense_question.unwrap_or(true),
            condense_params,
        })
    }
}
