//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rag_core::{
    Embedding, EmbeddingProvider, GenerationParams, GenerationProvider, Prompt, RagError, Result,
};

/// Embeds text with a caller-supplied function and records batch sizes.
pub struct FnEmbedder<F> {
    f: F,
    dimensions: usize,
    pub batches: Mutex<Vec<usize>>,
    pub calls: AtomicUsize,
}

impl<F> FnEmbedder<F>
where
    F: Fn(&str) -> Result<Embedding> + Send + Sync,
{
    pub fn new(dimensions: usize, f: F) -> Self {
        Self { f, dimensions, batches: Mutex::new(Vec::new()), calls: AtomicUsize::new(0) }
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl<F> EmbeddingProvider for FnEmbedder<F>
where
    F: Fn(&str) -> Result<Embedding> + Send + Sync,
{
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.f)(text)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        self.batches.lock().unwrap().push(texts.len());
        self.calls.fetch_add(1, Ordering::SeqCst);
        texts.iter().map(|t| (self.f)(*t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "Fn"
    }
}

/// An embedding provider whose calls never complete.
pub struct PendingEmbedder;

#[async_trait]
impl EmbeddingProvider for PendingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Embedding> {
        std::future::pending().await
    }

    fn dimensions(&self) -> usize {
        4
    }
}

/// Returns queued replies in order and records every prompt it receives.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String>>>,
    pub prompts: Mutex<Vec<Prompt>>,
    pub params: Mutex<Vec<GenerationParams>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_results(replies.into_iter().map(|r| Ok(r.into())))
    }

    pub fn with_results(replies: impl IntoIterator<Item = Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
            params: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompt(&self, i: usize) -> Prompt {
        self.prompts.lock().unwrap()[i].clone()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGenerator {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn generate(&self, prompt: &Prompt, params: &GenerationParams) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.clone());
        self.params.lock().unwrap().push(params.clone());
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(RagError::GenerationError {
                provider: "Scripted".into(),
                message: "no reply queued".into(),
            })
        })
    }
}

/// A generation provider whose calls never complete.
pub struct PendingGenerator;

#[async_trait]
impl GenerationProvider for PendingGenerator {
    fn name(&self) -> &str {
        "Pending"
    }

    async fn generate(&self, _prompt: &Prompt, _params: &GenerationParams) -> Result<String> {
        std::future::pending().await
    }
}

/// One-hot vector of length `dims` with `1.0` at `i`.
pub fn one_hot(dims: usize, i: usize) -> Embedding {
    let mut v = vec![0.0; dims];
    v[i] = 1.0;
    v
}
