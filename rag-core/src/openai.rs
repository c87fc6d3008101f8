//! Embedding and chat providers for the OpenAI HTTP API.
//!
//! This module is only available when the `openai` feature is enabled. Both
//! providers also work against OpenAI-compatible servers via `with_base_url`.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::document::Embedding;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{GenerationParams, GenerationProvider, Message, Prompt};

const PROVIDER: &str = "OpenAI";

/// The default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// The default model for OpenAI embeddings.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MAX_RETRIES: u32 = 2;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Builds the error variant appropriate to the calling provider.
type ErrorFn = fn(&str, String) -> RagError;

fn embedding_error(provider: &str, message: String) -> RagError {
    RagError::embedding(provider, message)
}

fn generation_error(provider: &str, message: String) -> RagError {
    RagError::generation(provider, message)
}

/// Connection settings shared by both providers.
#[derive(Clone)]
struct Transport {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
    fail: ErrorFn,
}

impl Transport {
    fn new(api_key: String, fail: ErrorFn) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(fail(PROVIDER, "API key must not be empty".into()));
        }
        Ok(Self {
            client: build_client(DEFAULT_TIMEOUT, fail)?,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            fail,
        })
    }

    fn from_env(fail: ErrorFn) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| fail(PROVIDER, "OPENAI_API_KEY environment variable not set".into()))?;
        let mut transport = Self::new(api_key, fail)?;
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            if !base_url.trim().is_empty() {
                transport.base_url = base_url;
            }
        }
        Ok(transport)
    }

    /// POST `body` to `path`, retrying rate limits, server errors and
    /// transport failures with exponential backoff.
    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let mut attempt = 0u32;
        loop {
            let failure = match self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    return response.json::<R>().await.map_err(|e| {
                        error!(provider = PROVIDER, error = %e, "failed to parse response");
                        (self.fail)(PROVIDER, format!("failed to parse response: {e}"))
                    });
                }
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    let detail = serde_json::from_str::<ErrorResponse>(&text)
                        .map(|e| e.error.message)
                        .unwrap_or(text);
                    let message = format!("API returned {status}: {detail}");
                    if status != reqwest::StatusCode::TOO_MANY_REQUESTS && !status.is_server_error() {
                        error!(provider = PROVIDER, %status, "API error");
                        return Err((self.fail)(PROVIDER, message));
                    }
                    message
                }
                Err(e) => format!("request failed: {e}"),
            };

            if attempt >= self.max_retries {
                error!(provider = PROVIDER, attempts = attempt + 1, error = %failure, "giving up");
                return Err((self.fail)(PROVIDER, failure));
            }
            let delay = INITIAL_BACKOFF.saturating_mul(2u32.saturating_pow(attempt));
            warn!(provider = PROVIDER, attempt = attempt + 1, ?delay, error = %failure, "retrying request");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn build_client(timeout: Duration, fail: ErrorFn) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| fail(PROVIDER, format!("failed to build HTTP client: {e}")))
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// # Configuration
///
/// - `model`: defaults to `text-embedding-3-small`.
/// - `dimensions`: optional Matryoshka dimension override.
/// - `api_key`: from the constructor or the `OPENAI_API_KEY` environment variable.
///
/// # Example
///
/// ```rust,ignore
/// use rag_core::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::from_env()?;
/// let embedding = provider.embed("hello world").await?;
/// ```
#[derive(Clone)]
pub struct OpenAIEmbeddingProvider {
    transport: Transport,
    model: String,
    dimensions: usize,
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a provider with the given API key and the default model.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self::with_transport(Transport::new(api_key.into(), embedding_error)?))
    }

    /// Create a provider from `OPENAI_API_KEY` (and `OPENAI_BASE_URL`, if set).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the key is missing or empty.
    pub fn from_env() -> Result<Self> {
        Ok(Self::with_transport(Transport::from_env(embedding_error)?))
    }

    fn with_transport(transport: Transport) -> Self {
        Self {
            transport,
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        }
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Request embeddings truncated to `dims` (Matryoshka models).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    /// Point at an OpenAI-compatible API root such as `http://localhost:8080/v1`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.transport.base_url = base_url.into();
        self
    }

    /// Set how many times a failed request is retried.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.transport.max_retries = max_retries;
        self
    }

    /// Set the per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the HTTP client cannot be built.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.transport.client = build_client(timeout, embedding_error)?;
        Ok(self)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Embedding,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding(PROVIDER, "API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.request_dimensions,
        };
        let mut response: EmbeddingResponse = self.transport.post("embeddings", &request).await?;
        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

/// A [`GenerationProvider`] backed by the OpenAI chat completions API.
///
/// # Example
///
/// ```rust,ignore
/// use rag_core::openai::OpenAIChatProvider;
/// use rag_core::{GenerationParams, GenerationProvider, Message, Prompt};
///
/// let provider = OpenAIChatProvider::from_env()?;
/// let prompt = Prompt::new(vec![Message::user("Say hello")]);
/// let text = provider.generate(&prompt, &GenerationParams::default()).await?;
/// ```
#[derive(Clone)]
pub struct OpenAIChatProvider {
    transport: Transport,
}

impl OpenAIChatProvider {
    /// Create a provider with the given API key.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::GenerationError`] if the key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self { transport: Transport::new(api_key.into(), generation_error)? })
    }

    /// Create a provider from `OPENAI_API_KEY` (and `OPENAI_BASE_URL`, if set).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::GenerationError`] if the key is missing or empty.
    pub fn from_env() -> Result<Self> {
        Ok(Self { transport: Transport::from_env(generation_error)? })
    }

    /// Point at an OpenAI-compatible API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.transport.base_url = base_url.into();
        self
    }

    /// Set how many times a failed request is retried.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.transport.max_retries = max_retries;
        self
    }

    /// Set the per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::GenerationError`] if the HTTP client cannot be built.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.transport.client = build_client(timeout, generation_error)?;
        Ok(self)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl GenerationProvider for OpenAIChatProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn generate(&self, prompt: &Prompt, params: &GenerationParams) -> Result<String> {
        debug!(
            provider = PROVIDER,
            model = %params.model,
            message_count = prompt.messages.len(),
            "chat completion request"
        );

        let request = ChatRequest {
            model: &params.model,
            messages: &prompt.messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };
        let response: ChatResponse = self.transport.post("chat/completions", &request).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RagError::generation(PROVIDER, "response contained no choices"))?;
        Ok(choice.message.content.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_rejected_with_provider_kind() {
        assert!(matches!(
            OpenAIEmbeddingProvider::new(""),
            Err(RagError::EmbeddingError { .. })
        ));
        assert!(matches!(OpenAIChatProvider::new("  "), Err(RagError::GenerationError { .. })));
    }

    #[test]
    fn chat_request_uses_lowercase_roles() {
        let messages = vec![Message::system("s"), Message::user("u"), Message::assistant("a")];
        let request =
            ChatRequest { model: "m", messages: &messages, temperature: 0.0, max_tokens: None };
        let json = serde_json::to_value(&request).unwrap_or_default();
        let roles: Vec<&str> =
            json["messages"].as_array().into_iter().flatten().filter_map(|m| m["role"].as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn embedding_dimensions_follow_override() {
        let provider = OpenAIEmbeddingProvider::new("sk-test").map(|p| p.with_dimensions(256));
        assert_eq!(provider.map(|p| p.dimensions()).ok(), Some(256));
    }
}
