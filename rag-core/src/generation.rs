//! Generation provider trait and the prompt types passed to it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// The model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo-16k";

/// Who authored a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions framing the conversation.
    System,
    /// The human side of the conversation.
    User,
    /// Model output.
    Assistant,
}

impl Role {
    fn label(self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "Human",
            Role::Assistant => "Assistant",
        }
    }
}

/// One role-tagged entry of a [`Prompt`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The author of the message.
    pub role: Role,
    /// The message text.
    pub content: String,
}

impl Message {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    /// An assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// An ordered sequence of messages sent to a [`GenerationProvider`] in one call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Messages in conversation order.
    pub messages: Vec<Message>,
}

impl Prompt {
    /// Create a prompt from messages.
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Flatten the prompt for providers that only accept plain text.
    ///
    /// Each message becomes `"<Role>: <content>"`, separated by blank lines.
    pub fn render(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role.label(), m.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Sampling parameters for a generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Selects the provider's model variant.
    pub model: String,
    /// Sampling randomness; `0.0` is deterministic.
    pub temperature: f32,
    /// Upper bound on generated tokens, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self { model: DEFAULT_MODEL.to_string(), temperature: 0.0, max_tokens: None }
    }
}

impl GenerationParams {
    /// Parameters for `model` at temperature 0.
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into(), ..Self::default() }
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the maximum number of generated tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Check the parameters are usable.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the model is empty or the
    /// temperature lies outside `0.0..=2.0`.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(RagError::ConfigError("model must not be empty".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RagError::ConfigError(format!(
                "temperature ({}) must be between 0.0 and 2.0",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// A backend that turns a prompt into generated text.
///
/// One call is one request/response unit; timeouts and retries, if any,
/// belong to the implementation. Failures are reported as
/// [`RagError::GenerationError`].
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// A short label identifying the backend in errors and logs.
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &Prompt, params: &GenerationParams) -> Result<String>;
}
