//! Grounded answer generation over retrieved chunks.
//!
//! [`ConversationalAnswerer`] assembles one prompt from a fixed instruction,
//! the caller's conversation history, the retrieved chunks, and the current
//! question; calls the [`GenerationProvider`] once; and splits the reply into
//! answer text and cited sources.
//!
//! Citation extraction is best effort. The instruction asks the model to end
//! with a `SOURCES: 1, 3` line; a JSON reply of the form
//! `{"answer": "...", "sources": [...]}` is also understood. When neither
//! yields a usable reference, every chunk passed in is reported as a source
//! and the answer is marked [`Attribution::Fallback`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::cancel::{CancellationToken, run_cancellable};
use crate::document::{Chunk, ConversationTurn};
use crate::error::{RagError, Result};
use crate::generation::{GenerationParams, GenerationProvider, Message, Prompt};

/// The instruction placed at the top of every answer prompt.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You answer questions using only the numbered \
context passages supplied with the question. If the passages do not contain the answer, say \
that you don't know instead of making one up. Finish your reply with a final line of the form \
`SOURCES: <n>, <n>` listing the numbers of the passages you relied on.";

/// How the sources of an [`Answer`] were determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribution {
    /// The model cited these passages explicitly.
    Cited,
    /// The model gave no usable citation; all passages are listed.
    Fallback,
}

/// A generated answer and the chunks it is attributed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// The answer text, without any citation trailer.
    pub answer: String,
    /// Source chunks, in citation order.
    pub sources: Vec<Arc<Chunk>>,
    /// Whether `sources` came from explicit citations.
    pub attribution: Attribution,
}

/// Produces grounded answers from retrieved chunks and conversation history.
///
/// Stateless: every call is independent and history is passed in by the
/// caller, so one answerer can serve many sessions concurrently.
///
/// # Example
///
/// ```rust,ignore
/// use rag_core::{ConversationalAnswerer, GenerationParams};
///
/// let answerer = ConversationalAnswerer::new(provider, GenerationParams::default())?;
/// let answer = answerer.answer("What is the capital of France?", &history, &chunks).await?;
/// ```
#[derive(Clone)]
pub struct ConversationalAnswerer {
    provider: Arc<dyn GenerationProvider>,
    params: GenerationParams,
    system_instruction: String,
}

impl ConversationalAnswerer {
    /// Create an answerer calling `provider` with `params`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `params` fail validation.
    pub fn new(provider: Arc<dyn GenerationProvider>, params: GenerationParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { provider, params, system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string() })
    }

    /// Replace the system instruction.
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    /// The generation provider.
    pub fn provider(&self) -> &Arc<dyn GenerationProvider> {
        &self.provider
    }

    /// The generation parameters.
    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    /// Assemble the prompt sent for `question`.
    ///
    /// Layout: the system instruction, then one user/assistant pair per
    /// history turn in order, then a user message holding the numbered
    /// context passages (with their metadata) followed by the question.
    pub fn build_prompt(
        &self,
        question: &str,
        history: &[ConversationTurn],
        retrieved: &[Arc<Chunk>],
    ) -> Prompt {
        let mut messages = Vec::with_capacity(2 + history.len() * 2);
        messages.push(Message::system(self.system_instruction.clone()));
        for turn in history {
            messages.push(Message::user(turn.question.clone()));
            messages.push(Message::assistant(turn.answer.clone()));
        }
        messages.push(Message::user(format!(
            "Context:\n{}\n\nQuestion: {question}",
            format_context(retrieved)
        )));
        Prompt::new(messages)
    }

    /// Answer `question` from `retrieved`.
    ///
    /// # Errors
    ///
    /// See [`answer_with_cancel`](Self::answer_with_cancel).
    pub async fn answer(
        &self,
        question: &str,
        history: &[ConversationTurn],
        retrieved: &[Arc<Chunk>],
    ) -> Result<Answer> {
        self.answer_with_cancel(question, history, retrieved, &CancellationToken::new()).await
    }

    /// Answer `question` from `retrieved`, aborting if `cancel` fires.
    ///
    /// The provider is called exactly once.
    ///
    /// # Errors
    ///
    /// - Any error from the provider, unchanged.
    /// - [`RagError::GenerationError`] if the output is empty or has no
    ///   answer text besides the citation line.
    /// - [`RagError::Cancelled`] on cancellation.
    pub async fn answer_with_cancel(
        &self,
        question: &str,
        history: &[ConversationTurn],
        retrieved: &[Arc<Chunk>],
        cancel: &CancellationToken,
    ) -> Result<Answer> {
        let prompt = self.build_prompt(question, history, retrieved);
        debug!(
            provider = self.provider.name(),
            model = %self.params.model,
            history_turns = history.len(),
            context_chunks = retrieved.len(),
            "requesting grounded answer"
        );

        let output = run_cancellable(cancel, self.provider.generate(&prompt, &self.params))
            .await
            .map_err(|e| {
                error!(provider = self.provider.name(), error = %e, "generation failed");
                e
            })?;

        if output.trim().is_empty() {
            return Err(RagError::generation(self.provider.name(), "provider returned empty output"));
        }

        let parsed = parse_response(&output);
        if parsed.answer.is_empty() {
            return Err(RagError::generation(
                self.provider.name(),
                "response contained no answer text",
            ));
        }

        let cited = parsed.citations.map(|refs| resolve(&refs, retrieved)).unwrap_or_default();
        let (sources, attribution) = if cited.is_empty() {
            if !retrieved.is_empty() {
                warn!(context_chunks = retrieved.len(), "no usable citations; attributing to all");
            }
            (retrieved.to_vec(), Attribution::Fallback)
        } else {
            (cited, Attribution::Cited)
        };

        info!(source_count = sources.len(), ?attribution, "answer generated");
        Ok(Answer { answer: parsed.answer, sources, attribution })
    }
}

fn format_context(chunks: &[Arc<Chunk>]) -> String {
    if chunks.is_empty() {
        return "(no passages retrieved)".to_string();
    }
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let meta = chunk
                .metadata
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            let n = i + 1;
            if meta.is_empty() {
                format!("[{n}]\n{}", chunk.text.trim())
            } else {
                format!("[{n}] {meta}\n{}", chunk.text.trim())
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// A reference to a context passage as written by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SourceRef {
    /// 1-based passage number.
    Number(usize),
    /// A chunk id or source label.
    Label(String),
}

impl SourceRef {
    fn parse(token: &str) -> Option<Self> {
        let token = token.trim().trim_matches(|c: char| "[]()#\"'`.".contains(c));
        if token.is_empty() {
            return None;
        }
        Some(match token.parse::<usize>() {
            Ok(n) => SourceRef::Number(n),
            Err(_) => SourceRef::Label(token.to_string()),
        })
    }
}

#[derive(Debug)]
struct ParsedResponse {
    answer: String,
    citations: Option<Vec<SourceRef>>,
}

#[derive(Deserialize)]
struct StructuredAnswer {
    answer: String,
    #[serde(default)]
    sources: Vec<serde_json::Value>,
}

fn parse_response(output: &str) -> ParsedResponse {
    let trimmed = strip_code_fence(output.trim());

    if trimmed.starts_with('{') {
        if let Ok(structured) = serde_json::from_str::<StructuredAnswer>(trimmed) {
            debug!(source_count = structured.sources.len(), "parsed structured answer");
            let refs = structured
                .sources
                .iter()
                .filter_map(|value| match value {
                    serde_json::Value::Number(n) => n.as_u64().map(|n| SourceRef::Number(n as usize)),
                    serde_json::Value::String(s) => SourceRef::parse(s),
                    _ => None,
                })
                .collect();
            return ParsedResponse { answer: structured.answer.trim().to_string(), citations: Some(refs) };
        }
    }

    // Only the last non-blank line can be the trailer.
    let lines: Vec<&str> = output.lines().collect();
    let last = lines.iter().rposition(|line| !line.trim().is_empty());
    let trailer = last.and_then(|pos| citation_payload(lines[pos]).map(|payload| (pos, payload)));
    match trailer {
        Some((pos, payload)) => {
            let answer = lines[..pos].join("\n");
            ParsedResponse { answer: answer.trim().to_string(), citations: Some(split_refs(payload)) }
        }
        None => ParsedResponse { answer: output.trim().to_string(), citations: None },
    }
}

/// Splits a trailer payload on commas, semicolons and brackets. A piece made
/// only of whitespace-separated numbers (`1 3`) yields each number; any other
/// piece is kept whole so labels like `my notes.txt` survive.
fn split_refs(payload: &str) -> Vec<SourceRef> {
    payload
        .split([',', ';', '[', ']'])
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .flat_map(|piece| {
            let words: Vec<&str> = piece.split_whitespace().collect();
            let numeric = words.len() > 1
                && words.iter().all(|w| w.trim_matches(['(', ')', '#', '.']).parse::<usize>().is_ok());
            if numeric { words } else { vec![piece] }
        })
        .filter_map(SourceRef::parse)
        .collect()
}

/// The text after a `SOURCES:` / `SOURCE:` prefix, case-insensitive.
fn citation_payload(line: &str) -> Option<&str> {
    let line = line.trim().trim_start_matches(['*', '_']);
    ["sources:", "source:"].iter().find_map(|prefix| {
        let head = line.get(..prefix.len())?;
        head.eq_ignore_ascii_case(prefix).then(|| line[prefix.len()..].trim_start_matches(['*', '_']))
    })
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Map references to chunks, dropping unknown ones and duplicates.
fn resolve(refs: &[SourceRef], retrieved: &[Arc<Chunk>]) -> Vec<Arc<Chunk>> {
    let mut picked: Vec<usize> = Vec::new();
    for r in refs {
        let position = match r {
            SourceRef::Number(n) if (1..=retrieved.len()).contains(n) => Some(n - 1),
            SourceRef::Number(_) => None,
            SourceRef::Label(label) => retrieved
                .iter()
                .position(|c| c.id == *label)
                .or_else(|| retrieved.iter().position(|c| c.source() == Some(label.as_str()))),
        };
        match position {
            Some(i) if !picked.contains(&i) => picked.push(i),
            Some(_) => {}
            None => debug!(reference = ?r, "ignoring unresolved citation"),
        }
    }
    picked.into_iter().map(|i| Arc::clone(&retrieved[i])).collect()
}
