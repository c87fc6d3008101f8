//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`RecursiveChunker`], which
//! splits text on the coarsest natural [`Boundary`] that keeps pieces within
//! the size budget, then merges neighbouring pieces back up to that budget
//! with a configurable overlap between consecutive chunks.
//!
//! Chunks are always exact substrings of the source text: separators stay
//! attached to the piece they terminate, so stitching the chunks together
//! (minus their overlaps) reproduces the document byte for byte.

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into ordered chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    fn split(&self, document: &Document) -> Vec<Chunk>;
}

/// A natural text boundary, from coarsest to finest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    /// A blank line (`"\n\n"`).
    Paragraph,
    /// A single line break.
    Line,
    /// `.`, `!` or `?` followed by whitespace.
    Sentence,
    /// Any whitespace character.
    Word,
    /// Every character.
    Character,
}

/// Boundaries used by [`RecursiveChunker::new`].
pub const DEFAULT_BOUNDARIES: [Boundary; 4] =
    [Boundary::Paragraph, Boundary::Sentence, Boundary::Word, Boundary::Character];

impl Boundary {
    /// Split `text` into consecutive non-empty pieces, each ending right
    /// after an occurrence of this boundary (the last piece may not).
    fn split(self, text: &str) -> Vec<&str> {
        match self {
            Boundary::Paragraph => split_after_pattern(text, "\n\n"),
            Boundary::Line => split_after_pattern(text, "\n"),
            Boundary::Sentence => split_after_sentences(text),
            Boundary::Word => split_at_cuts(
                text,
                text.char_indices().filter(|(_, c)| c.is_whitespace()).map(|(i, c)| i + c.len_utf8()),
            ),
            Boundary::Character => {
                split_at_cuts(text, text.char_indices().map(|(i, c)| i + c.len_utf8()))
            }
        }
    }
}

fn split_at_cuts(text: &str, cuts: impl IntoIterator<Item = usize>) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for cut in cuts {
        if cut > start && cut <= text.len() {
            pieces.push(&text[start..cut]);
            start = cut;
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn split_after_pattern<'a>(text: &'a str, pattern: &str) -> Vec<&'a str> {
    split_at_cuts(text, text.match_indices(pattern).map(|(i, m)| i + m.len()))
}

fn split_after_sentences(text: &str) -> Vec<&str> {
    let mut cuts = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(i, next)) = chars.peek() {
            if next.is_whitespace() {
                cuts.push(i + next.len_utf8());
                chars.next();
            }
        }
    }
    split_at_cuts(text, cuts)
}

/// A segment of the source text that is never split further.
#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    chars: usize,
}

/// Splits text hierarchically: paragraphs → sentences → words → characters.
///
/// Sizes are counted in `char`s. Each chunk holds at most `max_size`
/// characters unless it is a single unit that no configured boundary can
/// divide (only possible when [`Boundary::Character`] is left out).
///
/// # Example
///
/// ```rust,ignore
/// use rag_core::{Chunker, Document, RecursiveChunker};
///
/// let chunker = RecursiveChunker::new(100, 20)?;
/// let chunks = chunker.split(&Document::new("notes", text));
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    max_size: usize,
    overlap: usize,
    boundaries: Vec<Boundary>,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker` with [`DEFAULT_BOUNDARIES`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] unless `max_size > 0` and
    /// `overlap < max_size`.
    pub fn new(max_size: usize, overlap: usize) -> Result<Self> {
        if max_size == 0 {
            return Err(RagError::InvalidArgument("max_size must be greater than zero".into()));
        }
        if overlap >= max_size {
            return Err(RagError::InvalidArgument(format!(
                "overlap ({overlap}) must be less than max_size ({max_size})"
            )));
        }
        Ok(Self { max_size, overlap, boundaries: DEFAULT_BOUNDARIES.to_vec() })
    }

    /// Replace the boundaries tried, in priority order (coarsest first).
    pub fn with_boundaries(mut self, boundaries: impl IntoIterator<Item = Boundary>) -> Self {
        self.boundaries = boundaries.into_iter().collect();
        self
    }

    /// Maximum chunk size in characters.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Maximum number of characters shared by consecutive chunks.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// The boundaries tried, coarsest first.
    pub fn boundaries(&self) -> &[Boundary] {
        &self.boundaries
    }

    /// Compute the byte ranges of the chunks `text` would be split into.
    pub fn spans(&self, text: &str) -> Vec<Range<usize>> {
        if text.is_empty() {
            return Vec::new();
        }
        let mut pieces = Vec::new();
        self.segment(text, 0, 0, &mut pieces);
        self.merge(&pieces)
    }

    fn segment(&self, text: &str, base: usize, level: usize, out: &mut Vec<Piece>) {
        let chars = text.chars().count();
        if chars <= self.max_size || level >= self.boundaries.len() {
            out.push(Piece { start: base, end: base + text.len(), chars });
            return;
        }

        let parts = self.boundaries[level].split(text);
        if parts.len() <= 1 {
            self.segment(text, base, level + 1, out);
            return;
        }

        let mut offset = base;
        for part in parts {
            self.segment(part, offset, level + 1, out);
            offset += part.len();
        }
    }

    fn merge(&self, pieces: &[Piece]) -> Vec<Range<usize>> {
        let mut spans = Vec::new();
        let mut window: VecDeque<Piece> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            if total + piece.chars > self.max_size {
                if let (Some(first), Some(last)) = (window.front(), window.back()) {
                    spans.push(first.start..last.end);
                }
                // Carry trailing pieces into the next chunk as overlap.
                while total > self.overlap || (total > 0 && total + piece.chars > self.max_size) {
                    match window.pop_front() {
                        Some(dropped) => total -= dropped.chars,
                        None => break,
                    }
                }
            }
            total += piece.chars;
            window.push_back(piece);
        }

        if let (Some(first), Some(last)) = (window.front(), window.back()) {
            spans.push(first.start..last.end);
        }
        spans
    }
}

impl Chunker for RecursiveChunker {
    fn split(&self, document: &Document) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = self
            .spans(&document.text)
            .into_iter()
            .enumerate()
            .map(|(ordinal, span)| Chunk {
                id: format!("{}_{ordinal}", document.id),
                document_id: document.id.clone(),
                ordinal,
                start: span.start,
                text: document.text[span].to_string(),
                metadata: Arc::clone(&document.metadata),
            })
            .collect();

        debug!(document.id = %document.id, chunk_count = chunks.len(), "split document");
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentence_split_keeps_terminator_and_space() {
        let pieces = Boundary::Sentence.split("One. Two! Three? Four");
        assert_eq!(pieces, vec!["One. ", "Two! ", "Three? ", "Four"]);
    }

    #[test]
    fn sentence_split_ignores_inner_dots() {
        let pieces = Boundary::Sentence.split("v1.2 is out. Done.");
        assert_eq!(pieces, vec!["v1.2 is out. ", "Done."]);
    }

    #[test]
    fn paragraph_split_tiles_text() {
        let text = "a\n\nb\n\n\n\nc";
        let pieces = Boundary::Paragraph.split(text);
        assert_eq!(pieces, vec!["a\n\n", "b\n\n", "\n\n", "c"]);
        assert_eq!(pieces.concat(), text);
    }

    #[test]
    fn character_split_respects_utf8() {
        let pieces = Boundary::Character.split("né✓");
        assert_eq!(pieces, vec!["n", "é", "✓"]);
    }

    #[test]
    fn word_split_on_any_whitespace() {
        let pieces = Boundary::Word.split("a b\tc\nd");
        assert_eq!(pieces, vec!["a ", "b\t", "c\n", "d"]);
    }
}
