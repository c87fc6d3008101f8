//! Turning files into [`Document`]s.

use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::document::{Document, SOURCE_KEY};
use crate::error::{RagError, Result};

/// Reads a source into a [`Document`].
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load the document at `path`.
    async fn load(&self, path: &Path) -> Result<Document>;
}

/// Loads a UTF-8 text file as a single document.
///
/// The document id and its `source` metadata are the path as given.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLoader;

impl TextLoader {
    /// Create a text loader.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentLoader for TextLoader {
    async fn load(&self, path: &Path) -> Result<Document> {
        let bytes = tokio::fs::read(path).await.map_err(|source| match source.kind() {
            ErrorKind::NotFound => RagError::NotFound { path: path.to_path_buf() },
            _ => RagError::IoError { path: path.to_path_buf(), source },
        })?;
        let text = String::from_utf8(bytes).map_err(|e| RagError::IoError {
            path: path.to_path_buf(),
            source: std::io::Error::new(ErrorKind::InvalidData, e),
        })?;

        let id = path.display().to_string();
        debug!(path = %id, bytes = text.len(), "loaded text document");
        Ok(Document::new(id.clone(), text).with_metadata(SOURCE_KEY, id))
    }
}
