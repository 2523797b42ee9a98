//! Knowledge store: blank-line passage splitting.
//!
//! The knowledge source is a plain UTF-8 text file in which passages are
//! separated by an empty line. Splitting is purely textual:
//!
//! 1. Split the raw text on `"\n\n"`.
//! 2. Trim each section.
//! 3. Drop sections that are empty after trimming.
//!
//! A passage's identity is its position in the resulting sequence; no other
//! identifier is assigned.
//!
//! # Example
//!
//! ```rust
//! use panchakarma_core::corpus::Corpus;
//!
//! let corpus = Corpus::parse("Virechana is purgation.\n\n\n\n  Basti is enema therapy.  ");
//! assert_eq!(corpus.len(), 2);
//! assert_eq!(corpus.get(1).unwrap().text, "Basti is enema therapy.");
//! ```

use std::path::Path;

use serde::Serialize;

use crate::error::LoadError;

/// A single immutable unit of knowledge text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Passage {
    /// Position in the corpus, assigned at load time.
    pub position: usize,
    /// Trimmed, non-empty passage text.
    pub text: String,
}

/// An ordered, read-only sequence of passages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    passages: Vec<Passage>,
}

impl Corpus {
    /// A corpus with no passages. Retrieval against it always comes back empty.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Split raw knowledge text into passages.
    ///
    /// `\r\n` and lone `\r` line endings are read as `\n` first.
    pub fn parse(source: &str) -> Self {
        let source = source.replace("\r\n", "\n").replace('\r', "\n");
        let passages = source
            .split("\n\n")
            .map(str::trim)
            .filter(|section| !section.is_empty())
            .enumerate()
            .map(|(position, text)| Passage {
                position,
                text: text.to_string(),
            })
            .collect();
        Self { passages }
    }

    /// Read and split a knowledge file.
    ///
    /// Missing files, permission errors and invalid UTF-8 all surface as
    /// [`LoadError::Io`].
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&content))
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Passage> {
        self.passages.get(position)
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    /// Passage texts in corpus order, as handed to an embedder.
    pub fn texts(&self) -> Vec<String> {
        self.passages.iter().map(|p| p.text.clone()).collect()
    }
}
