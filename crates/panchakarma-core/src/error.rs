//! Error types for each stage of the pipeline.
//!
//! [`LoadError`] and build-time [`EmbeddingError`]s are fatal to whoever
//! constructs the knowledge base. [`GenerationError`] never escapes the
//! [`Responder`](crate::generate::Responder): it is rendered into the
//! user-facing diagnostic string instead.

use std::path::PathBuf;

use thiserror::Error;

/// The knowledge source could not be read.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read knowledge file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure while turning text into vectors or indexing them.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider failed: {0}")]
    Provider(String),
    #[error("expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Any failure of the generation backend, or of the per-query retrieval
/// feeding it.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{var} is not set")]
    MissingCredential { var: String },
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("empty response from model")]
    EmptyResponse,
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] EmbeddingError),
}
