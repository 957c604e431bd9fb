//! Shared error type for the debatesmith crate.

use thiserror::Error;

/// Errors surfaced by parsing, ingestion, storage, and retrieval.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("chunking failed: {0}")]
    Chunking(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("summarization failed: {0}")]
    Summarize(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::InvalidDocument(err.to_string())
    }
}

impl From<tokio_rusqlite::Error> for RagError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        RagError::Storage(err.to_string())
    }
}
