//! Error taxonomy for the indexing and retrieval pipeline.
//!
//! Retrieval-path failures from the embedding or vector-search stage abort
//! the request; generation failures are surfaced alongside any retrieved
//! context. Indexing failures stop at the job record; the document simply
//! stays unindexed and the caller may re-run indexing at any time.

use thiserror::Error;

/// Main error type for docdex operations.
#[derive(Error, Debug)]
pub enum DocdexError {
    /// Embedding service transport or auth failure.
    #[error("embedding service error: {0}")]
    EmbeddingService(String),

    /// Vector store persistence failure.
    #[error("vector store error: {0}")]
    VectorStore(#[from] sqlx::Error),

    /// Generation service transport, auth, or rate-limit failure.
    #[error("generation service error: {0}")]
    Generation(String),

    /// Unknown job or document.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed query or filter.
    #[error("validation error: {0}")]
    Validation(String),

    /// Invalid or inconsistent configuration (e.g. embedding dimension
    /// mismatch). Fatal for the whole pipeline, not per-call.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO errors from the persistence layer's filesystem setup.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for docdex operations.
pub type Result<T> = std::result::Result<T, DocdexError>;
