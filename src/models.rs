//! Core data types used throughout the indexing and retrieval pipeline.

use serde::Serialize;

/// A document as seen by this core: the external document layer owns the
/// rest of its fields. Only `content`, `id`, and `owner_id` are read here;
/// `indexed` is the single field the pipeline writes back.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: i64,
    pub owner_id: String,
    pub content: String,
    pub indexed: bool,
}

/// A chunk with its embedding, ready for the vector store.
///
/// `chunk_index` is zero-based and contiguous within one document version;
/// it carries no meaning across documents.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk_index: i64,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A ranked chunk returned from similarity search.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RetrievedChunk {
    pub document_id: i64,
    pub text: String,
    pub similarity: f32,
}

/// Response of the retrieval orchestrator.
///
/// `answer` is `None` when the generation call failed; in that case
/// `generation_error` carries the message and `retrieved_chunks` still
/// holds the context, so the caller may show the raw chunks instead.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_error: Option<String>,
    pub retrieved_chunks: Vec<RetrievedChunk>,
}
