//! Vector storage abstraction.
//!
//! The [`VectorStore`] trait defines the three operations the pipeline
//! needs (replace-all upsert, delete, and owner-scoped similarity
//! search), enabling pluggable backends. Implementations must be `Send + Sync`
//! to work with async runtimes.
//!
//! Semantics shared by all backends:
//! - `upsert_document` replaces every chunk row for the document in one
//!   logical unit, so a concurrent `search` never observes a mix of old
//!   and new chunks. Calling it twice with the same chunks is idempotent.
//! - `search` never returns chunks belonging to a different owner. This
//!   is a security invariant, not a performance one.
//! - Ranking is by cosine similarity (higher = more similar), ties broken
//!   by insertion order.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::Result;
use crate::models::{EmbeddedChunk, RetrievedChunk};

pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

/// Abstract vector index over document chunks.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Replace all chunks for `document_id` with the given set.
    ///
    /// Deletes any existing rows for the document and inserts the new
    /// chunks as one atomic unit. An empty chunk set clears the document
    /// from the index.
    async fn upsert_document(
        &self,
        document_id: i64,
        owner_id: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<()>;

    /// Remove all chunk rows for the document. No-op if none exist.
    async fn delete_document(&self, document_id: i64, owner_id: &str) -> Result<()>;

    /// Return the top-`k` chunks owned by `owner_id` ranked by similarity
    /// to `query_vector`, restricted to `document_filter` when provided.
    /// Empty result if the owner has no indexed chunks.
    async fn search(
        &self,
        owner_id: &str,
        query_vector: &[f32],
        document_filter: Option<&[i64]>,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>>;
}

/// A stored chunk row pulled out of a backend, in insertion order.
pub(crate) struct CandidateRow {
    pub document_id: i64,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Score candidates against the query vector and keep the top `k`.
///
/// The sort is stable and the input is in insertion order, so equal
/// scores keep insertion order.
pub(crate) fn rank_candidates(
    rows: Vec<CandidateRow>,
    query_vector: &[f32],
    k: usize,
) -> Vec<RetrievedChunk> {
    let mut scored: Vec<RetrievedChunk> = rows
        .into_iter()
        .map(|row| RetrievedChunk {
            similarity: cosine_similarity(query_vector, &row.embedding),
            document_id: row.document_id,
            text: row.text,
        })
        .collect();

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(document_id: i64, text: &str, embedding: Vec<f32>) -> CandidateRow {
        CandidateRow {
            document_id,
            text: text.to_string(),
            embedding,
        }
    }

    #[test]
    fn test_rank_orders_by_similarity() {
        let rows = vec![
            row(1, "orthogonal", vec![0.0, 1.0]),
            row(2, "aligned", vec![1.0, 0.0]),
            row(3, "diagonal", vec![1.0, 1.0]),
        ];
        let ranked = rank_candidates(rows, &[1.0, 0.0], 3);
        assert_eq!(ranked[0].text, "aligned");
        assert_eq!(ranked[1].text, "diagonal");
        assert_eq!(ranked[2].text, "orthogonal");
    }

    #[test]
    fn test_rank_truncates_to_k() {
        let rows = (0..10).map(|i| row(i, "chunk", vec![1.0, 0.0])).collect();
        let ranked = rank_candidates(rows, &[1.0, 0.0], 3);
        assert_eq!(ranked.len(), 3);
    }

    #[test]
    fn test_equal_scores_keep_insertion_order() {
        let rows = vec![
            row(1, "first", vec![1.0, 0.0]),
            row(2, "second", vec![1.0, 0.0]),
            row(3, "third", vec![1.0, 0.0]),
        ];
        let ranked = rank_candidates(rows, &[1.0, 0.0], 3);
        let texts: Vec<&str> = ranked.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }
}
