//! In-memory [`VectorStore`] implementation for tests and embedded use.
//!
//! Rows live in a `Vec` behind `std::sync::RwLock`, in insertion order.
//! Search is brute-force cosine similarity over the owner's rows.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{EmbeddedChunk, RetrievedChunk};

use super::{rank_candidates, CandidateRow, VectorStore};

struct StoredRow {
    document_id: i64,
    owner_id: String,
    chunk_index: i64,
    text: String,
    embedding: Vec<f32>,
}

/// In-memory vector store.
#[derive(Default)]
pub struct MemoryVectorStore {
    rows: RwLock<Vec<StoredRow>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored chunk rows across all owners.
    pub fn len(&self) -> usize {
        self.rows.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert_document(
        &self,
        document_id: i64,
        owner_id: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<()> {
        let mut rows = self.rows.write().unwrap();
        rows.retain(|r| !(r.document_id == document_id && r.owner_id == owner_id));
        for chunk in chunks {
            rows.push(StoredRow {
                document_id,
                owner_id: owner_id.to_string(),
                chunk_index: chunk.chunk_index,
                text: chunk.text.clone(),
                embedding: chunk.embedding.clone(),
            });
        }
        Ok(())
    }

    async fn delete_document(&self, document_id: i64, owner_id: &str) -> Result<()> {
        let mut rows = self.rows.write().unwrap();
        rows.retain(|r| !(r.document_id == document_id && r.owner_id == owner_id));
        Ok(())
    }

    async fn search(
        &self,
        owner_id: &str,
        query_vector: &[f32],
        document_filter: Option<&[i64]>,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let rows = self.rows.read().unwrap();
        let candidates: Vec<CandidateRow> = rows
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .filter(|r| match document_filter {
                Some(ids) => ids.contains(&r.document_id),
                None => true,
            })
            .map(|r| CandidateRow {
                document_id: r.document_id,
                text: r.text.clone(),
                embedding: r.embedding.clone(),
            })
            .collect();
        Ok(rank_candidates(candidates, query_vector, k))
    }
}
