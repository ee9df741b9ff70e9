//! SQLite-backed [`VectorStore`].
//!
//! Chunk embeddings are stored as little-endian f32 BLOBs. Replace-all
//! upserts run delete + insert inside a single transaction, so readers
//! never observe a half-replaced document. Search pulls the owner's rows
//! in insertion order and ranks them in memory by cosine similarity.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::Result;
use crate::models::{EmbeddedChunk, RetrievedChunk};

use super::{rank_candidates, CandidateRow, VectorStore};

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert_document(
        &self,
        document_id: i64,
        owner_id: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ? AND owner_id = ?")
            .bind(document_id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunk_vectors (document_id, owner_id, chunk_index, text, embedding) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(document_id)
            .bind(owner_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(vec_to_blob(&chunk.embedding))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_document(&self, document_id: i64, owner_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ? AND owner_id = ?")
            .bind(document_id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn search(
        &self,
        owner_id: &str,
        query_vector: &[f32],
        document_filter: Option<&[i64]>,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        // The IN list is built from bound placeholders, one per id.
        let mut sql = String::from(
            "SELECT document_id, text, embedding FROM chunk_vectors WHERE owner_id = ?",
        );
        if let Some(ids) = document_filter {
            let placeholders = vec!["?"; ids.len()].join(", ");
            sql.push_str(&format!(" AND document_id IN ({})", placeholders));
        }
        sql.push_str(" ORDER BY id");

        let mut query = sqlx::query(&sql).bind(owner_id);
        if let Some(ids) = document_filter {
            for id in ids {
                query = query.bind(id);
            }
        }

        let rows = query.fetch_all(&self.pool).await?;

        let candidates: Vec<CandidateRow> = rows
            .into_iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                CandidateRow {
                    document_id: row.get("document_id"),
                    text: row.get("text"),
                    embedding: blob_to_vec(&blob),
                }
            })
            .collect();

        Ok(rank_candidates(candidates, query_vector, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::migrate;

    async fn test_store() -> (tempfile::TempDir, SqliteVectorStore) {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = db::connect(&tmp.path().join("docdex.sqlite")).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        (tmp, SqliteVectorStore::new(pool))
    }

    fn chunk(index: i64, text: &str, embedding: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk_index: index,
            text: text.to_string(),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_search() {
        let (_tmp, store) = test_store().await;
        store
            .upsert_document(
                1,
                "alice",
                &[
                    chunk(0, "rust ownership", vec![1.0, 0.0, 0.0]),
                    chunk(1, "python typing", vec![0.0, 1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let results = store
            .search("alice", &[1.0, 0.0, 0.0], None, 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "rust ownership");
        assert!(results[0].similarity > results[1].similarity);
    }

    #[tokio::test]
    async fn test_replace_all_idempotent() {
        let (_tmp, store) = test_store().await;
        let chunks = vec![
            chunk(0, "alpha", vec![1.0, 0.0]),
            chunk(1, "beta", vec![0.0, 1.0]),
        ];
        store.upsert_document(7, "alice", &chunks).await.unwrap();
        let first = store.search("alice", &[1.0, 0.0], None, 10).await.unwrap();
        store.upsert_document(7, "alice", &chunks).await.unwrap();
        let second = store.search("alice", &[1.0, 0.0], None, 10).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_owner_isolation() {
        let (_tmp, store) = test_store().await;
        store
            .upsert_document(1, "alice", &[chunk(0, "alice data", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert_document(2, "bob", &[chunk(0, "bob data", vec![1.0, 0.0])])
            .await
            .unwrap();

        let results = store.search("bob", &[1.0, 0.0], None, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "bob data");
    }

    #[tokio::test]
    async fn test_document_filter() {
        let (_tmp, store) = test_store().await;
        for id in 1..=3 {
            store
                .upsert_document(id, "alice", &[chunk(0, &format!("doc {}", id), vec![1.0])])
                .await
                .unwrap();
        }
        let results = store
            .search("alice", &[1.0], Some(&[1, 3]), 10)
            .await
            .unwrap();
        let mut ids: Vec<i64> = results.iter().map(|r| r.document_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_delete_document() {
        let (_tmp, store) = test_store().await;
        store
            .upsert_document(1, "alice", &[chunk(0, "ephemeral", vec![1.0])])
            .await
            .unwrap();
        store.delete_document(1, "alice").await.unwrap();
        let results = store.search("alice", &[1.0], None, 10).await.unwrap();
        assert!(results.is_empty());

        // Deleting again is a no-op.
        store.delete_document(1, "alice").await.unwrap();
    }
}
