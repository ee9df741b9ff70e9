//! Document persistence boundary.
//!
//! The document layer (upload handling, metadata, ownership) is external
//! to this pipeline; [`DocumentBackend`] models the three operations the
//! core touches: reading a document, flipping its `indexed` flag, and
//! replacing its extracted content. The SQLite implementation backs the
//! CLI; the in-memory one backs tests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::error::{DocdexError, Result};
use crate::models::Document;

#[async_trait]
pub trait DocumentBackend: Send + Sync {
    async fn get_document(&self, id: i64) -> Result<Option<Document>>;

    /// Fails with [`DocdexError::NotFound`] for unknown documents.
    async fn set_indexed(&self, id: i64, indexed: bool) -> Result<()>;

    /// Replace the extracted text. Fails with [`DocdexError::NotFound`]
    /// for unknown documents.
    async fn set_content(&self, id: i64, content: &str) -> Result<()>;
}

// ============ SQLite backend ============

pub struct SqliteDocumentBackend {
    pool: SqlitePool,
}

impl SqliteDocumentBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a new document and return its assigned id. Creation belongs
    /// to the external document layer; this exists for the CLI driver.
    pub async fn create(&self, owner_id: &str, content: &str) -> Result<i64> {
        let result = sqlx::query("INSERT INTO documents (owner_id, content, indexed) VALUES (?, ?, 0)")
            .bind(owner_id)
            .bind(content)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }
}

#[async_trait]
impl DocumentBackend for SqliteDocumentBackend {
    async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT id, owner_id, content, indexed FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| Document {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            content: row.get("content"),
            indexed: row.get::<i64, _>("indexed") != 0,
        }))
    }

    async fn set_indexed(&self, id: i64, indexed: bool) -> Result<()> {
        let result = sqlx::query("UPDATE documents SET indexed = ? WHERE id = ?")
            .bind(indexed as i64)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DocdexError::NotFound(format!("document {}", id)));
        }
        Ok(())
    }

    async fn set_content(&self, id: i64, content: &str) -> Result<()> {
        let result = sqlx::query("UPDATE documents SET content = ? WHERE id = ?")
            .bind(content)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DocdexError::NotFound(format!("document {}", id)));
        }
        Ok(())
    }
}

// ============ In-memory backend ============

#[derive(Default)]
pub struct MemoryDocumentBackend {
    docs: RwLock<Vec<Document>>,
    next_id: AtomicI64,
}

impl MemoryDocumentBackend {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn create(&self, owner_id: &str, content: &str) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.docs.write().unwrap().push(Document {
            id,
            owner_id: owner_id.to_string(),
            content: content.to_string(),
            indexed: false,
        });
        id
    }
}

#[async_trait]
impl DocumentBackend for MemoryDocumentBackend {
    async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        Ok(self
            .docs
            .read()
            .unwrap()
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }

    async fn set_indexed(&self, id: i64, indexed: bool) -> Result<()> {
        let mut docs = self.docs.write().unwrap();
        match docs.iter_mut().find(|d| d.id == id) {
            Some(doc) => {
                doc.indexed = indexed;
                Ok(())
            }
            None => Err(DocdexError::NotFound(format!("document {}", id))),
        }
    }

    async fn set_content(&self, id: i64, content: &str) -> Result<()> {
        let mut docs = self.docs.write().unwrap();
        match docs.iter_mut().find(|d| d.id == id) {
            Some(doc) => {
                doc.content = content.to_string();
                Ok(())
            }
            None => Err(DocdexError::NotFound(format!("document {}", id))),
        }
    }
}
