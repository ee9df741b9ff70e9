//! Indexing orchestration: the write path.
//!
//! Drives one document through chunk → embed → store, reporting coarse
//! milestones to the [`ProgressTracker`] along the way. Failure stops at
//! the job record: the document's `indexed` flag is left untouched and
//! partial vector-store writes are not rolled back; the replace-all
//! upsert makes a retry idempotent, and after a failed attempt the
//! store's content for the document is undefined until a later attempt
//! succeeds.

use std::time::Duration;

use crate::chunk::chunk_text;
use crate::config::{ChunkingConfig, JobsConfig};
use crate::documents::DocumentBackend;
use crate::embedding::EmbeddingClient;
use crate::error::Result;
use crate::models::EmbeddedChunk;
use crate::progress::ProgressTracker;
use crate::store::VectorStore;

/// Parameters of one indexing attempt.
pub struct IndexRequest<'a> {
    /// Job identifier: the document id's decimal form, or a provisional
    /// id when indexing starts before the real id is known.
    pub job_id: &'a str,
    pub document_id: i64,
    pub owner_id: &'a str,
    /// Full extracted text, supplied by the upstream extraction layer.
    pub text: &'a str,
    pub owner_api_key: Option<&'a str>,
}

/// Index one document, driving the progress record through its lifecycle.
///
/// Never returns an error: failures are recorded on the job and logged,
/// so the caller's primary "save the document" flow is unaffected. The
/// job record is swept after the configured retention (long after
/// success, short after failure).
pub async fn index_document(
    store: &dyn VectorStore,
    embedder: &dyn EmbeddingClient,
    documents: &dyn DocumentBackend,
    tracker: &ProgressTracker,
    chunking: &ChunkingConfig,
    jobs: &JobsConfig,
    req: IndexRequest<'_>,
) {
    match try_index(store, embedder, documents, tracker, chunking, &req).await {
        Ok(chunk_count) => {
            tracker.complete(req.job_id);
            tracker.sweep_after(
                req.job_id,
                Duration::from_secs(jobs.completed_retention_secs),
            );
            tracing::info!(
                job_id = %req.job_id,
                document_id = req.document_id,
                chunks = chunk_count,
                "indexing completed"
            );
        }
        Err(e) => {
            tracker.fail(req.job_id, &e.to_string());
            tracker.sweep_after(req.job_id, Duration::from_secs(jobs.failed_retention_secs));
            tracing::warn!(
                job_id = %req.job_id,
                document_id = req.document_id,
                error = %e,
                "indexing failed"
            );
        }
    }
}

async fn try_index(
    store: &dyn VectorStore,
    embedder: &dyn EmbeddingClient,
    documents: &dyn DocumentBackend,
    tracker: &ProgressTracker,
    chunking: &ChunkingConfig,
    req: &IndexRequest<'_>,
) -> Result<usize> {
    let pieces = chunk_text(req.text, chunking.max_chunk_chars, chunking.overlap_chars);
    tracker.init(req.job_id, pieces.len() as u64);
    tracing::info!(
        job_id = %req.job_id,
        document_id = req.document_id,
        owner_id = %req.owner_id,
        chunks = pieces.len(),
        "indexing started"
    );

    // Every chunk is embedded fresh; the embedding cache serves only the
    // retrieval path.
    let mut embedded = Vec::with_capacity(pieces.len());
    for (i, text) in pieces.into_iter().enumerate() {
        let vector = embedder.embed(&text, req.owner_api_key).await?;
        embedded.push(EmbeddedChunk {
            chunk_index: i as i64,
            text,
            embedding: vector,
        });
        tracker.update(req.job_id, (i + 1) as u64);
    }

    tracing::debug!(job_id = %req.job_id, "storing chunk vectors");
    store
        .upsert_document(req.document_id, req.owner_id, &embedded)
        .await?;

    documents.set_indexed(req.document_id, true).await?;

    Ok(embedded.len())
}
