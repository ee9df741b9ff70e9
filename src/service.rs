//! Pipeline facade handed to the API layer.
//!
//! [`IndexService`] owns the shared dependencies (vector store,
//! embedding and generation clients, document backend, progress tracker,
//! and the three caches) and exposes the five operations the external
//! API layer calls: fire-and-forget indexing, progress polling, job-id
//! transfer, querying, and document removal. It is cheap to share: every
//! dependency is behind an `Arc`, and the caches and tracker are
//! lifecycle-scoped to the service value rather than process-wide.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::cache::{AnswerCache, EmbeddingCache, SearchCache};
use crate::config::Config;
use crate::documents::{DocumentBackend, SqliteDocumentBackend};
use crate::embedding::{create_embedding_client, EmbeddingClient};
use crate::error::{DocdexError, Result};
use crate::generation::{create_generation_client, GenerationClient};
use crate::index::{index_document, IndexRequest};
use crate::models::QueryResponse;
use crate::progress::{ProgressReport, ProgressTracker};
use crate::query::{answer_query, QueryRequest};
use crate::store::{SqliteVectorStore, VectorStore};

#[derive(Clone)]
pub struct IndexService {
    config: Arc<Config>,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    generator: Arc<dyn GenerationClient>,
    documents: Arc<dyn DocumentBackend>,
    tracker: ProgressTracker,
    embedding_cache: Arc<EmbeddingCache>,
    search_cache: Arc<SearchCache>,
    answer_cache: Arc<AnswerCache>,
}

impl IndexService {
    /// Assemble a service from explicit dependencies. Tests inject
    /// in-memory stores and deterministic clients here.
    pub fn new(
        config: Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        generator: Arc<dyn GenerationClient>,
        documents: Arc<dyn DocumentBackend>,
    ) -> Self {
        let embedding_cache = Arc::new(EmbeddingCache::new(config.cache.embedding_capacity));
        let search_cache = Arc::new(SearchCache::new(Duration::from_secs(
            config.cache.search_ttl_secs,
        )));
        let answer_cache = Arc::new(AnswerCache::new(Duration::from_secs(
            config.cache.answer_ttl_secs,
        )));
        Self {
            config: Arc::new(config),
            store,
            embedder,
            generator,
            documents,
            tracker: ProgressTracker::new(),
            embedding_cache,
            search_cache,
            answer_cache,
        }
    }

    /// Assemble the production service on a SQLite pool: SQLite vector
    /// store and document backend plus the configured HTTP clients.
    pub fn from_pool(config: Config, pool: SqlitePool) -> Result<Self> {
        let store = Arc::new(SqliteVectorStore::new(pool.clone()));
        let documents = Arc::new(SqliteDocumentBackend::new(pool));
        let embedder = create_embedding_client(&config.embedding)?;
        let generator = create_generation_client(&config.generation)?;
        Ok(Self::new(config, store, embedder, generator, documents))
    }

    /// Mint a provisional job id for indexing that must start before the
    /// document's persistent id is known. Pair with
    /// [`transfer_job`](Self::transfer_job) once the real id exists.
    pub fn mint_job_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Start indexing a document in the background and return the job id
    /// (the document id's decimal form unless a provisional id is given).
    ///
    /// Fire-and-forget: progress is polled separately via
    /// [`get_progress`](Self::get_progress), and any failure lands on the
    /// job record rather than propagating to the caller.
    pub fn start_indexing(
        &self,
        job_id: Option<String>,
        document_id: i64,
        owner_id: &str,
        text: String,
        owner_api_key: Option<String>,
    ) -> String {
        let job_id = job_id.unwrap_or_else(|| document_id.to_string());
        let service = self.clone();
        let owner_id = owner_id.to_string();
        let spawned_job_id = job_id.clone();
        tokio::spawn(async move {
            index_document(
                service.store.as_ref(),
                service.embedder.as_ref(),
                service.documents.as_ref(),
                &service.tracker,
                &service.config.chunking,
                &service.config.jobs,
                IndexRequest {
                    job_id: &spawned_job_id,
                    document_id,
                    owner_id: &owner_id,
                    text: &text,
                    owner_api_key: owner_api_key.as_deref(),
                },
            )
            .await;
        });
        job_id
    }

    /// Poll a job's progress. `None` means the record is unknown or
    /// already swept; check the persisted document state instead.
    pub fn get_progress(&self, job_id: &str) -> Option<ProgressReport> {
        self.tracker.progress(job_id)
    }

    /// Move job state from a provisional id to the real one.
    pub fn transfer_job(&self, temp_id: &str, real_id: &str) -> bool {
        self.tracker.transfer(temp_id, real_id)
    }

    /// Answer a question against the owner's indexed documents.
    pub async fn query(
        &self,
        owner_id: &str,
        text: &str,
        document_filter: Option<&[i64]>,
        model: Option<&str>,
    ) -> Result<QueryResponse> {
        self.query_with(QueryRequest {
            owner_id,
            text,
            document_filter,
            model: model.unwrap_or(&self.config.generation.model),
            owner_api_key: None,
            history: None,
        })
        .await
    }

    /// Full-control variant of [`query`](Self::query) with per-owner API
    /// key and conversation history.
    pub async fn query_with(&self, req: QueryRequest<'_>) -> Result<QueryResponse> {
        answer_query(
            self.store.as_ref(),
            self.embedder.as_ref(),
            self.generator.as_ref(),
            &self.embedding_cache,
            &self.search_cache,
            &self.answer_cache,
            &self.config.retrieval,
            &self.config.generation,
            req,
        )
        .await
    }

    /// Remove a document's chunks from the vector index and clear its
    /// `indexed` flag. Removing an unknown document is a no-op.
    pub async fn remove_document(&self, document_id: i64, owner_id: &str) -> Result<()> {
        self.store.delete_document(document_id, owner_id).await?;
        match self.documents.set_indexed(document_id, false).await {
            Ok(()) | Err(DocdexError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn documents(&self) -> &dyn DocumentBackend {
        self.documents.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
