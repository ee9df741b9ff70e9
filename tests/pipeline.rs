//! End-to-end pipeline tests against the [`IndexService`] facade, using
//! the in-memory backends and deterministic stub clients (the generation
//! service is nondeterministic in production, so cache-equivalence tests
//! need a stub that is a pure function of its inputs).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use docdex::config::{CacheConfig, ChunkingConfig, Config, DbConfig, GenerationConfig, JobsConfig, RetrievalConfig};
use docdex::documents::{DocumentBackend, MemoryDocumentBackend, SqliteDocumentBackend};
use docdex::embedding::EmbeddingClient;
use docdex::error::{DocdexError, Result};
use docdex::generation::{GenerationClient, HistoryTurn};
use docdex::progress::JobStatus;
use docdex::store::{MemoryVectorStore, SqliteVectorStore};
use docdex::{db, migrate, IndexService};

const DIMS: usize = 8;

/// Deterministic bag-of-words embedder: each word lands in a hash bucket,
/// so texts sharing words get similar vectors.
struct HashEmbedder {
    calls: AtomicUsize,
    fail_after: Option<usize>,
}

impl HashEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_after: None,
        }
    }

    fn failing_after(n: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_after: Some(n),
        }
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-embedder"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, text: &str, _owner_api_key: Option<&str>) -> Result<Vec<f32>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_after {
            if call >= limit {
                return Err(DocdexError::EmbeddingService(
                    "embedding service unavailable".to_string(),
                ));
            }
        }
        let mut vector = vec![0.0f32; DIMS];
        for word in text.to_lowercase().split_whitespace() {
            let bucket: usize = word.bytes().map(|b| b as usize).sum::<usize>() % DIMS;
            vector[bucket] += 1.0;
        }
        Ok(vector)
    }
}

/// Deterministic generator: answer is a pure function of query + context.
struct EchoGenerator {
    calls: AtomicUsize,
}

impl EchoGenerator {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl GenerationClient for EchoGenerator {
    async fn generate(
        &self,
        query: &str,
        context: &[String],
        model: &str,
        _temperature: f64,
        _history: Option<&[HistoryTurn]>,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "[{}] {} (grounded in {} chunks)",
            model,
            query,
            context.len()
        ))
    }
}

fn test_config() -> Config {
    Config {
        db: DbConfig {
            path: std::path::PathBuf::from("unused.sqlite"),
        },
        chunking: ChunkingConfig {
            max_chunk_chars: 200,
            overlap_chars: 40,
        },
        retrieval: RetrievalConfig { top_k: 4 },
        embedding: Default::default(),
        generation: GenerationConfig::default(),
        cache: CacheConfig::default(),
        jobs: JobsConfig {
            completed_retention_secs: 60,
            failed_retention_secs: 60,
        },
    }
}

struct TestPipeline {
    service: IndexService,
    documents: Arc<MemoryDocumentBackend>,
    embedder: Arc<HashEmbedder>,
    generator: Arc<EchoGenerator>,
}

fn build_pipeline(embedder: HashEmbedder) -> TestPipeline {
    let documents = Arc::new(MemoryDocumentBackend::new());
    let embedder = Arc::new(embedder);
    let generator = Arc::new(EchoGenerator::new());
    let service = IndexService::new(
        test_config(),
        Arc::new(MemoryVectorStore::new()),
        embedder.clone(),
        generator.clone(),
        documents.clone(),
    );
    TestPipeline {
        service,
        documents,
        embedder,
        generator,
    }
}

async fn wait_for_terminal(service: &IndexService, job_id: &str) -> JobStatus {
    for _ in 0..200 {
        if let Some(report) = service.get_progress(job_id) {
            if matches!(report.status, JobStatus::Completed | JobStatus::Failed) {
                return report.status;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not reach a terminal state", job_id);
}

fn corpus_text(topic: &str) -> String {
    format!("{} ", topic).repeat(60)
}

#[tokio::test]
async fn test_index_then_query_end_to_end() {
    let p = build_pipeline(HashEmbedder::new());
    let rust_doc = p.documents.create("alice", &corpus_text("rust ownership borrowing"));
    let cook_doc = p.documents.create("alice", &corpus_text("pasta recipe tomato"));

    for (id, text) in [
        (rust_doc, corpus_text("rust ownership borrowing")),
        (cook_doc, corpus_text("pasta recipe tomato")),
    ] {
        let job = p.service.start_indexing(None, id, "alice", text, None);
        assert_eq!(wait_for_terminal(&p.service, &job).await, JobStatus::Completed);
    }

    assert!(p.documents.get_document(rust_doc).await.unwrap().unwrap().indexed);

    let response = p
        .service
        .query("alice", "rust ownership borrowing", None, None)
        .await
        .unwrap();

    assert!(!response.retrieved_chunks.is_empty());
    assert_eq!(response.retrieved_chunks[0].document_id, rust_doc);
    let answer = response.answer.unwrap();
    assert!(answer.contains("rust ownership borrowing"));
}

#[tokio::test]
async fn test_progress_reports_are_monotonic() {
    let p = build_pipeline(HashEmbedder::new());
    let id = p.documents.create("alice", "");
    let text = corpus_text("steady progress reporting across many chunks");

    let job = p.service.start_indexing(None, id, "alice", text, None);

    let mut last_percent = 0u8;
    let mut reached_terminal = false;
    for _ in 0..2000 {
        if let Some(report) = p.service.get_progress(&job) {
            assert!(
                report.percent >= last_percent,
                "percent went backwards: {} -> {}",
                last_percent,
                report.percent
            );
            last_percent = report.percent;
            if report.status.is_terminal() {
                assert_eq!(report.status, JobStatus::Completed);
                assert_eq!(report.percent, 100);
                reached_terminal = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(reached_terminal, "job never reached a terminal state");
}

#[tokio::test]
async fn test_provisional_job_id_transfer() {
    let p = build_pipeline(HashEmbedder::new());
    let id = p.documents.create("alice", "");
    let temp_id = IndexService::mint_job_id();

    let job = p.service.start_indexing(
        Some(temp_id.clone()),
        id,
        "alice",
        corpus_text("transferable progress records"),
        None,
    );
    assert_eq!(job, temp_id);
    wait_for_terminal(&p.service, &temp_id).await;

    let real_id = id.to_string();
    assert!(p.service.transfer_job(&temp_id, &real_id));
    assert!(p.service.get_progress(&temp_id).is_none());
    let report = p.service.get_progress(&real_id).unwrap();
    assert_eq!(report.status, JobStatus::Completed);

    // Transferring again finds nothing.
    assert!(!p.service.transfer_job(&temp_id, &real_id));
}

#[tokio::test]
async fn test_owner_isolation_through_the_service() {
    let p = build_pipeline(HashEmbedder::new());
    let alice_doc = p.documents.create("alice", "");
    let bob_doc = p.documents.create("bob", "");

    for (id, owner) in [(alice_doc, "alice"), (bob_doc, "bob")] {
        let job = p.service.start_indexing(
            None,
            id,
            owner,
            corpus_text("shared vocabulary different tenants"),
            None,
        );
        wait_for_terminal(&p.service, &job).await;
    }

    let response = p
        .service
        .query("alice", "shared vocabulary different tenants", None, None)
        .await
        .unwrap();
    assert!(!response.retrieved_chunks.is_empty());
    for chunk in &response.retrieved_chunks {
        assert_eq!(chunk.document_id, alice_doc);
    }
}

#[tokio::test]
async fn test_warm_caches_skip_embedding_and_generation() {
    let p = build_pipeline(HashEmbedder::new());
    let id = p.documents.create("alice", "");
    let job = p.service.start_indexing(
        None,
        id,
        "alice",
        corpus_text("cache warmup material"),
        None,
    );
    wait_for_terminal(&p.service, &job).await;

    let embed_calls_after_indexing = p.embedder.calls.load(Ordering::SeqCst);

    let cold = p.service.query("alice", "cache warmup", None, None).await.unwrap();
    let warm = p.service.query("alice", "cache warmup", None, None).await.unwrap();

    assert_eq!(cold.retrieved_chunks, warm.retrieved_chunks);
    assert_eq!(cold.answer, warm.answer);
    assert_eq!(
        p.embedder.calls.load(Ordering::SeqCst),
        embed_calls_after_indexing + 1
    );
    assert_eq!(p.generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_indexing_leaves_document_unindexed() {
    // Many chunks' worth of text, but the embedder dies on the second call.
    let documents = Arc::new(MemoryDocumentBackend::new());
    let store = Arc::new(MemoryVectorStore::new());
    let service = IndexService::new(
        test_config(),
        store.clone(),
        Arc::new(HashEmbedder::failing_after(1)),
        Arc::new(EchoGenerator::new()),
        documents.clone(),
    );

    let id = documents.create("alice", "");
    let text = corpus_text("document that will fail halfway through");

    let job = service.start_indexing(None, id, "alice", text, None);
    assert_eq!(wait_for_terminal(&service, &job).await, JobStatus::Failed);

    let report = service.get_progress(&job).unwrap();
    assert!(report
        .error
        .as_deref()
        .unwrap()
        .contains("embedding service unavailable"));
    assert!(!documents.get_document(id).await.unwrap().unwrap().indexed);
    // Nothing reached the store: the failed attempt never upserted.
    assert!(store.is_empty());

    // Retrieval against the dead embedder aborts the request.
    let err = service.query("alice", "fail halfway", None, None).await.unwrap_err();
    assert!(matches!(err, DocdexError::EmbeddingService(_)));
}

#[tokio::test]
async fn test_remove_document_clears_index() {
    let p = build_pipeline(HashEmbedder::new());
    let id = p.documents.create("alice", "");
    let job = p.service.start_indexing(
        None,
        id,
        "alice",
        corpus_text("removable document content"),
        None,
    );
    wait_for_terminal(&p.service, &job).await;

    p.service.remove_document(id, "alice").await.unwrap();
    assert!(!p.documents.get_document(id).await.unwrap().unwrap().indexed);

    // The search cache still holds nothing for this fresh query, so the
    // store is consulted directly.
    let response = p
        .service
        .query("alice", "removable document content", None, None)
        .await
        .unwrap();
    assert!(response.retrieved_chunks.is_empty());

    // Removing a document that was never stored is a no-op.
    p.service.remove_document(9999, "alice").await.unwrap();
}

#[tokio::test]
async fn test_document_filter_scopes_retrieval() {
    let p = build_pipeline(HashEmbedder::new());
    let first = p.documents.create("alice", "");
    let second = p.documents.create("alice", "");

    for id in [first, second] {
        let job = p.service.start_indexing(
            None,
            id,
            "alice",
            corpus_text("identical corpus for both documents"),
            None,
        );
        wait_for_terminal(&p.service, &job).await;
    }

    let response = p
        .service
        .query("alice", "identical corpus", Some(&[second]), None)
        .await
        .unwrap();
    assert!(!response.retrieved_chunks.is_empty());
    for chunk in &response.retrieved_chunks {
        assert_eq!(chunk.document_id, second);
    }
}

#[tokio::test]
async fn test_sqlite_backed_pipeline() {
    let tmp = tempfile::TempDir::new().unwrap();
    let pool = db::connect(&tmp.path().join("docdex.sqlite")).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();

    let documents = Arc::new(SqliteDocumentBackend::new(pool.clone()));
    let service = IndexService::new(
        test_config(),
        Arc::new(SqliteVectorStore::new(pool.clone())),
        Arc::new(HashEmbedder::new()),
        Arc::new(EchoGenerator::new()),
        documents.clone(),
    );

    let id = documents
        .create("alice", "stored in sqlite for the full round trip")
        .await
        .unwrap();
    let job = service.start_indexing(
        None,
        id,
        "alice",
        corpus_text("sqlite backed round trip"),
        None,
    );
    assert_eq!(wait_for_terminal(&service, &job).await, JobStatus::Completed);

    let response = service
        .query("alice", "sqlite backed round trip", None, None)
        .await
        .unwrap();
    assert!(!response.retrieved_chunks.is_empty());
    assert_eq!(response.retrieved_chunks[0].document_id, id);
    assert!(documents.get_document(id).await.unwrap().unwrap().indexed);

    pool.close().await;
}

#[tokio::test]
async fn test_reindex_after_failure_is_idempotent() {
    // First attempt fails partway; the retry with a healthy embedder must
    // leave the store in a fully valid, searchable state.
    let documents = Arc::new(MemoryDocumentBackend::new());
    let store = Arc::new(MemoryVectorStore::new());
    let failing = Arc::new(HashEmbedder::failing_after(1));
    let service = IndexService::new(
        test_config(),
        store.clone(),
        failing,
        Arc::new(EchoGenerator::new()),
        documents.clone(),
    );

    let id = documents.create("alice", "");
    let text = corpus_text("retry me after the outage clears");
    let job = service.start_indexing(None, id, "alice", text.clone(), None);
    assert_eq!(wait_for_terminal(&service, &job).await, JobStatus::Failed);

    // Same store and documents, recovered embedder.
    let recovered = IndexService::new(
        test_config(),
        store.clone(),
        Arc::new(HashEmbedder::new()),
        Arc::new(EchoGenerator::new()),
        documents.clone(),
    );
    let job = recovered.start_indexing(None, id, "alice", text, None);
    assert_eq!(wait_for_terminal(&recovered, &job).await, JobStatus::Completed);

    let response = recovered
        .query("alice", "retry me after the outage clears", None, None)
        .await
        .unwrap();
    assert!(!response.retrieved_chunks.is_empty());
    assert!(documents.get_document(id).await.unwrap().unwrap().indexed);
}
