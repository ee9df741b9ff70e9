//! Retrieval orchestration: the read path.
//!
//! Layers the three caches in front of the expensive stages:
//! embedding cache → search cache → vector store → answer cache →
//! generation service. Embedding and search failures abort the request;
//! a generation failure is surfaced in the response next to the
//! retrieved context so the caller can fall back to showing raw chunks.

use crate::cache::{context_fingerprint, normalize_query, AnswerCache, EmbeddingCache, SearchCache};
use crate::config::{GenerationConfig, RetrievalConfig};
use crate::embedding::EmbeddingClient;
use crate::error::{DocdexError, Result};
use crate::generation::{GenerationClient, HistoryTurn};
use crate::models::QueryResponse;
use crate::store::VectorStore;

/// Parameters of one retrieval request.
pub struct QueryRequest<'a> {
    pub owner_id: &'a str,
    pub text: &'a str,
    pub document_filter: Option<&'a [i64]>,
    /// Generation model identifier; part of the answer-cache key.
    pub model: &'a str,
    pub owner_api_key: Option<&'a str>,
    pub history: Option<&'a [HistoryTurn]>,
}

#[allow(clippy::too_many_arguments)]
pub async fn answer_query(
    store: &dyn VectorStore,
    embedder: &dyn EmbeddingClient,
    generator: &dyn GenerationClient,
    embedding_cache: &EmbeddingCache,
    search_cache: &SearchCache,
    answer_cache: &AnswerCache,
    retrieval: &RetrievalConfig,
    generation: &GenerationConfig,
    req: QueryRequest<'_>,
) -> Result<QueryResponse> {
    let normalized = normalize_query(req.text);
    if normalized.is_empty() {
        return Err(DocdexError::Validation("query must not be empty".to_string()));
    }
    if let Some(ids) = req.document_filter {
        if ids.is_empty() {
            return Err(DocdexError::Validation(
                "document filter must not be empty".to_string(),
            ));
        }
    }

    // Resolve the query embedding, cache-first.
    let query_vector = match embedding_cache.get(req.owner_id, &normalized) {
        Some(vector) => vector,
        None => {
            let vector = embedder.embed(req.text, req.owner_api_key).await?;
            embedding_cache.put(req.owner_id, &normalized, vector.clone());
            vector
        }
    };

    // Ranked context, cache-first.
    let chunks = match search_cache.get(req.owner_id, &normalized, req.document_filter) {
        Some(cached) => {
            tracing::debug!(owner_id = %req.owner_id, "search cache hit");
            cached
        }
        None => {
            let results = store
                .search(
                    req.owner_id,
                    &query_vector,
                    req.document_filter,
                    retrieval.top_k,
                )
                .await?;
            search_cache.put(req.owner_id, &normalized, req.document_filter, results.clone());
            results
        }
    };

    // A matching answer bypasses generation entirely.
    let fingerprint = context_fingerprint(&chunks);
    if let Some(answer) = answer_cache.get(req.model, &normalized, &fingerprint) {
        tracing::debug!(owner_id = %req.owner_id, "answer cache hit");
        return Ok(QueryResponse {
            answer: Some(answer),
            generation_error: None,
            retrieved_chunks: chunks,
        });
    }

    let context: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    match generator
        .generate(
            req.text,
            &context,
            req.model,
            generation.temperature,
            req.history,
        )
        .await
    {
        Ok(answer) => {
            answer_cache.put(req.model, &normalized, &fingerprint, answer.clone());
            Ok(QueryResponse {
                answer: Some(answer),
                generation_error: None,
                retrieved_chunks: chunks,
            })
        }
        Err(e) => {
            tracing::warn!(owner_id = %req.owner_id, error = %e, "generation failed");
            Ok(QueryResponse {
                answer: None,
                generation_error: Some(e.to_string()),
                retrieved_chunks: chunks,
            })
        }
    }
}
