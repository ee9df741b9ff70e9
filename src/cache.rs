//! Multi-level caching for the retrieval path.
//!
//! Three independent caches sit in front of the expensive stages:
//!
//! | Cache | Key | Policy |
//! |-------|-----|--------|
//! | [`EmbeddingCache`] | owner + normalized query | bounded, FIFO eviction |
//! | [`SearchCache`] | owner + normalized query + sorted doc ids | TTL (default 5 min) |
//! | [`AnswerCache`] | model + normalized query + context fingerprint | TTL (default 10 min) |
//!
//! Every cache is a pure fail-open accelerator: a miss is always fully
//! resolvable by recomputation from the source of truth. Stale TTL entries
//! are treated as misses and evicted lazily on read.
//!
//! The embedding cache evicts by insertion order, not recency of use.
//! Under skewed access patterns this can evict hot keys; the order is
//! observable, so it stays FIFO rather than LRU.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::models::RetrievedChunk;

/// Case- and whitespace-normalize a query for use as a cache key.
pub fn normalize_query(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Per-chunk prefix that feeds the context fingerprint. Bounding the input
/// keeps fingerprinting cheap for large retrieved contexts.
const FINGERPRINT_PREFIX_CHARS: usize = 512;

/// Derive a fingerprint of the retrieved context.
///
/// A cached answer must never be served against materially different
/// context even when the query text matches, so the fingerprint covers
/// every chunk's document id and a bounded prefix of its text.
pub fn context_fingerprint(chunks: &[RetrievedChunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.document_id.to_le_bytes());
        let prefix_end = chunk
            .text
            .char_indices()
            .nth(FINGERPRINT_PREFIX_CHARS)
            .map(|(i, _)| i)
            .unwrap_or(chunk.text.len());
        hasher.update(chunk.text[..prefix_end].as_bytes());
        hasher.update([0x1fu8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Hit/miss counters, shared by all three caches.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

// ============ Embedding cache (FIFO) ============

struct FifoInner {
    map: HashMap<String, Vec<f32>>,
    order: VecDeque<String>,
    stats: CacheStats,
}

/// Bounded cache of `owner + normalized query → embedding vector`.
///
/// No TTL: embeddings for a fixed model are stable. On overflow the
/// oldest-inserted entry is evicted. Used only for repeated retrieval
/// queries; indexing always embeds fresh.
pub struct EmbeddingCache {
    inner: Mutex<FifoInner>,
    capacity: usize,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(FifoInner {
                map: HashMap::new(),
                order: VecDeque::new(),
                stats: CacheStats::default(),
            }),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, owner_id: &str, normalized_query: &str) -> Option<Vec<f32>> {
        let key = embedding_key(owner_id, normalized_query);
        let mut inner = self.inner.lock().unwrap();
        match inner.map.get(&key).cloned() {
            Some(vector) => {
                inner.stats.hits += 1;
                Some(vector)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    pub fn put(&self, owner_id: &str, normalized_query: &str, vector: Vec<f32>) {
        let key = embedding_key(owner_id, normalized_query);
        let mut inner = self.inner.lock().unwrap();
        if inner.map.insert(key.clone(), vector).is_none() {
            inner.order.push_back(key);
            while inner.order.len() > self.capacity {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.map.remove(&oldest);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().unwrap().stats
    }
}

fn embedding_key(owner_id: &str, normalized_query: &str) -> String {
    format!("{}\x1f{}", owner_id, normalized_query)
}

// ============ TTL caches ============

struct TtlEntry<V> {
    value: V,
    inserted_at: Instant,
}

struct TtlInner<V> {
    map: HashMap<String, TtlEntry<V>>,
    stats: CacheStats,
}

/// String-keyed cache whose entries expire `ttl` after insertion.
///
/// Expiry is checked lazily on read; writes opportunistically purge
/// whatever has already expired so the map stays bounded in steady state.
pub struct TtlCache<V: Clone> {
    inner: Mutex<TtlInner<V>>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(TtlInner {
                map: HashMap::new(),
                stats: CacheStats::default(),
            }),
            ttl,
        }
    }

    fn get_raw(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.map.get(key) {
            if entry.inserted_at.elapsed() < self.ttl {
                let value = entry.value.clone();
                inner.stats.hits += 1;
                return Some(value);
            }
            inner.map.remove(key);
        }
        inner.stats.misses += 1;
        None
    }

    fn put_raw(&self, key: String, value: V) {
        let mut inner = self.inner.lock().unwrap();
        let ttl = self.ttl;
        inner.map.retain(|_, e| e.inserted_at.elapsed() < ttl);
        inner.map.insert(
            key,
            TtlEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().unwrap().stats
    }
}

/// Short-TTL cache of ranked search results, in front of the vector store.
pub struct SearchCache {
    cache: TtlCache<Vec<RetrievedChunk>>,
}

impl SearchCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(ttl),
        }
    }

    pub fn get(
        &self,
        owner_id: &str,
        normalized_query: &str,
        document_filter: Option<&[i64]>,
    ) -> Option<Vec<RetrievedChunk>> {
        self.cache
            .get_raw(&search_key(owner_id, normalized_query, document_filter))
    }

    pub fn put(
        &self,
        owner_id: &str,
        normalized_query: &str,
        document_filter: Option<&[i64]>,
        results: Vec<RetrievedChunk>,
    ) {
        self.cache
            .put_raw(search_key(owner_id, normalized_query, document_filter), results);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

/// The document-id filter is sorted before keying so that two queries with
/// the same scope never miss each other on ordering alone, and two queries
/// with different scopes never collide.
fn search_key(owner_id: &str, normalized_query: &str, document_filter: Option<&[i64]>) -> String {
    let scope = match document_filter {
        Some(ids) => {
            let mut sorted: Vec<i64> = ids.to_vec();
            sorted.sort_unstable();
            sorted
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",")
        }
        None => "*".to_string(),
    };
    format!("{}\x1f{}\x1f{}", owner_id, normalized_query, scope)
}

/// Medium-TTL cache of generated answers, in front of the generation
/// service. A hit bypasses retrieval and generation entirely.
pub struct AnswerCache {
    cache: TtlCache<String>,
}

impl AnswerCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(ttl),
        }
    }

    pub fn get(&self, model: &str, normalized_query: &str, fingerprint: &str) -> Option<String> {
        self.cache
            .get_raw(&answer_key(model, normalized_query, fingerprint))
    }

    pub fn put(&self, model: &str, normalized_query: &str, fingerprint: &str, answer: String) {
        self.cache
            .put_raw(answer_key(model, normalized_query, fingerprint), answer);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

fn answer_key(model: &str, normalized_query: &str, fingerprint: &str) -> String {
    format!("{}\x1f{}\x1f{}", model, normalized_query, fingerprint)
}
