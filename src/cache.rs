use crate::documents::{DocumentChunk, DocumentStore};
use crate::error::EngineError;
use crate::llm::Embedder;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

pub const GUILD_PREFIX: &str = "guild:";
pub const CHAT_PREFIX: &str = "chat:";
pub const ROLES_PREFIX: &str = "roles:";
pub const VECTOR_QUERY_PREFIX: &str = "vector_query:";

/// Conditional set semantics, mirroring the Redis wire contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// TTL in seconds.
    pub ex: Option<u64>,
    /// TTL in milliseconds. Takes precedence over `ex` when both are set.
    pub px: Option<u64>,
    /// Only set if the key does not exist.
    pub nx: bool,
    /// Only set if the key already exists.
    pub xx: bool,
}

impl SetOptions {
    pub fn expire_secs(secs: u64) -> Self {
        Self {
            ex: Some(secs),
            ..Self::default()
        }
    }
}

/// Key/value backend behind the read-through cache. A missing key is
/// `Ok(None)`, never an error; errors mean the backend itself is
/// unreachable and callers must fall back to the source of truth.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, EngineError>;

    /// Returns whether the value was stored (NX/XX may decline).
    async fn set(&self, key: &str, value: &str, opts: SetOptions) -> Result<bool, EngineError>;

    /// Returns the number of keys removed (0 or 1).
    async fn del(&self, key: &str) -> Result<u64, EngineError>;
}

struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process cache backend: LRU-bounded with per-entry deadlines.
pub struct MemoryCache {
    inner: Mutex<LruCache<String, Entry>>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1024).unwrap());
        Self {
            inner: Mutex::new(LruCache::new(cap)),
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, EngineError> {
        let now = Utc::now();
        let mut cache = self.inner.lock().unwrap();
        let expired = match cache.get(key) {
            Some(entry) if entry.expired(now) => true,
            Some(entry) => return Ok(Some(entry.value.clone())),
            None => return Ok(None),
        };
        if expired {
            cache.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, opts: SetOptions) -> Result<bool, EngineError> {
        let now = Utc::now();
        let mut cache = self.inner.lock().unwrap();

        let live = cache.get(key).map(|e| !e.expired(now)).unwrap_or(false);
        if opts.nx && live {
            return Ok(false);
        }
        if opts.xx && !live {
            return Ok(false);
        }

        let expires_at = match (opts.px, opts.ex) {
            (Some(ms), _) => Some(now + Duration::milliseconds(ms as i64)),
            (None, Some(secs)) => Some(now + Duration::seconds(secs as i64)),
            (None, None) => None,
        };
        cache.put(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn del(&self, key: &str) -> Result<u64, EngineError> {
        let mut cache = self.inner.lock().unwrap();
        Ok(if cache.pop(key).is_some() { 1 } else { 0 })
    }
}

/// Read-through cache fronting the relational records and the document
/// store's similarity search.
///
/// Relational records are caller-populated: the services read the store on a
/// miss and write the cache themselves, and pair every mutation with a
/// delete or overwrite of the corresponding key. The vector-query path below
/// populates itself.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    embedder: Arc<dyn Embedder>,
    documents: Arc<dyn DocumentStore>,
    query_ttl_secs: u64,
}

impl Cache {
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        embedder: Arc<dyn Embedder>,
        documents: Arc<dyn DocumentStore>,
        query_ttl_secs: u64,
    ) -> Self {
        Self {
            backend,
            embedder,
            documents,
            query_ttl_secs,
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, EngineError> {
        self.backend.get(key).await
    }

    pub async fn set(
        &self,
        key: &str,
        value: &str,
        opts: SetOptions,
    ) -> Result<bool, EngineError> {
        self.backend.set(key, value, opts).await
    }

    pub async fn del(&self, key: &str) -> Result<u64, EngineError> {
        self.backend.del(key).await
    }

    /// Stable cache key for a question, optionally scoped (e.g. to a chat
    /// session) so identical questions in different scopes do not collide.
    pub fn query_key(question: &str, scope: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(question.as_bytes());
        if let Some(scope) = scope {
            hasher.update(b":");
            hasher.update(scope.as_bytes());
        }
        format!("{}{}", VECTOR_QUERY_PREFIX, hex::encode(hasher.finalize()))
    }

    /// Similarity search with a cached-result fast path.
    ///
    /// A hit costs zero embedding and zero store calls. On a miss the
    /// question is embedded, the document store searched, and the ranked
    /// result cached under the question hash with a bounded TTL. A backend
    /// failure degrades to the store path with a warning.
    pub async fn similarity_search(
        &self,
        question: &str,
        k: usize,
        scope: Option<&str>,
    ) -> Result<Vec<DocumentChunk>, EngineError> {
        let key = Self::query_key(question, scope);

        match self.backend.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<DocumentChunk>>(&raw) {
                Ok(hits) => {
                    debug!("vector query cache hit for {}", key);
                    return Ok(hits);
                }
                Err(e) => {
                    warn!("discarding undecodable cached query result: {}", e);
                    let _ = self.backend.del(&key).await;
                }
            },
            Ok(None) => {}
            Err(e) => {
                warn!("cache lookup failed, falling back to document store: {}", e);
            }
        }

        let embedding = self.embedder.embed(question).await?;
        let hits = self.documents.search(&embedding, k).await?;

        match serde_json::to_string(&hits) {
            Ok(raw) => {
                if let Err(e) = self
                    .backend
                    .set(&key, &raw, SetOptions::expire_secs(self.query_ttl_secs))
                    .await
                {
                    warn!("failed to cache vector query result: {}", e);
                }
            }
            Err(e) => warn!("failed to serialize vector query result: {}", e),
        }

        Ok(hits)
    }

    /// Search with a precomputed vector, bypassing the question hash path.
    pub async fn similarity_search_vector(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<DocumentChunk>, EngineError> {
        self.documents.search(embedding, k).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0])
        }
    }

    struct CountingStore {
        searches: AtomicUsize,
    }

    #[async_trait]
    impl DocumentStore for CountingStore {
        async fn upsert_chunks(&self, _chunks: Vec<DocumentChunk>) -> Result<(), EngineError> {
            Ok(())
        }
        async fn delete_by_parent(&self, _parent_id: &str) -> Result<usize, EngineError> {
            Ok(0)
        }
        async fn search(
            &self,
            _embedding: &[f32],
            _k: usize,
        ) -> Result<Vec<DocumentChunk>, EngineError> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            Ok(vec![DocumentChunk {
                id: "m1_chunk_0".into(),
                parent_id: "m1".into(),
                channel_id: "c1".into(),
                content: "stored passage".into(),
                embedding: Vec::new(),
                is_attachment: false,
                attachment_id: None,
                attachment_name: None,
            }])
        }
        async fn chunks_for_parent(
            &self,
            _parent_id: &str,
        ) -> Result<Vec<DocumentChunk>, EngineError> {
            Ok(Vec::new())
        }
    }

    struct DownBackend;

    #[async_trait]
    impl CacheBackend for DownBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>, EngineError> {
            Err(EngineError::CacheUnavailable("connection refused".into()))
        }
        async fn set(
            &self,
            _key: &str,
            _value: &str,
            _opts: SetOptions,
        ) -> Result<bool, EngineError> {
            Err(EngineError::CacheUnavailable("connection refused".into()))
        }
        async fn del(&self, _key: &str) -> Result<u64, EngineError> {
            Err(EngineError::CacheUnavailable("connection refused".into()))
        }
    }

    fn test_cache(backend: Arc<dyn CacheBackend>) -> (Cache, Arc<CountingEmbedder>, Arc<CountingStore>) {
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(CountingStore {
            searches: AtomicUsize::new(0),
        });
        let cache = Cache::new(backend, embedder.clone(), store.clone(), 300);
        (cache, embedder, store)
    }

    #[tokio::test]
    async fn test_memory_backend_get_set_del() {
        let backend = MemoryCache::new(16);
        assert_eq!(backend.get("missing").await.unwrap(), None);

        assert!(backend.set("k", "v", SetOptions::default()).await.unwrap());
        assert_eq!(backend.get("k").await.unwrap(), Some("v".to_string()));

        assert_eq!(backend.del("k").await.unwrap(), 1);
        assert_eq!(backend.del("k").await.unwrap(), 0);
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_backend_ttl_expiry() {
        let backend = MemoryCache::new(16);
        let opts = SetOptions {
            px: Some(40),
            ..SetOptions::default()
        };
        backend.set("k", "v", opts).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some("v".to_string()));

        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_backend_nx_xx() {
        let backend = MemoryCache::new(16);

        let nx = SetOptions {
            nx: true,
            ..SetOptions::default()
        };
        let xx = SetOptions {
            xx: true,
            ..SetOptions::default()
        };

        // XX declines on absent key.
        assert!(!backend.set("k", "v1", xx).await.unwrap());
        assert_eq!(backend.get("k").await.unwrap(), None);

        // NX stores on absent key, declines on present key.
        assert!(backend.set("k", "v1", nx).await.unwrap());
        assert!(!backend.set("k", "v2", nx).await.unwrap());
        assert_eq!(backend.get("k").await.unwrap(), Some("v1".to_string()));

        // XX overwrites the present key.
        assert!(backend.set("k", "v3", xx).await.unwrap());
        assert_eq!(backend.get("k").await.unwrap(), Some("v3".to_string()));
    }

    #[tokio::test]
    async fn test_memory_backend_capacity_bound() {
        let backend = MemoryCache::new(2);
        backend.set("a", "1", SetOptions::default()).await.unwrap();
        backend.set("b", "2", SetOptions::default()).await.unwrap();
        backend.set("c", "3", SetOptions::default()).await.unwrap();

        let mut live = 0;
        for key in ["a", "b", "c"] {
            if backend.get(key).await.unwrap().is_some() {
                live += 1;
            }
        }
        assert_eq!(live, 2);
    }

    #[test]
    fn test_query_key_stable_and_scoped() {
        let a = Cache::query_key("What is X?", None);
        let b = Cache::query_key("What is X?", None);
        assert_eq!(a, b);
        assert!(a.starts_with(VECTOR_QUERY_PREFIX));

        let scoped = Cache::query_key("What is X?", Some("guild1"));
        assert_ne!(a, scoped);
        assert_ne!(scoped, Cache::query_key("What is X?", Some("guild2")));
    }

    #[tokio::test]
    async fn test_similarity_search_second_question_is_free() {
        let (cache, embedder, store) = test_cache(Arc::new(MemoryCache::new(16)));

        let first = cache.similarity_search("What is X?", 4, None).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.searches.load(Ordering::SeqCst), 1);

        // Identical question within TTL: zero additional provider or store calls.
        let second = cache.similarity_search("What is X?", 4, None).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.searches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_precomputed_vector_search_skips_embedding() {
        let (cache, embedder, store) = test_cache(Arc::new(MemoryCache::new(16)));

        let hits = cache.similarity_search_vector(&[1.0, 0.0], 4).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.searches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_similarity_search_falls_back_when_backend_down() {
        let (cache, embedder, store) = test_cache(Arc::new(DownBackend));

        // A cache failure is not "no data": the store still answers.
        let hits = cache.similarity_search("What is X?", 4, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.searches.load(Ordering::SeqCst), 1);
    }
}
