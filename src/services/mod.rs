//! Read-through record services.
//!
//! Each service fronts one relational record family with the cache: reads
//! populate the cache after a store hit, and every mutation deletes or
//! overwrites the corresponding key in the same logical operation. A cache
//! failure degrades to the store with a warning; it is never "no data".

pub mod guilds;
pub mod moderators;
pub mod sessions;

pub use guilds::{GuildService, SetupOutcome};
pub use moderators::ModeratorService;
pub use sessions::SessionService;

#[cfg(test)]
pub(crate) mod testutil {
    use crate::cache::{Cache, CacheBackend, MemoryCache, SetOptions};
    use crate::db::Database;
    use crate::error::EngineError;
    use crate::llm::Embedder;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NoopEmbedder;

    #[async_trait]
    impl Embedder for NoopEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EngineError> {
            Ok(vec![0.0])
        }
    }

    /// A backend that is permanently unreachable.
    pub struct DownBackend;

    #[async_trait]
    impl CacheBackend for DownBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>, EngineError> {
            Err(EngineError::CacheUnavailable("down".into()))
        }
        async fn set(
            &self,
            _key: &str,
            _value: &str,
            _opts: SetOptions,
        ) -> Result<bool, EngineError> {
            Err(EngineError::CacheUnavailable("down".into()))
        }
        async fn del(&self, _key: &str) -> Result<u64, EngineError> {
            Err(EngineError::CacheUnavailable("down".into()))
        }
    }

    pub fn memory_db() -> Database {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        db
    }

    pub fn cache_over(db: &Database, backend: Arc<dyn CacheBackend>) -> Cache {
        Cache::new(backend, Arc::new(NoopEmbedder), Arc::new(db.clone()), 300)
    }

    pub fn memory_cache(db: &Database) -> Cache {
        cache_over(db, Arc::new(MemoryCache::new(64)))
    }
}
