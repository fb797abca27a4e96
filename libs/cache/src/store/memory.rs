use moka::future::Cache;

use switchboard_core::Result;

use crate::store::CacheStore;

/// In-process store for single-process deployments and tests
///
/// Entries never expire on their own; plans are only replaced or deleted by
/// the call cache.
#[derive(Clone)]
pub struct MemoryStore {
    cache: Cache<String, Vec<u8>>,
}

impl MemoryStore {
    /// Default maximum number of stored plans
    pub const DEFAULT_CAPACITY: u64 = 10_000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        let cache = Cache::builder().max_capacity(max_entries).build();
        Self { cache }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.cache.get(key).await)
    }

    async fn add(&self, key: &str, value: &[u8]) -> Result<bool> {
        let entry = self
            .cache
            .entry(key.to_string())
            .or_insert(value.to_vec())
            .await;
        Ok(entry.is_fresh())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.cache.remove(key).await.is_some())
    }
}
