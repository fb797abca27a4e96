//! External key-value stores holding call plans between requests.
//!
//! Only three operations are needed: `get`, create-if-absent `add`, and
//! `delete`. Every failure is reported as [`Error::CacheUnavailable`] so the
//! call cache can fall back to live calls.
//!
//! [`Error::CacheUnavailable`]: switchboard_core::Error::CacheUnavailable

use switchboard_core::{Error, Result};

pub mod memcache;
pub mod memory;

pub use self::memcache::MemcacheStore;
pub use self::memory::MemoryStore;

#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch the bytes stored under `key`
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` unless `key` already exists; returns whether it was stored
    async fn add(&self, key: &str, value: &[u8]) -> Result<bool>;

    /// Remove `key`; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// Stand-in used when no store is configured or reachable
#[derive(Debug, Clone, Default)]
pub struct UnavailableStore {
    reason: String,
}

impl UnavailableStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait::async_trait]
impl CacheStore for UnavailableStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Err(Error::CacheUnavailable(self.reason.clone()))
    }

    async fn add(&self, _key: &str, _value: &[u8]) -> Result<bool> {
        Err(Error::CacheUnavailable(self.reason.clone()))
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        Err(Error::CacheUnavailable(self.reason.clone()))
    }
}
