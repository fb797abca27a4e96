//! Switchboard Cache - Request-level deduplication and cross-request replay
//!
//! [`CallCache`] sits between business logic and an [`RpcBackend`]. Within a
//! request, identical calls reach the backend once. Cacheable calls are
//! recorded as a plan in a [`CacheStore`]; the next request with the same key
//! replays the plan as a single batch.
//!
//! [`RpcBackend`]: switchboard_rpc::RpcBackend

pub mod call_cache;
pub mod memo;
pub mod record;
pub mod store;

pub use call_cache::CallCache;
pub use memo::RequestMemo;
pub use record::CacheRecord;
pub use store::{CacheStore, MemcacheStore, MemoryStore, UnavailableStore};
