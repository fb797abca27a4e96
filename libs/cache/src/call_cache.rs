use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use switchboard_core::hash::stable_hash;
use switchboard_core::Result;
use switchboard_rpc::{Call, RpcBackend};

use crate::memo::RequestMemo;
use crate::record::CacheRecord;
use crate::store::CacheStore;

/// Bookkeeping for the request currently being served
struct RequestState {
    key: String,
    record: CacheRecord,
    memo: RequestMemo,
    /// The record was read back from the store
    stored: bool,
    /// The record must be rewritten at the end of the request
    dirty: bool,
    /// The stored record must be deleted at the end of the request
    invalidated: bool,
    /// The store could not be reached; nothing is read or written
    degraded: bool,
}

impl RequestState {
    fn new(key: String) -> Self {
        Self {
            key,
            record: CacheRecord::new(Utc::now()),
            memo: RequestMemo::new(),
            stored: false,
            dirty: false,
            invalidated: false,
            degraded: false,
        }
    }

    /// Drop the plan and everything answered so far, and delete it at the end
    fn invalidate(&mut self) {
        self.invalidated = true;
        self.record = CacheRecord::new(Utc::now());
        self.memo.clear();
    }
}

/// Request-scoped call deduplication with cross-request batched replay
///
/// Between [`begin`](Self::begin) and [`end`](Self::end) every distinct call
/// reaches the backend at most once. Cacheable calls are remembered in a
/// [`CacheRecord`] stored under the request key; the next request with the
/// same key replays the whole plan in a single batch before any business
/// logic runs.
pub struct CallCache<B> {
    backend: B,
    store: Arc<dyn CacheStore>,
    dependencies: Vec<PathBuf>,
    request: Option<RequestState>,
}

impl<B: RpcBackend> CallCache<B> {
    pub fn new(backend: B, store: Arc<dyn CacheStore>) -> Self {
        Self {
            backend,
            store,
            dependencies: Vec::new(),
            request: None,
        }
    }

    /// Files whose modification invalidates stored plans
    pub fn with_dependencies<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.dependencies.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn dependencies(&self) -> &[PathBuf] {
        &self.dependencies
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Whether a request is currently open
    pub fn is_active(&self) -> bool {
        self.request.is_some()
    }

    /// Start a request identified by `request_key`
    ///
    /// Loads the stored plan for the key and, when it is still fresh, replays
    /// it as one batch. An unreachable store only disables caching for this
    /// request. A failed replay is returned; the request stays open with its
    /// plan marked for deletion so that [`end`](Self::end) removes it.
    pub async fn begin(&mut self, request_key: &str) -> Result<()> {
        if self.request.is_some() {
            warn!("Request started while another was open; ending the previous one");
            self.end().await;
        }

        let mut state = RequestState::new(stable_hash(request_key));
        debug!(request_key, key = %state.key, "Beginning request");

        match self.store.get(&state.key).await {
            Ok(Some(bytes)) => match CacheRecord::decode(&bytes) {
                Ok(record) => {
                    state.stored = true;
                    match stale_dependency(&self.dependencies, &record).await {
                        Some(path) => {
                            info!(request_key, dependency = %path.display(), "Stored call plan is stale");
                            state.invalidate();
                        }
                        None => state.record = record,
                    }
                }
                Err(err) => {
                    warn!(request_key, error = %err, "Discarding undecodable call plan");
                    state.dirty = true;
                }
            },
            Ok(None) => {
                debug!(request_key, "No stored call plan");
                state.dirty = true;
            }
            Err(err) => {
                warn!(request_key, error = %err, "Cache store unavailable, caching disabled for request");
                state.degraded = true;
            }
        }

        let replay = if state.record.is_empty() {
            Ok(())
        } else {
            debug!(request_key, calls = state.record.calls.len(), "Replaying stored call plan");
            match self.backend.send_batch(&state.record.calls).await {
                Ok(results) => state.record.fill(results),
                Err(err) => Err(err),
            }
        };

        if let Err(err) = &replay {
            error!(request_key, error = %err, "Replaying stored call plan failed");
            state.invalidate();
        }
        self.request = Some(state);
        replay
    }

    /// Issue a call, answering from replayed or memoized results when possible
    ///
    /// Outside a request the call always goes to the backend.
    pub async fn call(
        &mut self,
        namespace: &str,
        method: &str,
        params: Vec<Value>,
        cacheable: bool,
    ) -> Result<Value> {
        let call = Call::new(namespace, method, params);

        let Some(state) = self.request.as_mut() else {
            return self.backend.send(&call).await;
        };

        let hash = call.identity();
        let result = if let Some(result) = state.record.take_result(&hash) {
            debug!(call = %call.qualified_name(), "Answered from replayed plan");
            state.memo.insert(hash.clone(), result.clone());
            result
        } else if let Some(result) = state.memo.get(&hash) {
            debug!(call = %call.qualified_name(), "Answered from request memo");
            result.clone()
        } else {
            let result = self.backend.send(&call).await?;
            state.memo.insert(hash.clone(), result.clone());
            result
        };

        // a memo hit can still be the first cacheable use of this call
        if cacheable && !state.degraded && !state.invalidated && !state.record.hashes.contains(&hash) {
            state.record.push(hash, call);
            state.dirty = true;
        }
        Ok(result)
    }

    /// Mark the stored plan for deletion when the request ends
    ///
    /// Replayed and memoized results are dropped, so later calls go live.
    pub fn invalidate(&mut self) {
        match self.request.as_mut() {
            Some(state) => {
                info!(key = %state.key, "Call plan invalidated");
                state.invalidate();
            }
            None => warn!("Invalidate called outside of a request"),
        }
    }

    /// Register a file the current output depends on
    ///
    /// When the file changed after the stored plan was written, the plan is
    /// invalidated right away.
    pub async fn track_dependency(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();

        if let Some(state) = self.request.as_mut() {
            if state.stored && !state.invalidated && is_stale_against(&path, &state.record).await {
                info!(key = %state.key, dependency = %path.display(), "Dependency changed, call plan invalidated");
                state.invalidate();
            }
        }

        if !self.dependencies.contains(&path) {
            self.dependencies.push(path);
        }
    }

    /// Finish the request and write the plan back to the store
    ///
    /// Store failures are logged and swallowed.
    pub async fn end(&mut self) {
        let Some(mut state) = self.request.take() else {
            return;
        };

        if state.degraded {
            debug!(key = %state.key, "Ending request without cache store");
            return;
        }

        if state.invalidated {
            if let Err(err) = self.store.delete(&state.key).await {
                warn!(key = %state.key, error = %err, "Deleting call plan failed");
            }
            return;
        }

        if !state.dirty {
            debug!(key = %state.key, live_calls = state.memo.len(), "Call plan unchanged");
            return;
        }

        state.record.expire = Utc::now();
        let bytes = match state.record.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(key = %state.key, error = %err, "Encoding call plan failed");
                return;
            }
        };

        // add is create-if-absent, so the old plan has to go first
        if let Err(err) = self.store.delete(&state.key).await {
            warn!(key = %state.key, error = %err, "Deleting call plan failed");
            return;
        }
        match self.store.add(&state.key, &bytes).await {
            Ok(true) => {
                debug!(key = %state.key, calls = state.record.calls.len(), "Call plan stored")
            }
            Ok(false) => debug!(key = %state.key, "Call plan stored concurrently elsewhere"),
            Err(err) => warn!(key = %state.key, error = %err, "Storing call plan failed"),
        }
    }

    /// Run `f` inside a request, ending it whatever `f` returns
    pub async fn scoped<T, F>(&mut self, request_key: &str, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Self) -> BoxFuture<'a, Result<T>>,
    {
        if let Err(err) = self.begin(request_key).await {
            self.end().await;
            return Err(err);
        }

        let outcome = f(self).await;
        self.end().await;
        outcome
    }
}

/// First dependency changed after `record` was written
async fn stale_dependency<'a>(dependencies: &'a [PathBuf], record: &CacheRecord) -> Option<&'a Path> {
    for path in dependencies {
        if is_stale_against(path, record).await {
            return Some(path);
        }
    }
    None
}

/// Whether `path` changed after `record` was written; unreadable files count as changed
async fn is_stale_against(path: &Path, record: &CacheRecord) -> bool {
    match tokio::fs::metadata(path).await.and_then(|meta| meta.modified()) {
        Ok(modified) => record.is_stale(DateTime::<Utc>::from(modified)),
        Err(err) => {
            warn!(dependency = %path.display(), error = %err, "Cannot read dependency");
            true
        }
    }
}
