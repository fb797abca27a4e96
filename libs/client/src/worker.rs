use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{error, info, warn};

use switchboard_cache::{CacheStore, CallCache, MemcacheStore, UnavailableStore};
use switchboard_core::config::CacheConfig;
use switchboard_core::{ClientConfig, Error, Result};
use switchboard_rpc::RpcClient;

/// Open the configured cache store, or a stand-in when it cannot be used
///
/// A missing cache never stops the worker; requests just run uncached.
pub async fn open_store(config: &CacheConfig) -> Arc<dyn CacheStore> {
    if !config.enabled {
        info!("Call cache disabled by configuration");
        return Arc::new(UnavailableStore::new("caching disabled"));
    }

    let endpoint = match config.endpoint() {
        Ok(endpoint) => endpoint,
        Err(err) => {
            warn!(error = %err, "Cache store misconfigured, running without cache");
            return Arc::new(UnavailableStore::new(err.to_string()));
        }
    };

    match MemcacheStore::connect(endpoint.clone()).await {
        Ok(store) => {
            info!(endpoint = %endpoint, "Connected to cache store");
            Arc::new(store)
        }
        Err(err) => {
            warn!(endpoint = %endpoint, error = %err, "Cache store unreachable, running without cache");
            Arc::new(UnavailableStore::new(err.to_string()))
        }
    }
}

/// One request handler's connection state
///
/// Owns the backend connection and the call cache built on it. Requests are
/// handled one at a time through [`handle`](Self::handle).
pub struct Worker {
    config: ClientConfig,
    cache: CallCache<RpcClient>,
}

impl Worker {
    /// Connect to the backend and the configured cache store
    pub async fn start(config: ClientConfig) -> Result<Self> {
        let store = open_store(&config.cache).await;
        Self::start_with_store(config, store).await
    }

    /// Connect to the backend, keeping call plans in `store`
    pub async fn start_with_store(config: ClientConfig, store: Arc<dyn CacheStore>) -> Result<Self> {
        let client = RpcClient::connect(&config).await?;
        info!(
            environment = ?config.client.environment,
            "Worker connected to backend"
        );

        Ok(Self {
            cache: CallCache::new(client, store),
            config,
        })
    }

    /// Files whose modification invalidates stored call plans
    pub fn with_dependencies<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.cache = self.cache.with_dependencies(paths);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cache_mut(&mut self) -> &mut CallCache<RpcClient> {
        &mut self.cache
    }

    /// Run one request identified by `request_key`
    ///
    /// The call cache is primed before `f` runs and flushed after it returns,
    /// whether it succeeded or not.
    pub async fn handle<T, F>(&mut self, request_key: &str, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut CallCache<RpcClient>) -> BoxFuture<'a, Result<T>>,
    {
        let outcome = self.cache.scoped(request_key, f).await;
        if let Err(err) = &outcome {
            error!(request_key, error = %err, fatal = err.is_fatal(), "Request failed");
        }
        outcome
    }

    /// Issue a single call outside of any request
    pub async fn call(&mut self, namespace: &str, method: &str, params: Vec<Value>) -> Result<Value> {
        self.cache.call(namespace, method, params, false).await
    }

    /// Message for `err` that is safe to show to end users
    ///
    /// Details are only included in development.
    pub fn public_message(&self, err: &Error) -> String {
        if self.config.client.environment.show_errors() {
            err.to_string()
        } else {
            "An internal error occurred".to_string()
        }
    }

    /// Close the backend connection
    pub async fn shutdown(self) -> Result<()> {
        let mut client = self.cache.into_backend();
        client.close().await?;
        info!("Worker shut down");
        Ok(())
    }
}
