use std::collections::HashMap;
use std::fs::File;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use serde_json::{json, Value};
use switchboard_cache::{CacheRecord, CacheStore, CallCache, MemcacheStore, MemoryStore, UnavailableStore};
use switchboard_core::hash::stable_hash;
use switchboard_core::{Endpoint, Error, Result};
use switchboard_rpc::{Call, RpcBackend};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// Backend that answers every call with its own description and logs traffic
#[derive(Clone, Default)]
struct RecordingBackend {
    sends: Arc<Mutex<Vec<Call>>>,
    batches: Arc<Mutex<Vec<Vec<Call>>>>,
}

impl RecordingBackend {
    fn sends(&self) -> Vec<Call> {
        self.sends.lock().unwrap().clone()
    }

    fn batches(&self) -> Vec<Vec<Call>> {
        self.batches.lock().unwrap().clone()
    }
}

fn answer(call: &Call) -> Value {
    json!({"method": call.qualified_name(), "params": call.params})
}

#[async_trait::async_trait]
impl RpcBackend for RecordingBackend {
    async fn send(&mut self, call: &Call) -> Result<Value> {
        self.sends.lock().unwrap().push(call.clone());
        Ok(answer(call))
    }

    async fn send_batch(&mut self, calls: &[Call]) -> Result<Vec<Value>> {
        self.batches.lock().unwrap().push(calls.to_vec());
        Ok(calls.iter().map(answer).collect())
    }
}

fn cache_with(store: Arc<dyn CacheStore>) -> (CallCache<RecordingBackend>, RecordingBackend) {
    let backend = RecordingBackend::default();
    (CallCache::new(backend.clone(), store), backend)
}

#[tokio::test]
async fn identical_calls_reach_backend_once() {
    let (mut cache, backend) = cache_with(Arc::new(MemoryStore::new()));

    cache.begin("example.com/users/6").await.unwrap();
    let first = cache.call("user", "get", vec![json!(6)], false).await.unwrap();
    let second = cache.call("user", "get", vec![json!(6)], false).await.unwrap();
    let other = cache.call("user", "get", vec![json!(7)], false).await.unwrap();
    cache.end().await;

    assert_eq!(first, second);
    assert_ne!(first, other);
    assert_eq!(backend.sends().len(), 2);
}

#[tokio::test]
async fn stored_plan_is_replayed_as_one_batch_in_order() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let (mut cache, backend) = cache_with(store.clone());

    cache.begin("example.com/").await.unwrap();
    cache.call("news", "latest", vec![], true).await.unwrap();
    cache.call("user", "get", vec![json!(1)], true).await.unwrap();
    cache.call("news", "latest", vec![], true).await.unwrap();
    cache.call("stats", "hit", vec![], false).await.unwrap();
    cache.call("menu", "items", vec![json!("main")], true).await.unwrap();
    cache.end().await;
    assert_eq!(backend.sends().len(), 4);
    assert!(backend.batches().is_empty());

    cache.begin("example.com/").await.unwrap();
    let batches = backend.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(
        batches[0],
        vec![
            Call::new("news", "latest", vec![]),
            Call::new("user", "get", vec![json!(1)]),
            Call::new("menu", "items", vec![json!("main")]),
        ]
    );

    let menu = cache.call("menu", "items", vec![json!("main")], true).await.unwrap();
    let news = cache.call("news", "latest", vec![], true).await.unwrap();
    let news_again = cache.call("news", "latest", vec![], true).await.unwrap();
    cache.call("stats", "hit", vec![], false).await.unwrap();
    cache.end().await;

    assert_eq!(menu, json!({"method": "menu.items", "params": ["main"]}));
    assert_eq!(news, json!({"method": "news.latest", "params": []}));
    assert_eq!(news_again, news);
    // only the non-cacheable call went out live on the second request
    assert_eq!(backend.sends().len(), 5);
}

#[tokio::test]
async fn persisted_plan_carries_calls_but_no_results() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let (mut cache, _backend) = cache_with(store.clone());

    cache.begin("example.com/profile").await.unwrap();
    cache.call("user", "get", vec![json!("private")], true).await.unwrap();
    cache.end().await;

    let bytes = store
        .get(&stable_hash("example.com/profile"))
        .await
        .unwrap()
        .expect("plan stored");
    assert!(!String::from_utf8_lossy(&bytes).contains("user.get"));

    let record = CacheRecord::decode(&bytes).unwrap();
    assert_eq!(record.calls, vec![Call::new("user", "get", vec![json!("private")])]);
    assert_eq!(record.hashes, vec![record.calls[0].identity()]);
}

#[tokio::test]
async fn changed_dependency_invalidates_plan() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("page.tpl");
    File::create(&template).unwrap();

    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let backend = RecordingBackend::default();
    let mut cache = CallCache::new(backend.clone(), store.clone()).with_dependencies([&template]);

    cache.begin("example.com/page").await.unwrap();
    cache.call("page", "body", vec![], true).await.unwrap();
    cache.end().await;

    File::options()
        .write(true)
        .open(&template)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();

    cache.begin("example.com/page").await.unwrap();
    assert!(backend.batches().is_empty());
    cache.call("page", "body", vec![], true).await.unwrap();
    cache.end().await;

    assert_eq!(backend.sends().len(), 2);
    assert_eq!(store.get(&stable_hash("example.com/page")).await.unwrap(), None);
}

#[tokio::test]
async fn tracked_dependency_missing_on_disk_invalidates_plan() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let (mut cache, _backend) = cache_with(store.clone());

    cache.begin("example.com/a").await.unwrap();
    cache.call("a", "b", vec![], true).await.unwrap();
    cache.end().await;

    cache.begin("example.com/a").await.unwrap();
    cache.track_dependency("/nonexistent/switchboard/module.rs").await;
    cache.end().await;

    assert_eq!(store.get(&stable_hash("example.com/a")).await.unwrap(), None);
}

#[tokio::test]
async fn explicit_invalidate_deletes_plan() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let (mut cache, _backend) = cache_with(store.clone());

    cache.begin("k").await.unwrap();
    cache.call("a", "b", vec![], true).await.unwrap();
    cache.end().await;
    assert!(store.get(&stable_hash("k")).await.unwrap().is_some());

    cache.begin("k").await.unwrap();
    cache.invalidate();
    cache.end().await;
    assert_eq!(store.get(&stable_hash("k")).await.unwrap(), None);
}

#[tokio::test]
async fn missing_store_degrades_to_live_calls() {
    let (mut cache, backend) = cache_with(Arc::new(UnavailableStore::new("not configured")));

    cache.begin("example.com/").await.unwrap();
    cache.call("a", "b", vec![], true).await.unwrap();
    cache.call("a", "b", vec![], true).await.unwrap();
    cache.end().await;

    cache.begin("example.com/").await.unwrap();
    cache.call("a", "b", vec![], true).await.unwrap();
    cache.end().await;

    assert!(backend.batches().is_empty());
    assert_eq!(backend.sends().len(), 2);
}

#[tokio::test]
async fn undecodable_plan_is_replaced() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let key = stable_hash("garbled");
    store.add(&key, b"not a plan").await.unwrap();
    let (mut cache, backend) = cache_with(store.clone());

    cache.begin("garbled").await.unwrap();
    cache.call("a", "b", vec![], true).await.unwrap();
    cache.end().await;

    assert!(backend.batches().is_empty());
    let record = CacheRecord::decode(&store.get(&key).await.unwrap().unwrap()).unwrap();
    assert_eq!(record.calls.len(), 1);
}

#[tokio::test]
async fn scoped_ends_request_on_error() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let (mut cache, _backend) = cache_with(store.clone());

    let outcome: Result<()> = cache
        .scoped("example.com/fail", |cache| {
            Box::pin(async move {
                cache.call("a", "b", vec![], true).await?;
                Err::<(), Error>(Error::custom("handler failed"))
            })
        })
        .await;

    assert!(outcome.is_err());
    assert!(!cache.is_active());
    assert!(store.get(&stable_hash("example.com/fail")).await.unwrap().is_some());
}

#[tokio::test]
async fn calls_outside_a_request_go_live() {
    let (mut cache, backend) = cache_with(Arc::new(MemoryStore::new()));

    cache.call("a", "b", vec![], true).await.unwrap();
    cache.call("a", "b", vec![], true).await.unwrap();

    assert_eq!(backend.sends().len(), 2);
}

#[tokio::test]
async fn call_memoized_as_non_cacheable_is_recorded_once_cacheable() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let (mut cache, backend) = cache_with(store.clone());

    cache.begin("example.com/mixed").await.unwrap();
    cache.call("user", "get", vec![json!(1)], false).await.unwrap();
    cache.call("user", "get", vec![json!(1)], true).await.unwrap();
    cache.call("user", "get", vec![json!(1)], true).await.unwrap();
    cache.end().await;
    assert_eq!(backend.sends().len(), 1);

    let bytes = store.get(&stable_hash("example.com/mixed")).await.unwrap().unwrap();
    let record = CacheRecord::decode(&bytes).unwrap();
    assert_eq!(record.calls, vec![Call::new("user", "get", vec![json!(1)])]);

    cache.begin("example.com/mixed").await.unwrap();
    cache.call("user", "get", vec![json!(1)], true).await.unwrap();
    cache.end().await;

    assert_eq!(backend.batches(), vec![vec![Call::new("user", "get", vec![json!(1)])]]);
    assert_eq!(backend.sends().len(), 1);
}

#[tokio::test]
async fn invalidate_drops_replayed_results() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let (mut cache, backend) = cache_with(store.clone());

    cache.begin("k").await.unwrap();
    cache.call("a", "b", vec![], true).await.unwrap();
    cache.end().await;

    cache.begin("k").await.unwrap();
    assert_eq!(backend.batches().len(), 1);
    cache.invalidate();
    cache.call("a", "b", vec![], true).await.unwrap();
    cache.end().await;

    assert_eq!(backend.sends().len(), 2);
    assert_eq!(store.get(&stable_hash("k")).await.unwrap(), None);
}

#[tokio::test]
async fn changed_tracked_dependency_drops_replayed_results() {
    let dir = tempfile::tempdir().unwrap();
    let module = dir.path().join("module.rs");
    File::create(&module).unwrap();

    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let (mut cache, backend) = cache_with(store.clone());

    cache.begin("k").await.unwrap();
    cache.call("a", "b", vec![], true).await.unwrap();
    cache.end().await;

    File::options()
        .write(true)
        .open(&module)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();

    cache.begin("k").await.unwrap();
    cache.track_dependency(&module).await;
    cache.call("a", "b", vec![], true).await.unwrap();
    cache.end().await;

    assert_eq!(backend.batches().len(), 1);
    assert_eq!(backend.sends().len(), 2);
}

#[tokio::test]
async fn request_without_calls_stores_an_empty_plan() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let (mut cache, backend) = cache_with(store.clone());

    cache.begin("example.com/static").await.unwrap();
    cache.end().await;

    let bytes = store.get(&stable_hash("example.com/static")).await.unwrap().expect("plan stored");
    assert!(CacheRecord::decode(&bytes).unwrap().is_empty());

    cache.begin("example.com/static").await.unwrap();
    cache.end().await;
    assert!(backend.batches().is_empty());
}

/// Minimal memcached speaking get/add/delete for a single client
async fn spawn_memcached() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let mut items: HashMap<String, Vec<u8>> = HashMap::new();
        let (socket, _) = listener.accept().await.unwrap();
        let mut socket = BufReader::new(socket);

        loop {
            let mut line = String::new();
            if socket.read_line(&mut line).await.unwrap() == 0 {
                break;
            }
            let words: Vec<&str> = line.split_whitespace().collect();
            let reply = match words.as_slice() {
                ["get", key] => match items.get(*key) {
                    Some(data) => {
                        let mut reply = format!("VALUE {key} 0 {}\r\n", data.len()).into_bytes();
                        reply.extend_from_slice(data);
                        reply.extend_from_slice(b"\r\nEND\r\n");
                        reply
                    }
                    None => b"END\r\n".to_vec(),
                },
                ["add", key, _flags, _exptime, len] => {
                    let mut data = vec![0; len.parse::<usize>().unwrap() + 2];
                    socket.read_exact(&mut data).await.unwrap();
                    data.truncate(data.len() - 2);
                    if items.contains_key(*key) {
                        b"NOT_STORED\r\n".to_vec()
                    } else {
                        items.insert(key.to_string(), data);
                        b"STORED\r\n".to_vec()
                    }
                }
                ["delete", key] => match items.remove(*key) {
                    Some(_) => b"DELETED\r\n".to_vec(),
                    None => b"NOT_FOUND\r\n".to_vec(),
                },
                _ => b"ERROR\r\n".to_vec(),
            };
            socket.get_mut().write_all(&reply).await.unwrap();
        }
    });

    port
}

fn local(port: u16) -> Endpoint {
    Endpoint::Tcp {
        host: "127.0.0.1".into(),
        port,
    }
}

#[tokio::test]
async fn memcache_store_speaks_text_protocol() {
    let port = spawn_memcached().await;
    let store = MemcacheStore::connect(local(port)).await.unwrap();

    assert_eq!(store.get("plan").await.unwrap(), None);
    assert!(store.add("plan", b"line one\r\nline two").await.unwrap());
    assert!(!store.add("plan", b"other").await.unwrap());
    assert_eq!(
        store.get("plan").await.unwrap(),
        Some(b"line one\r\nline two".to_vec())
    );
    assert!(store.delete("plan").await.unwrap());
    assert!(!store.delete("plan").await.unwrap());
}

#[tokio::test]
async fn call_cache_round_trips_through_memcached() {
    let port = spawn_memcached().await;
    let store: Arc<dyn CacheStore> = Arc::new(MemcacheStore::connect(local(port)).await.unwrap());
    let (mut cache, backend) = cache_with(store);

    for _ in 0..2 {
        cache.begin("example.com/").await.unwrap();
        cache.call("a", "b", vec![json!({"deep": [1, 2]})], true).await.unwrap();
        cache.end().await;
    }

    assert_eq!(backend.sends().len(), 1);
    assert_eq!(backend.batches().len(), 1);
}

#[tokio::test]
async fn unreachable_memcached_is_cache_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result = MemcacheStore::connect(local(port)).await;
    assert!(matches!(result, Err(Error::CacheUnavailable(_))));
}
