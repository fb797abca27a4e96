use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use switchboard_core::{Error, Result};
use switchboard_fabric::codec::{Codec, JsonCodec};
use switchboard_rpc::Call;

/// Cross-request call plan for one logical request
///
/// `hashes[i]` is the identity of `calls[i]`. Replayed results live only in
/// memory; the persisted form never carries them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub expire: DateTime<Utc>,
    pub hashes: Vec<String>,
    pub calls: Vec<Call>,
    #[serde(skip)]
    results: HashMap<String, VecDeque<Value>>,
}

impl CacheRecord {
    /// An empty plan stamped with `expire`
    pub fn new(expire: DateTime<Utc>) -> Self {
        Self {
            expire,
            hashes: Vec::new(),
            calls: Vec::new(),
            results: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Append a cacheable call to the plan
    pub fn push(&mut self, hash: String, call: Call) {
        self.hashes.push(hash);
        self.calls.push(call);
    }

    /// Whether a dependency modified at `modified` makes this plan stale
    pub fn is_stale(&self, modified: DateTime<Utc>) -> bool {
        modified > self.expire
    }

    /// Queue replayed results under their call identities, in plan order
    pub fn fill(&mut self, results: Vec<Value>) -> Result<()> {
        if results.len() != self.hashes.len() {
            return Err(Error::protocol(format!(
                "Replay of {} calls returned {} results",
                self.hashes.len(),
                results.len()
            )));
        }

        for (hash, result) in self.hashes.iter().zip(results) {
            self.results.entry(hash.clone()).or_default().push_back(result);
        }
        Ok(())
    }

    /// Pop the oldest replayed result for `hash`
    pub fn take_result(&mut self, hash: &str) -> Option<Value> {
        self.results.get_mut(hash)?.pop_front()
    }

    /// Encode for the external store, without results
    pub fn encode(&self) -> Result<Vec<u8>> {
        JsonCodec.encode(self).map_err(|e| e.into_core("cache store"))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let record: Self = JsonCodec.decode(bytes).map_err(|e| e.into_core("cache store"))?;
        if record.hashes.len() != record.calls.len() {
            return Err(Error::Codec(format!(
                "Record lists {} hashes for {} calls",
                record.hashes.len(),
                record.calls.len()
            )));
        }
        Ok(record)
    }
}
