use std::collections::HashMap;

use serde_json::Value;

/// Results of live calls made during the current request, by call identity
///
/// Never persisted; cleared when the request ends.
#[derive(Debug, Default)]
pub struct RequestMemo {
    results: HashMap<String, Value>,
}

impl RequestMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &str) -> Option<&Value> {
        self.results.get(hash)
    }

    pub fn insert(&mut self, hash: String, result: Value) {
        self.results.insert(hash, result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn clear(&mut self) {
        self.results.clear();
    }
}
