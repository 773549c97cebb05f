//! Simulate-mode response cache keyed by request fingerprint.
//!
//! The fingerprint is a deterministic key over the normalized request plus
//! the subset of headers any matcher in the store cares about. The cache is
//! flushed wholesale on every write to the simulation store.

use crate::models::{RequestDetails, ResponseDetails};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MatchCache {
    entries: RwLock<HashMap<String, ResponseDetails>>,
}

impl MatchCache {
    pub fn new() -> Self {
        MatchCache::default()
    }

    pub fn get(&self, key: &str) -> Option<ResponseDetails> {
        self.entries.read().get(key).cloned()
    }

    pub fn put(&self, key: String, response: ResponseDetails) {
        self.entries.write().insert(key, response);
    }

    pub fn flush(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Deterministic cache key: the normalized scalar fields joined with an
/// unambiguous separator, followed by the values of the headers named by
/// the store's matchers.
pub fn fingerprint(request: &RequestDetails, matched_headers: &[String]) -> String {
    let mut key = format!(
        "{}|{}|{}|{}|{}|{}",
        request.method,
        request.scheme,
        request.destination,
        request.path,
        request.query,
        request.body_str()
    );
    for name in matched_headers {
        let values = request
            .header_values(name)
            .map(|v| v.join(";"))
            .unwrap_or_default();
        key.push_str(&format!("|{}={}", name.to_lowercase(), values));
    }
    key
}
