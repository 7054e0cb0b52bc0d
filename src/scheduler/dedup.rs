//! Request deduplication via result caching.
//!
//! Completed results are memoized by a SHA-256 content hash of the
//! normalized payload. Entries live for the lifetime of the cache: there is
//! no TTL and no eviction.

use std::fmt;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::evaluator::EvalResult;

/// Content hash identifying a request payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Compute the key for a payload.
    ///
    /// Object keys are hashed in sorted order, so two payloads that differ
    /// only in field order share a key.
    pub fn of(payload: &Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize(payload).as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Abbreviated hex form for log fields.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self.short())
    }
}

fn normalize(payload: &Value) -> String {
    let mut out = String::new();
    write_canonical(payload, &mut out);
    out
}

/// Serialize with object keys in sorted order regardless of map backing.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        // Bare strings are trimmed so incidental whitespace does not split keys.
        Value::String(s) => out.push_str(&Value::String(s.trim().to_string()).to_string()),
        other => out.push_str(&other.to_string()),
    }
}

/// Process-lifetime result cache.
///
/// Backed by a `DashMap` so lookups from concurrent submitters do not
/// serialize on a single lock.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: DashMap<CacheKey, EvalResult>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// Get a cached result.
    pub fn lookup(&self, key: &CacheKey) -> Option<EvalResult> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Store a result. Later writes for the same key replace earlier ones.
    pub fn store(&self, key: CacheKey, result: EvalResult) {
        self.entries.insert(key, result);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of entries in cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
