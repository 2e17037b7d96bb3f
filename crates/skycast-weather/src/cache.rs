//! Freshness-aware forecast cache over a [`KeyValueStore`].
//!
//! Entries carry their write time; staleness is judged at read time and
//! nothing is ever evicted. All storage failures are logged and swallowed.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::store::KeyValueStore;

const KEY_PREFIX: &str = "wa:";

/// Deterministic key for one logical request.
///
/// Fields are kept sorted by name, so construction order never matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn builder() -> CacheKeyBuilder {
        CacheKeyBuilder::default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheKeyBuilder {
    fields: BTreeMap<String, String>,
}

impl CacheKeyBuilder {
    /// Add a field. A repeated name replaces the earlier value.
    pub fn field(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.fields.insert(name.into(), value.to_string());
        self
    }

    /// Render as `wa:<name>=<value>|...`
    pub fn build(self) -> CacheKey {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        CacheKey(format!("{}{}", KEY_PREFIX, parts.join("|")))
    }
}

/// A cached payload and the time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    #[serde(rename = "writeTimestamp", with = "chrono::serde::ts_milliseconds")]
    pub written_at: DateTime<Utc>,
    pub payload: T,
}

impl<T> CacheEntry<T> {
    /// Whether the entry is at most `max_age` old at `now`.
    ///
    /// Entries stamped in the future count as fresh.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match (now - self.written_at).to_std() {
            Ok(age) => age <= max_age,
            Err(_) => true,
        }
    }
}

/// Best-effort forecast cache.
#[derive(Clone)]
pub struct CacheStore {
    store: Arc<dyn KeyValueStore>,
}

impl CacheStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Overwrite the entry for `key`, stamped with the current time.
    pub fn put<T: Serialize>(&self, key: &CacheKey, value: &T) {
        let entry = CacheEntry {
            written_at: Utc::now(),
            payload: value,
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Failed to serialize cache entry {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.store.set(key.as_str(), &raw) {
            tracing::warn!("Failed to write cache entry {}: {}", key, e);
        }
    }

    /// Payload of an entry no older than `max_age`.
    pub fn get_fresh<T: DeserializeOwned>(&self, key: &CacheKey, max_age: Duration) -> Option<T> {
        self.entry(key)
            .filter(|entry| entry.is_fresh_at(Utc::now(), max_age))
            .map(|entry| entry.payload)
    }

    /// Payload of any existing entry, regardless of age.
    pub fn get_stale<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        self.entry(key).map(|entry| entry.payload)
    }

    /// The full entry, including its write time.
    ///
    /// Unreadable entries are absent and get evicted.
    pub fn entry<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        let raw = match self.store.get(key.as_str()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Failed to read cache entry {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!("Evicting unreadable cache entry {}: {}", key, e);
                if let Err(e) = self.store.remove(key.as_str()) {
                    tracing::warn!("Failed to evict cache entry {}: {}", key, e);
                }
                None
            }
        }
    }
}
