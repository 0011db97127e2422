//! Conditional response cache.
//!
//! Entries are keyed by the full request URL and hold the server's ETag, the
//! decoded JSON payload and the time they were stored or last revalidated.
//! Expired entries are dropped when they are looked up. Successful mutations
//! purge every entry whose key contains one of the patterns configured for
//! the mutated path; a `401` anywhere clears everything.

use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub etag: String,
    pub payload: Value,
    pub stored_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, max_age: Duration) -> bool {
        self.stored_at.elapsed() > max_age
    }
}

/// Mutating a path containing `trigger` purges entries containing any of
/// `purges`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationRule {
    pub trigger: String,
    pub purges: Vec<String>,
}

impl InvalidationRule {
    pub fn new(trigger: impl Into<String>, purges: &[&str]) -> Self {
        Self {
            trigger: trigger.into(),
            purges: purges.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub max_age: Duration,
    pub rules: Vec<InvalidationRule>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(60),
            rules: vec![
                InvalidationRule::new("/books", &["/books", "/statistics"]),
                // Loans change availability and the aggregates too.
                InvalidationRule::new(
                    "/borrow-records",
                    &["/borrow-records", "/books", "/statistics"],
                ),
            ],
        }
    }
}

/// How a read uses the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    /// Always ask the server, sending `If-None-Match` when an entry exists.
    #[default]
    Revalidate,
    /// Serve a fresh entry without any request; fall back to `Revalidate`.
    CacheFirst,
    /// Ignore the entry and fetch unconditionally; the result is still stored.
    Reload,
}

#[derive(Debug, Default)]
pub struct ConditionalCache {
    entries: DashMap<String, CacheEntry>,
    config: CacheConfig,
}

impl ConditionalCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    /// The live entry for `key`. An expired entry is removed and reported
    /// as absent.
    pub fn lookup(&self, key: &str) -> Option<CacheEntry> {
        let max_age = self.config.max_age;
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(max_age))
            .is_some()
        {
            tracing::debug!(key, "cache entry expired");
            return None;
        }
        self.entries.get(key).map(|entry| entry.clone())
    }

    pub fn store(&self, key: impl Into<String>, etag: impl Into<String>, payload: Value) {
        let key = key.into();
        tracing::debug!(key = %key, "cache entry stored");
        self.entries.insert(
            key,
            CacheEntry {
                etag: etag.into(),
                payload,
                stored_at: Instant::now(),
            },
        );
    }

    /// Record a `304`: the entry is fresh again. Returns its payload, or
    /// `None` if the entry vanished while the request was in flight.
    pub fn revalidated(&self, key: &str) -> Option<Value> {
        self.entries.get_mut(key).map(|mut entry| {
            entry.stored_at = Instant::now();
            entry.payload.clone()
        })
    }

    /// Apply every rule whose trigger occurs in `path`. Returns how many
    /// entries were purged.
    pub fn invalidate_for(&self, path: &str) -> usize {
        let patterns: Vec<&str> = self
            .config
            .rules
            .iter()
            .filter(|rule| path.contains(rule.trigger.as_str()))
            .flat_map(|rule| rule.purges.iter().map(String::as_str))
            .collect();
        if patterns.is_empty() {
            return 0;
        }

        let before = self.entries.len();
        self.entries
            .retain(|key, _| !patterns.iter().any(|pattern| key.contains(pattern)));
        let purged = before.saturating_sub(self.entries.len());
        tracing::debug!(path, purged, "cache invalidated after mutation");
        purged
    }

    pub fn clear(&self) {
        let purged = self.entries.len();
        self.entries.clear();
        tracing::debug!(purged, "cache cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}
