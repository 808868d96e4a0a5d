//! Activation cache: pending URIs ordered by due time
//!
//! Holds every URI whose `download_at` has not yet arrived. The activator's
//! promotion sweep drains due entries with [`ActivationCache::take_due`];
//! draining and membership updates happen under one lock, so an entry is
//! never yielded twice and an entry removed before promotion is never
//! yielded at all.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

/// A due entry drained from the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueEntry {
    /// The pending URI
    pub uri: String,
    /// The timestamp it was scheduled for
    pub download_at: DateTime<Utc>,
}

#[derive(Default)]
struct CacheInner {
    /// (download_at, insertion seq) -> uri; the seq breaks timestamp ties in
    /// insertion order
    ordered: BTreeMap<(DateTime<Utc>, u64), String>,
    /// uri -> its current key in `ordered`
    index: HashMap<String, (DateTime<Utc>, u64)>,
    next_seq: u64,
}

/// Time-ordered cache of URIs waiting for their download time.
///
/// Explicitly constructed and lifecycle-scoped; tests instantiate isolated
/// instances instead of sharing a process-wide singleton.
pub struct ActivationCache {
    inner: Mutex<CacheInner>,
}

impl ActivationCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Insert or reschedule a pending URI.
    ///
    /// Idempotent per URI: a later insert replaces the pending timestamp
    /// (last-write-wins on `download_at`).
    pub async fn insert(&self, uri: &str, download_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().await;
        if let Some(old_key) = inner.index.remove(uri) {
            inner.ordered.remove(&old_key);
        }
        let key = (download_at, inner.next_seq);
        inner.next_seq += 1;
        inner.ordered.insert(key, uri.to_string());
        inner.index.insert(uri.to_string(), key);
    }

    /// Remove a pending entry if present; no-op otherwise.
    pub async fn remove(&self, uri: &str) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.index.remove(uri) {
            Some(key) => {
                inner.ordered.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Whether the URI is currently pending
    pub async fn contains(&self, uri: &str) -> bool {
        self.inner.lock().await.index.contains_key(uri)
    }

    /// The pending timestamp for a URI, if any
    pub async fn pending_at(&self, uri: &str) -> Option<DateTime<Utc>> {
        self.inner.lock().await.index.get(uri).map(|(at, _)| *at)
    }

    /// Atomically drain every entry with `download_at <= now`, ordered by
    /// timestamp then insertion order.
    pub async fn take_due(&self, now: DateTime<Utc>) -> Vec<DueEntry> {
        let mut inner = self.inner.lock().await;
        let mut due = Vec::new();
        while let Some((&(at, seq), _)) = inner.ordered.iter().next() {
            if at > now {
                break;
            }
            if let Some(uri) = inner.ordered.remove(&(at, seq)) {
                inner.index.remove(&uri);
                due.push(DueEntry {
                    uri,
                    download_at: at,
                });
            }
        }
        due
    }

    /// Number of pending entries
    pub async fn len(&self) -> usize {
        self.inner.lock().await.index.len()
    }

    /// Whether the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ActivationCache {
    fn default() -> Self {
        Self::new()
    }
}
