//! Persisted per-URI state
//!
//! [`UriStore`] is the seam to the storage engine collaborator; the core
//! ships a sharded in-memory implementation used in production-shaped tests
//! and as the reference semantics for any durable backend.
//!
//! Writers go through [`UriStore::compare_and_put`], a compare-and-swap on
//! the record's `updated` timestamp, so a remote backend can reject stale
//! writes with a `Conflict` the manager then retries against fresh state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::models::{UriState, UriStatus};
use crate::uri;

// ============================================================================
// Listing Queries
// ============================================================================

/// Sort order for listing queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UriSort {
    /// By URI, ascending
    UriAsc,
    /// Oldest records first
    CreatedAsc,
    /// Newest records first
    CreatedDesc,
    /// Most recently touched first
    UpdatedDesc,
    /// Next due first
    DownloadAtAsc,
}

impl Default for UriSort {
    fn default() -> Self {
        Self::UriAsc
    }
}

/// Structured listing query over the URI store.
///
/// Replaces a bare `(site, skip, take)` triple so the UI's filter needs can
/// grow without touching the storage seam.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UriQuery {
    /// Only URIs under this exact host
    pub host: Option<String>,

    /// Only URIs in one of these statuses; empty means all
    #[serde(default)]
    pub statuses: Vec<UriStatus>,

    /// Only URIs assigned to this cluster
    pub cluster: Option<String>,

    /// Sort order
    #[serde(default)]
    pub sort: UriSort,

    /// Records to skip (paging)
    #[serde(default)]
    pub skip: usize,

    /// Page size; 0 means no limit
    #[serde(default)]
    pub take: usize,
}

impl UriQuery {
    /// Query everything
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to a host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into().to_ascii_lowercase());
        self
    }

    /// Restrict to a status
    pub fn with_status(mut self, status: UriStatus) -> Self {
        self.statuses.push(status);
        self
    }

    /// Restrict to a cluster
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    /// Set the sort order
    pub fn with_sort(mut self, sort: UriSort) -> Self {
        self.sort = sort;
        self
    }

    /// Set paging
    pub fn with_page(mut self, skip: usize, take: usize) -> Self {
        self.skip = skip;
        self.take = take;
        self
    }

    fn matches(&self, state: &UriState) -> bool {
        if let Some(host) = &self.host {
            match uri::host_of(&state.uri) {
                Ok(h) if &h == host => {}
                _ => return false,
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&state.status) {
            return false;
        }
        if let Some(cluster) = &self.cluster {
            if &state.cluster != cluster {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Durable key-value store keyed by normalized URI.
#[async_trait]
pub trait UriStore: Send + Sync {
    /// Fetch a record by its normalized URI
    async fn get(&self, uri: &str) -> Option<UriState>;

    /// Insert a record if no record exists for its URI.
    ///
    /// Returns `true` when the record was inserted, `false` when a record
    /// already existed (the existing record is left untouched).
    async fn insert_if_absent(&self, state: UriState) -> bool;

    /// Replace a record, provided it has not been mutated since the caller
    /// read it.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the record no longer exists;
    /// [`Error::Conflict`] when `expected_updated` does not match the stored
    /// record's `updated` timestamp.
    async fn compare_and_put(&self, state: UriState, expected_updated: DateTime<Utc>)
        -> Result<()>;

    /// Delete a record; returns `true` when one existed
    async fn remove(&self, uri: &str) -> bool;

    /// All URIs under the given host (exact-host match)
    async fn uris_for_host(&self, host: &str) -> Vec<String>;

    /// Paged listing query; returns the page plus the total match count
    async fn query(&self, query: &UriQuery) -> (Vec<UriState>, u64);

    /// Number of records currently stored
    async fn len(&self) -> usize;
}

// ============================================================================
// In-Memory Store
// ============================================================================

const DEFAULT_SHARDS: usize = 16;

/// Sharded in-memory [`UriStore`] implementation.
pub struct MemoryUriStore {
    shards: Vec<RwLock<HashMap<String, UriState>>>,
}

impl MemoryUriStore {
    /// Create a store with the default shard count
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Create a store with an explicit shard count
    pub fn with_shards(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard_for(&self, uri: &str) -> &RwLock<HashMap<String, UriState>> {
        let mut hasher = DefaultHasher::new();
        uri.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }

    async fn scan<F>(&self, mut f: F)
    where
        F: FnMut(&UriState),
    {
        for shard in &self.shards {
            let guard = shard.read().await;
            for state in guard.values() {
                f(state);
            }
        }
    }
}

impl Default for MemoryUriStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UriStore for MemoryUriStore {
    async fn get(&self, uri: &str) -> Option<UriState> {
        self.shard_for(uri).read().await.get(uri).cloned()
    }

    async fn insert_if_absent(&self, state: UriState) -> bool {
        let shard = self.shard_for(&state.uri);
        let mut guard = shard.write().await;
        if guard.contains_key(&state.uri) {
            false
        } else {
            guard.insert(state.uri.clone(), state);
            true
        }
    }

    async fn compare_and_put(
        &self,
        state: UriState,
        expected_updated: DateTime<Utc>,
    ) -> Result<()> {
        let shard = self.shard_for(&state.uri);
        let mut guard = shard.write().await;
        match guard.get(&state.uri) {
            None => Err(Error::not_found(state.uri)),
            Some(existing) if existing.updated != expected_updated => Err(Error::conflict(
                state.uri,
                format!(
                    "record updated at {} but caller read {}",
                    existing.updated, expected_updated
                ),
            )),
            Some(_) => {
                guard.insert(state.uri.clone(), state);
                Ok(())
            }
        }
    }

    async fn remove(&self, uri: &str) -> bool {
        self.shard_for(uri).write().await.remove(uri).is_some()
    }

    async fn uris_for_host(&self, host: &str) -> Vec<String> {
        let host = host.to_ascii_lowercase();
        let mut matches = Vec::new();
        self.scan(|state| {
            if let Ok(h) = uri::host_of(&state.uri) {
                if h == host {
                    matches.push(state.uri.clone());
                }
            }
        })
        .await;
        matches.sort();
        matches
    }

    async fn query(&self, query: &UriQuery) -> (Vec<UriState>, u64) {
        let mut matches = Vec::new();
        self.scan(|state| {
            if query.matches(state) {
                matches.push(state.clone());
            }
        })
        .await;

        match query.sort {
            UriSort::UriAsc => matches.sort_by(|a, b| a.uri.cmp(&b.uri)),
            UriSort::CreatedAsc => matches.sort_by_key(|s| s.created),
            UriSort::CreatedDesc => matches.sort_by(|a, b| b.created.cmp(&a.created)),
            UriSort::UpdatedDesc => matches.sort_by(|a, b| b.updated.cmp(&a.updated)),
            UriSort::DownloadAtAsc => matches.sort_by_key(|s| s.download_at),
        }

        let total = matches.len() as u64;
        let page: Vec<UriState> = matches
            .into_iter()
            .skip(query.skip)
            .take(if query.take == 0 {
                usize::MAX
            } else {
                query.take
            })
            .collect();

        (page, total)
    }

    async fn len(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.read().await.len();
        }
        total
    }
}
