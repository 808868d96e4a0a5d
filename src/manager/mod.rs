//! URI lifecycle manager
//!
//! [`UriManager`] is the only writer of URI state. Every externally visible
//! operation (creation, claim, completion callbacks, policy directives,
//! removal, promotion) funnels through it, so the lifecycle table in
//! [`UriStatus::can_transition_to`] is enforced in exactly one place.
//!
//! Mutations take a per-URI keyed lock, then go through a read, modify,
//! compare-and-swap cycle against the store. A conflicting writer (another
//! coordinator instance against a shared backend) makes the swap fail with
//! `Conflict`; the manager re-reads and re-applies a bounded number of times
//! before escalating to `Fatal`.

use chrono::{DateTime, Utc};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::cache::ActivationCache;
use crate::config::Config;
use crate::error::{Error, ErrorCategory, Result};
use crate::models::{FetchOutcome, UriState, UriStatus};
use crate::policy::{PolicyAction, PolicyEvent, PolicyScope, PolicyStore};
use crate::queue::DispatchQueue;
use crate::resolver::{HostResolver, NoopResolver};
use crate::scheduler::{ScheduleEvent, Scheduler};
use crate::store::{MemoryUriStore, UriQuery, UriStore};
use crate::uri;

/// Conflict retries before a mutation is escalated to `Fatal`
const MAX_CAS_ATTEMPTS: u32 = 3;

// ============================================================================
// Keyed Locks
// ============================================================================

const LOCK_SHARDS: usize = 64;

/// Hash-sharded mutex set serializing mutations per URI.
///
/// Two URIs may share a shard; that only costs parallelism, never
/// correctness.
struct KeyedLocks {
    shards: Vec<Mutex<()>>,
}

impl KeyedLocks {
    fn new() -> Self {
        Self {
            shards: (0..LOCK_SHARDS).map(|_| Mutex::new(())).collect(),
        }
    }

    fn for_key(&self, key: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }
}

// ============================================================================
// URI Manager
// ============================================================================

/// Coordinator of the URI lifecycle.
///
/// Holds the store, the activation cache, the dispatch queue, the scheduler
/// and the policy directives, and owns every state transition between them.
pub struct UriManager {
    store: Arc<dyn UriStore>,
    cache: ActivationCache,
    queue: DispatchQueue,
    scheduler: Scheduler,
    policy: PolicyStore,
    resolver: Arc<dyn HostResolver>,
    locks: KeyedLocks,
}

impl UriManager {
    /// Create a manager over an explicit store and resolver
    pub fn new(config: &Config, store: Arc<dyn UriStore>, resolver: Arc<dyn HostResolver>) -> Self {
        Self {
            store,
            cache: ActivationCache::new(),
            queue: DispatchQueue::new(),
            scheduler: Scheduler::from_config(config),
            policy: PolicyStore::new(),
            resolver,
            locks: KeyedLocks::new(),
        }
    }

    /// Create a manager over the in-memory store, without DNS resolution
    pub fn in_memory(config: &Config) -> Self {
        Self::new(
            config,
            Arc::new(MemoryUriStore::new()),
            Arc::new(NoopResolver),
        )
    }

    /// The activation cache (pending URIs)
    pub fn cache(&self) -> &ActivationCache {
        &self.cache
    }

    /// The dispatch queue (URIs ready for download)
    pub fn queue(&self) -> &DispatchQueue {
        &self.queue
    }

    /// The active policy directives
    pub fn policy(&self) -> &PolicyStore {
        &self.policy
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn UriStore> {
        &self.store
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Register a URI with the crawler.
    ///
    /// Idempotent: when a record already exists the call is a no-op and the
    /// existing record is returned unchanged.
    pub async fn create_uri(&self, raw_uri: &str) -> Result<UriState> {
        self.create_inner(raw_uri, None, None).await
    }

    /// Register a URI whose host IP is already known, skipping the resolver
    pub async fn create_uri_with_ip(&self, raw_uri: &str, host_ip: &str) -> Result<UriState> {
        self.create_inner(raw_uri, None, Some(host_ip)).await
    }

    /// Register a URI discovered as a link inside `referrer`'s document.
    ///
    /// `referenced_by` is recorded on first creation only; it is a lookup
    /// relation for analytics, so a later re-discovery never rewrites it.
    pub async fn create_uri_with_referrer(
        &self,
        raw_uri: &str,
        referrer: &str,
    ) -> Result<UriState> {
        self.create_inner(raw_uri, Some(referrer), None).await
    }

    async fn create_inner(
        &self,
        raw_uri: &str,
        referrer: Option<&str>,
        host_ip: Option<&str>,
    ) -> Result<UriState> {
        let normalized = uri::normalize(raw_uri)?;
        let host = uri::host_of(&normalized)?;

        let _guard = self.locks.for_key(&normalized).lock().await;

        if let Some(existing) = self.store.get(&normalized).await {
            tracing::debug!(uri = %normalized, "create is a no-op, record exists");
            return Ok(existing);
        }

        let now = Utc::now();
        let mut state = UriState::new_at(&normalized, now);
        if let Some(referrer) = referrer {
            state.referenced_by = Some(uri::normalize(referrer)?);
        }
        if let Some(ip) = host_ip {
            state.host_ip_address = ip.to_string();
        } else if let Some(ip) = self.resolver.resolve(&host).await {
            state.host_ip_address = ip;
        }

        if self.policy.is_suspended(&normalized, &host).await {
            state.status = UriStatus::Suspended;
            self.store.insert_if_absent(state.clone()).await;
            tracing::info!(uri = %normalized, "created suspended under active policy");
            return Ok(state);
        }

        let decision = self
            .scheduler
            .decide(&state, ScheduleEvent::InitialSchedule, now)?;
        state.cluster = decision.cluster;
        state.download_at = decision.download_at;

        self.store.insert_if_absent(state.clone()).await;
        self.cache.insert(&normalized, state.download_at).await;
        tracing::info!(uri = %normalized, cluster = %state.cluster, "uri created");
        Ok(state)
    }

    /// Fetch a record by URI
    pub async fn get_uri(&self, raw_uri: &str) -> Result<UriState> {
        let normalized = uri::normalize(raw_uri)?;
        self.store
            .get(&normalized)
            .await
            .ok_or_else(|| Error::not_found(normalized))
    }

    /// Paged listing query over the store
    pub async fn list_uris(&self, query: &UriQuery) -> (Vec<UriState>, u64) {
        self.store.query(query).await
    }

    // ========================================================================
    // Download Enable / Disable
    // ========================================================================

    /// Enable or disable downloading for one URI.
    ///
    /// Disabling records a per-URI suspend directive, moves the record to
    /// `Suspended` from any state, and withdraws it from the cache and the
    /// queue. Enabling drops the directive and revives the record to
    /// `Created`, due immediately; the failure counter is kept as it was.
    /// Both directions are no-ops when already in the target state.
    pub async fn set_download(&self, raw_uri: &str, enabled: bool) -> Result<UriState> {
        let normalized = uri::normalize(raw_uri)?;
        let host = uri::host_of(&normalized)?;

        let _guard = self.locks.for_key(&normalized).lock().await;

        if !enabled {
            // Check existence before recording the directive; a directive
            // left behind for an unknown URI would silently suspend a later
            // create of that URI
            if self.store.get(&normalized).await.is_none() {
                return Err(Error::not_found(normalized));
            }
            self.policy.suspend_uri(&normalized).await;
            let state = self.suspend_locked(&normalized).await?;
            tracing::info!(uri = %normalized, "download disabled");
            return Ok(state);
        }

        self.policy.resume_uri(&normalized).await;
        if self.policy.is_host_suspended(&host).await {
            // A site-wide directive still covers this URI
            return self
                .store
                .get(&normalized)
                .await
                .ok_or_else(|| Error::not_found(normalized));
        }
        let state = self.revive_locked(&normalized).await?;
        tracing::info!(uri = %normalized, "download enabled");
        Ok(state)
    }

    /// Move a record to `Suspended` and withdraw it from cache and queue.
    /// In-flight records keep running and are caught at their completion
    /// callback. Caller holds the keyed lock.
    async fn suspend_locked(&self, normalized: &str) -> Result<UriState> {
        let state = self
            .store
            .get(normalized)
            .await
            .ok_or_else(|| Error::not_found(normalized))?;

        self.cache.remove(normalized).await;
        self.queue.purge(normalized).await;

        if state.status == UriStatus::Suspended || state.status.is_in_flight() {
            return Ok(state);
        }

        self.apply_mutation(normalized, |s| {
            step(s, UriStatus::Suspended)?;
            Ok(())
        })
        .await
    }

    /// Move a `Suspended` record back to `Created`, due immediately. A
    /// record in any other state is left alone. Caller holds the keyed lock.
    async fn revive_locked(&self, normalized: &str) -> Result<UriState> {
        let state = self
            .store
            .get(normalized)
            .await
            .ok_or_else(|| Error::not_found(normalized))?;
        if state.status != UriStatus::Suspended {
            return Ok(state);
        }

        let now = Utc::now();
        let state = self
            .apply_mutation(normalized, |s| {
                step(s, UriStatus::Created)?;
                s.download_at = now;
                Ok(())
            })
            .await?;
        self.cache.insert(normalized, state.download_at).await;
        Ok(state)
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Delete a URI from the crawler entirely.
    ///
    /// The record, its pending cache entry, any queued dispatch entries and
    /// its per-URI directive are all dropped. An in-flight download keeps
    /// running but its completion callback will find the record gone.
    pub async fn remove_uri(&self, raw_uri: &str) -> Result<()> {
        let normalized = uri::normalize(raw_uri)?;
        let _guard = self.locks.for_key(&normalized).lock().await;

        if !self.store.remove(&normalized).await {
            return Err(Error::not_found(normalized));
        }
        self.cache.remove(&normalized).await;
        self.queue.purge(&normalized).await;
        self.policy.resume_uri(&normalized).await;
        tracing::info!(uri = %normalized, "uri removed");
        Ok(())
    }

    /// Delete every URI under a site; returns how many records were removed.
    /// The host's site-wide directive, if any, is dropped too.
    ///
    /// Accepts either a bare host (`"a.example"`) or a URI on the site
    /// (`"https://a.example/"`).
    pub async fn remove_site(&self, host_or_uri: &str) -> Result<usize> {
        let host = match uri::host_of(host_or_uri) {
            Ok(h) => h,
            Err(_) => host_or_uri.to_ascii_lowercase(),
        };
        let uris = self.store.uris_for_host(&host).await;
        let mut removed = 0;
        for u in &uris {
            match self.remove_uri(u).await {
                Ok(()) => removed += 1,
                // Deleted concurrently; the goal state is reached either way
                Err(Error::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        self.policy.resume_host(&host).await;
        tracing::info!(host = %host, removed, "site removed");
        Ok(removed)
    }

    // ========================================================================
    // Worker Claim
    // ========================================================================

    /// Claim the next URI for a cluster, suspending until one is available.
    ///
    /// Stale queue entries (record removed or suspended after enqueue) are
    /// skipped. Returns `Ok(None)` only after shutdown with the partition
    /// drained.
    pub async fn claim(&self, cluster: &str) -> Result<Option<UriState>> {
        loop {
            let Some(u) = self.queue.dequeue(cluster).await else {
                return Ok(None);
            };
            match self.begin_download(&u).await {
                Ok(state) => return Ok(Some(state)),
                Err(e) if skippable_claim_error(&e) => {
                    tracing::debug!(uri = %u, error = %e, "skipping stale queue entry");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Claim the next URI for a cluster without blocking
    pub async fn try_claim(&self, cluster: &str) -> Result<Option<UriState>> {
        loop {
            let Some(u) = self.queue.try_dequeue(cluster).await else {
                return Ok(None);
            };
            match self.begin_download(&u).await {
                Ok(state) => return Ok(Some(state)),
                Err(e) if skippable_claim_error(&e) => {
                    tracing::debug!(uri = %u, error = %e, "skipping stale queue entry");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Transition a dequeued URI to `Downloading` on behalf of a worker
    async fn begin_download(&self, normalized: &str) -> Result<UriState> {
        let host = uri::host_of(normalized)?;
        let _guard = self.locks.for_key(normalized).lock().await;

        let state = self
            .store
            .get(normalized)
            .await
            .ok_or_else(|| Error::not_found(normalized))?;

        if self.policy.is_suspended(normalized, &host).await {
            // Directive landed between promotion and claim
            if state.status != UriStatus::Suspended {
                self.apply_mutation(normalized, |s| {
                    step(s, UriStatus::Suspended)?;
                    Ok(())
                })
                .await?;
            }
            return Err(Error::InvalidTransition {
                uri: normalized.to_string(),
                from: UriStatus::Suspended,
                to: UriStatus::Downloading,
            });
        }

        let now = Utc::now();
        self.apply_mutation(normalized, |s| {
            step(s, UriStatus::Downloading)?;
            s.download_started = Some(now);
            Ok(())
        })
        .await
    }

    // ========================================================================
    // Completion Callbacks
    // ========================================================================

    /// Record the outcome of a download attempt.
    ///
    /// On success the record moves to `Parsing`; on failure to
    /// `DownloadFailed` with a backoff retry slot in the activation cache.
    /// If a suspend directive arrived while the download was in flight, the
    /// telemetry is recorded and the record moves to `Suspended` instead of
    /// being rescheduled.
    pub async fn complete_download(
        &self,
        raw_uri: &str,
        outcome: FetchOutcome,
    ) -> Result<UriState> {
        let normalized = uri::normalize(raw_uri)?;
        let host = uri::host_of(&normalized)?;
        let _guard = self.locks.for_key(&normalized).lock().await;

        let now = Utc::now();
        let suspended = self.policy.is_suspended(&normalized, &host).await;

        match outcome {
            FetchOutcome::Success {
                http_status,
                document_hash,
                headers,
            } => {
                let state = self
                    .apply_mutation(&normalized, |s| {
                        let target = if suspended {
                            UriStatus::Suspended
                        } else {
                            UriStatus::Parsing
                        };
                        if s.status != UriStatus::Downloading {
                            return Err(Error::InvalidTransition {
                                uri: s.uri.clone(),
                                from: s.status,
                                to: target,
                            });
                        }
                        step(s, target)?;
                        s.download_finished = Some(now);
                        s.last_http_status = http_status;
                        s.content_changed = s.document_hash != document_hash;
                        s.document_hash = document_hash.clone();
                        s.headers = headers.clone();
                        Ok(())
                    })
                    .await?;
                tracing::debug!(uri = %normalized, http_status, "download succeeded");
                Ok(state)
            }
            FetchOutcome::Failure { http_status } => {
                let state = self
                    .apply_mutation(&normalized, |s| {
                        let target = if suspended {
                            UriStatus::Suspended
                        } else {
                            UriStatus::DownloadFailed
                        };
                        if s.status != UriStatus::Downloading {
                            return Err(Error::InvalidTransition {
                                uri: s.uri.clone(),
                                from: s.status,
                                to: target,
                            });
                        }
                        step(s, target)?;
                        s.download_finished = Some(now);
                        s.last_http_status = http_status;
                        s.consecutive_failures += 1;
                        if !suspended {
                            let decision =
                                self.scheduler
                                    .decide(s, ScheduleEvent::RetryAfterFailure, now)?;
                            s.download_at = decision.download_at;
                            s.cluster = decision.cluster;
                        }
                        Ok(())
                    })
                    .await?;

                if !suspended {
                    self.cache.insert(&normalized, state.download_at).await;
                }
                tracing::info!(
                    uri = %normalized,
                    http_status,
                    failures = state.consecutive_failures,
                    retry_at = %state.download_at,
                    "download failed"
                );
                Ok(state)
            }
        }
    }

    /// Record that parsing finished and schedule the next revisit.
    ///
    /// The failure counter resets; the revisit policy decides the next
    /// `download_at` from the stored `content_changed` flag. Under an active
    /// suspend directive the record moves to `Suspended` instead.
    pub async fn parse_completed(&self, raw_uri: &str) -> Result<UriState> {
        let normalized = uri::normalize(raw_uri)?;
        let host = uri::host_of(&normalized)?;
        let _guard = self.locks.for_key(&normalized).lock().await;

        let now = Utc::now();
        let suspended = self.policy.is_suspended(&normalized, &host).await;

        let state = self
            .apply_mutation(&normalized, |s| {
                let target = if suspended {
                    UriStatus::Suspended
                } else {
                    UriStatus::Parsed
                };
                if s.status != UriStatus::Parsing {
                    return Err(Error::InvalidTransition {
                        uri: s.uri.clone(),
                        from: s.status,
                        to: target,
                    });
                }
                step(s, target)?;
                s.consecutive_failures = 0;
                if !suspended {
                    let decision = self.scheduler.decide(
                        s,
                        ScheduleEvent::Revisit {
                            content_changed: s.content_changed,
                        },
                        now,
                    )?;
                    s.download_at = decision.download_at;
                    s.cluster = decision.cluster;
                    if let Some(interval) = decision.revisit_interval_secs {
                        s.revisit_interval_secs = interval;
                    }
                }
                Ok(())
            })
            .await?;

        if !suspended {
            self.cache.insert(&normalized, state.download_at).await;
        }
        tracing::debug!(
            uri = %normalized,
            next_at = %state.download_at,
            "parse completed"
        );
        Ok(state)
    }

    // ========================================================================
    // Promotion Sweep
    // ========================================================================

    /// Drain due entries from the activation cache and move each into the
    /// dispatch queue; returns how many were promoted.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let due = self.cache.take_due(now).await;
        let mut promoted = 0;
        for entry in due {
            match self.promote(&entry.uri, now).await {
                Ok(true) => promoted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(uri = %entry.uri, error = %e, "promotion failed");
                }
            }
        }
        promoted
    }

    /// Promote one due URI into the dispatch queue.
    ///
    /// Returns `Ok(false)` when the entry is stale: the record was removed,
    /// suspended, or already moved on while the entry waited in the cache.
    async fn promote(&self, normalized: &str, now: DateTime<Utc>) -> Result<bool> {
        let host = uri::host_of(normalized)?;
        let _guard = self.locks.for_key(normalized).lock().await;

        let Some(state) = self.store.get(normalized).await else {
            tracing::debug!(uri = %normalized, "dropping due entry, record removed");
            return Ok(false);
        };

        if self.policy.is_suspended(normalized, &host).await {
            if !state.status.is_in_flight() && state.status != UriStatus::Suspended {
                self.apply_mutation(normalized, |s| {
                    step(s, UriStatus::Suspended)?;
                    Ok(())
                })
                .await?;
            }
            return Ok(false);
        }

        if !state.status.is_schedulable() {
            tracing::debug!(uri = %normalized, status = %state.status, "dropping stale due entry");
            return Ok(false);
        }

        let decision = self.scheduler.decide(&state, ScheduleEvent::Promotion, now)?;
        let state = self
            .apply_mutation(normalized, |s| {
                step(s, UriStatus::Scheduled)?;
                s.cluster = decision.cluster.clone();
                Ok(())
            })
            .await?;

        self.queue.enqueue(&state.cluster, normalized).await;
        tracing::debug!(uri = %normalized, cluster = %state.cluster, "promoted to dispatch");
        Ok(true)
    }

    // ========================================================================
    // Policy Events
    // ========================================================================

    /// Apply a policy directive; returns how many existing records changed
    /// state.
    ///
    /// Site directives match the host exactly. Suspending never aborts an
    /// in-flight download or parse; those records are caught at their
    /// completion callback. Resuming a site leaves records with their own
    /// per-URI suspend directive untouched.
    pub async fn apply_policy_event(&self, event: PolicyEvent) -> Result<usize> {
        match (event.scope, event.action) {
            (PolicyScope::Site(host), PolicyAction::Suspend) => {
                self.policy.suspend_host(&host).await;
                let mut changed = 0;
                for u in self.store.uris_for_host(&host).await {
                    let _guard = self.locks.for_key(&u).lock().await;
                    if self.suspend_existing(&u).await? {
                        changed += 1;
                    }
                }
                tracing::info!(host = %host, changed, "site suspended");
                Ok(changed)
            }
            (PolicyScope::Site(host), PolicyAction::Resume) => {
                self.policy.resume_host(&host).await;
                let mut changed = 0;
                for u in self.store.uris_for_host(&host).await {
                    let _guard = self.locks.for_key(&u).lock().await;
                    if self.policy.is_suspended(&u, &host).await {
                        continue;
                    }
                    let before = self.store.get(&u).await.map(|s| s.status);
                    if before == Some(UriStatus::Suspended) {
                        self.revive_locked(&u).await?;
                        changed += 1;
                    }
                }
                tracing::info!(host = %host, changed, "site resumed");
                Ok(changed)
            }
            (PolicyScope::Uri(u), PolicyAction::Suspend) => {
                let state = self.set_download(&u, false).await?;
                Ok(usize::from(state.status == UriStatus::Suspended))
            }
            (PolicyScope::Uri(u), PolicyAction::Resume) => {
                let state = self.set_download(&u, true).await?;
                Ok(usize::from(state.status == UriStatus::Created))
            }
        }
    }

    /// Suspend one existing record under its keyed lock; returns whether the
    /// stored status changed.
    async fn suspend_existing(&self, normalized: &str) -> Result<bool> {
        let Some(state) = self.store.get(normalized).await else {
            return Ok(false);
        };
        self.cache.remove(normalized).await;
        self.queue.purge(normalized).await;
        if state.status == UriStatus::Suspended || state.status.is_in_flight() {
            return Ok(false);
        }
        self.apply_mutation(normalized, |s| {
            step(s, UriStatus::Suspended)?;
            Ok(())
        })
        .await?;
        Ok(true)
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Release every blocked claim; queued items stay queued
    pub fn shutdown(&self) {
        self.queue.shutdown();
    }

    // ========================================================================
    // Mutation Core
    // ========================================================================

    /// Read, modify and compare-and-swap one record.
    ///
    /// `mutate` sees a copy of the stored record; when it succeeds the copy
    /// is written back with a strictly advanced `updated` timestamp, so the
    /// swap token always changes. `Conflict` from the store triggers a
    /// re-read and re-apply, at most [`MAX_CAS_ATTEMPTS`] times.
    async fn apply_mutation<F>(&self, normalized: &str, mut mutate: F) -> Result<UriState>
    where
        F: FnMut(&mut UriState) -> Result<()>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut state = self
                .store
                .get(normalized)
                .await
                .ok_or_else(|| Error::not_found(normalized))?;
            let expected = state.updated;

            mutate(&mut state)?;

            let now = Utc::now();
            state.updated = if now > expected {
                now
            } else {
                expected + chrono::Duration::microseconds(1)
            };

            match self.store.compare_and_put(state.clone(), expected).await {
                Ok(()) => return Ok(state),
                Err(Error::Conflict { .. }) if attempt < MAX_CAS_ATTEMPTS => {
                    tracing::debug!(uri = %normalized, attempt, "conflicting write, retrying");
                }
                Err(Error::Conflict { uri, reason }) => {
                    return Err(Error::fatal(format!(
                        "update of '{uri}' lost {MAX_CAS_ATTEMPTS} races: {reason}"
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Apply one lifecycle edge, rejecting anything the transition table forbids
fn step(state: &mut UriState, to: UriStatus) -> Result<()> {
    if !state.status.can_transition_to(to) {
        return Err(Error::InvalidTransition {
            uri: state.uri.clone(),
            from: state.status,
            to,
        });
    }
    state.status = to;
    Ok(())
}

/// Claim errors that mean "this queue entry is stale", not "stop the worker"
fn skippable_claim_error(e: &Error) -> bool {
    matches!(
        e.category(),
        ErrorCategory::Missing | ErrorCategory::Concurrency
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn manager() -> UriManager {
        UriManager::in_memory(&Config::default())
    }

    async fn drive_to_downloading(m: &UriManager, u: &str) -> UriState {
        m.create_uri(u).await.unwrap();
        m.sweep(Utc::now()).await;
        let state = m.get_uri(u).await.unwrap();
        m.try_claim(&state.cluster).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_create_schedules_immediately() {
        let m = manager();
        let state = m.create_uri("https://a.example/x").await.unwrap();
        assert_eq!(state.status, UriStatus::Created);
        assert!(!state.cluster.is_empty());
        assert!(m.cache().contains("https://a.example/x").await);
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let m = manager();
        let first = m.create_uri("https://a.example/x").await.unwrap();
        let second = m
            .create_uri_with_referrer("https://a.example/x", "https://b.example/")
            .await
            .unwrap();
        assert_eq!(second.referenced_by, None);
        assert_eq!(second.created, first.created);
        assert_eq!(m.store().len().await, 1);
        assert_eq!(m.cache().len().await, 1);
    }

    #[tokio::test]
    async fn test_create_normalizes_duplicates() {
        let m = manager();
        m.create_uri("https://A.Example/x#frag").await.unwrap();
        m.create_uri("https://a.example/x").await.unwrap();
        assert_eq!(m.store().len().await, 1);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_uri() {
        let m = manager();
        let err = m.create_uri("not a uri").await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Argument);
        let err = m.create_uri("ftp://a.example/x").await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Argument);
    }

    #[tokio::test]
    async fn test_create_with_known_ip_skips_resolver() {
        let m = manager();
        let state = m
            .create_uri_with_ip("https://a.example/x", "192.0.2.9")
            .await
            .unwrap();
        assert_eq!(state.host_ip_address, "192.0.2.9");
    }

    #[tokio::test]
    async fn test_create_records_referrer() {
        let m = manager();
        let state = m
            .create_uri_with_referrer("https://a.example/x", "https://a.example/")
            .await
            .unwrap();
        assert_eq!(state.referenced_by.as_deref(), Some("https://a.example/"));
    }

    #[tokio::test]
    async fn test_sweep_promotes_due_entries() {
        let m = manager();
        let state = m.create_uri("https://a.example/x").await.unwrap();
        assert_eq!(m.sweep(Utc::now()).await, 1);

        let stored = m.get_uri("https://a.example/x").await.unwrap();
        assert_eq!(stored.status, UriStatus::Scheduled);
        assert_eq!(m.queue().len(&state.cluster).await, 1);
        assert!(m.cache().is_empty().await);

        // A second sweep finds nothing
        assert_eq!(m.sweep(Utc::now()).await, 0);
    }

    #[tokio::test]
    async fn test_claim_moves_to_downloading() {
        let m = manager();
        let state = drive_to_downloading(&m, "https://a.example/x").await;
        assert_eq!(state.status, UriStatus::Downloading);
        assert!(state.download_started.is_some());
    }

    #[tokio::test]
    async fn test_try_claim_empty_partition() {
        let m = manager();
        assert!(m.try_claim("alpha").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_successful_download_moves_to_parsing() {
        let m = manager();
        drive_to_downloading(&m, "https://a.example/x").await;

        let state = m
            .complete_download(
                "https://a.example/x",
                FetchOutcome::success(200, "h1", HashMap::new()),
            )
            .await
            .unwrap();
        assert_eq!(state.status, UriStatus::Parsing);
        assert_eq!(state.last_http_status, 200);
        assert_eq!(state.document_hash, "h1");
        assert!(state.content_changed);
        assert!(state.download_finished.is_some());
    }

    #[tokio::test]
    async fn test_parse_completed_schedules_revisit() {
        let m = manager();
        drive_to_downloading(&m, "https://a.example/x").await;
        m.complete_download(
            "https://a.example/x",
            FetchOutcome::success(200, "h1", HashMap::new()),
        )
        .await
        .unwrap();

        let before = Utc::now();
        let state = m.parse_completed("https://a.example/x").await.unwrap();
        assert_eq!(state.status, UriStatus::Parsed);
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.revisit_interval_secs > 0);
        assert!(state.download_at > before);
        assert!(m.cache().contains("https://a.example/x").await);
    }

    #[tokio::test]
    async fn test_failed_download_backs_off() {
        let m = manager();
        drive_to_downloading(&m, "https://a.example/x").await;

        let before = Utc::now();
        let state = m
            .complete_download("https://a.example/x", FetchOutcome::failure(503))
            .await
            .unwrap();
        assert_eq!(state.status, UriStatus::DownloadFailed);
        assert_eq!(state.consecutive_failures, 1);
        assert_eq!(state.last_http_status, 503);
        assert!(state.download_at > before);
        assert_eq!(
            m.cache().pending_at("https://a.example/x").await,
            Some(state.download_at)
        );
    }

    #[tokio::test]
    async fn test_completion_for_unclaimed_uri_is_rejected() {
        let m = manager();
        m.create_uri("https://a.example/x").await.unwrap();
        let err = m
            .complete_download("https://a.example/x", FetchOutcome::failure(500))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_set_download_false_suspends_and_withdraws() {
        let m = manager();
        m.create_uri("https://a.example/x").await.unwrap();

        let state = m.set_download("https://a.example/x", false).await.unwrap();
        assert_eq!(state.status, UriStatus::Suspended);
        assert!(!m.cache().contains("https://a.example/x").await);

        // New due entries never appear while suspended
        assert_eq!(m.sweep(Utc::now()).await, 0);
    }

    #[tokio::test]
    async fn test_set_download_round_trip() {
        let m = manager();
        m.create_uri("https://a.example/x").await.unwrap();
        m.set_download("https://a.example/x", false).await.unwrap();

        let state = m.set_download("https://a.example/x", true).await.unwrap();
        assert_eq!(state.status, UriStatus::Created);
        assert_eq!(m.cache().len().await, 1);

        // Enabling an already-enabled URI is a no-op
        let again = m.set_download("https://a.example/x", true).await.unwrap();
        assert_eq!(again.status, UriStatus::Created);
        assert_eq!(m.cache().len().await, 1);
    }

    #[tokio::test]
    async fn test_resume_keeps_failure_counter() {
        let m = manager();
        drive_to_downloading(&m, "https://a.example/x").await;
        m.complete_download("https://a.example/x", FetchOutcome::failure(500))
            .await
            .unwrap();
        m.set_download("https://a.example/x", false).await.unwrap();

        let state = m.set_download("https://a.example/x", true).await.unwrap();
        assert_eq!(state.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_remove_uri_withdraws_everywhere() {
        let m = manager();
        let state = m.create_uri("https://a.example/x").await.unwrap();
        m.sweep(Utc::now()).await;

        m.remove_uri("https://a.example/x").await.unwrap();
        assert!(m.get_uri("https://a.example/x").await.is_err());
        assert_eq!(m.queue().len(&state.cluster).await, 0);
        assert!(m.cache().is_empty().await);

        let err = m.remove_uri("https://a.example/x").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_site_is_exact_host() {
        let m = manager();
        m.create_uri("https://a.example/x").await.unwrap();
        m.create_uri("https://a.example/y").await.unwrap();
        m.create_uri("https://sub.a.example/z").await.unwrap();

        let removed = m.remove_site("a.example").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(m.store().len().await, 1);
        assert!(m.get_uri("https://sub.a.example/z").await.is_ok());
    }

    #[tokio::test]
    async fn test_remove_site_accepts_a_uri() {
        let m = manager();
        m.create_uri("https://a.example/x").await.unwrap();
        m.create_uri("https://b.example/y").await.unwrap();

        let removed = m.remove_site("https://a.example/some/page").await.unwrap();
        assert_eq!(removed, 1);
        assert!(m.get_uri("https://b.example/y").await.is_ok());
    }

    #[tokio::test]
    async fn test_disable_unknown_uri_leaves_no_directive() {
        let m = manager();
        let err = m
            .set_download("https://ghost.example/x", false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        // The failed disable must not poison a later create
        let state = m.create_uri("https://ghost.example/x").await.unwrap();
        assert_eq!(state.status, UriStatus::Created);
        assert!(m.cache().contains("https://ghost.example/x").await);
    }

    #[tokio::test]
    async fn test_claim_skips_removed_entry() {
        let m = manager();
        let state = m.create_uri("https://a.example/x").await.unwrap();
        m.sweep(Utc::now()).await;

        // Remove after promotion but before any worker claims it
        m.remove_uri("https://a.example/x").await.unwrap();
        assert!(m.try_claim(&state.cluster).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_site_suspend_spares_in_flight() {
        let m = manager();
        drive_to_downloading(&m, "https://a.example/x").await;
        m.create_uri("https://a.example/y").await.unwrap();

        let changed = m
            .apply_policy_event(PolicyEvent::suspend_site("a.example"))
            .await
            .unwrap();
        assert_eq!(changed, 1);

        // The pending URI is suspended at once
        let y = m.get_uri("https://a.example/y").await.unwrap();
        assert_eq!(y.status, UriStatus::Suspended);

        // The in-flight URI keeps running and is caught at completion
        let x = m.get_uri("https://a.example/x").await.unwrap();
        assert_eq!(x.status, UriStatus::Downloading);

        let x = m
            .complete_download(
                "https://a.example/x",
                FetchOutcome::success(200, "h1", HashMap::new()),
            )
            .await
            .unwrap();
        assert_eq!(x.status, UriStatus::Suspended);
        assert_eq!(x.last_http_status, 200);
        assert_eq!(x.document_hash, "h1");
    }

    #[tokio::test]
    async fn test_site_resume_revives_records() {
        let m = manager();
        m.create_uri("https://a.example/x").await.unwrap();
        m.apply_policy_event(PolicyEvent::suspend_site("a.example"))
            .await
            .unwrap();

        let changed = m
            .apply_policy_event(PolicyEvent::resume_site("a.example"))
            .await
            .unwrap();
        assert_eq!(changed, 1);
        let state = m.get_uri("https://a.example/x").await.unwrap();
        assert_eq!(state.status, UriStatus::Created);
        assert!(m.cache().contains("https://a.example/x").await);
    }

    #[tokio::test]
    async fn test_site_resume_respects_uri_directive() {
        let m = manager();
        m.create_uri("https://a.example/x").await.unwrap();
        m.set_download("https://a.example/x", false).await.unwrap();
        m.apply_policy_event(PolicyEvent::suspend_site("a.example"))
            .await
            .unwrap();

        m.apply_policy_event(PolicyEvent::resume_site("a.example"))
            .await
            .unwrap();
        let state = m.get_uri("https://a.example/x").await.unwrap();
        assert_eq!(state.status, UriStatus::Suspended);
    }

    #[tokio::test]
    async fn test_uri_created_under_suspended_site_is_born_suspended() {
        let m = manager();
        m.apply_policy_event(PolicyEvent::suspend_site("a.example"))
            .await
            .unwrap();

        let state = m.create_uri("https://a.example/x").await.unwrap();
        assert_eq!(state.status, UriStatus::Suspended);
        assert!(m.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_suspend_after_promotion_blocks_claim() {
        let m = manager();
        let state = m.create_uri("https://a.example/x").await.unwrap();
        m.sweep(Utc::now()).await;

        // The queued entry survives the purge check only until claim time
        m.policy.suspend_uri("https://a.example/x").await;
        assert!(m.try_claim(&state.cluster).await.unwrap().is_none());
        let stored = m.get_uri("https://a.example/x").await.unwrap();
        assert_eq!(stored.status, UriStatus::Suspended);
    }

    #[tokio::test]
    async fn test_list_uris_pages() {
        let m = manager();
        for i in 0..4 {
            m.create_uri(&format!("https://a.example/{i}")).await.unwrap();
        }
        let (page, total) = m
            .list_uris(&UriQuery::all().with_host("a.example").with_page(0, 2))
            .await;
        assert_eq!(total, 4);
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_releases_claim() {
        let m = Arc::new(manager());
        let waiter = {
            let m = Arc::clone(&m);
            tokio::spawn(async move { m.claim("alpha").await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        m.shutdown();
        assert!(waiter.await.unwrap().unwrap().is_none());
    }
}
