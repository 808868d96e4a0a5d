//! Crawl policy directives
//!
//! Policy events (typically derived from robots-exclusion documents) suspend
//! or resume crawling for a whole site or a single URI. Directives live in
//! the [`PolicyStore`] so they outlast the URIs they were applied to: a URI
//! created after a site was suspended is born `Suspended`, and an in-flight
//! download is caught at its completion callback rather than aborted.
//!
//! Site matching is exact-host; `sub.a.example` is not covered by a
//! directive for `a.example`.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use crate::error::Result;
use crate::manager::UriManager;

// ============================================================================
// Policy Events
// ============================================================================

/// What a policy directive applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PolicyScope {
    /// Every URI under this host (exact match)
    Site(String),
    /// A single URI
    Uri(String),
}

/// What the directive does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    /// Stop downloading
    Suspend,
    /// Allow downloading again
    Resume,
}

/// A policy directive consumed by the listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyEvent {
    /// What the directive applies to
    pub scope: PolicyScope,
    /// Suspend or resume
    pub action: PolicyAction,
}

impl PolicyEvent {
    /// Suspend every URI under a host
    pub fn suspend_site(host: impl Into<String>) -> Self {
        Self {
            scope: PolicyScope::Site(host.into().to_ascii_lowercase()),
            action: PolicyAction::Suspend,
        }
    }

    /// Resume every URI under a host
    pub fn resume_site(host: impl Into<String>) -> Self {
        Self {
            scope: PolicyScope::Site(host.into().to_ascii_lowercase()),
            action: PolicyAction::Resume,
        }
    }

    /// Suspend a single URI
    pub fn suspend_uri(uri: impl Into<String>) -> Self {
        Self {
            scope: PolicyScope::Uri(uri.into()),
            action: PolicyAction::Suspend,
        }
    }

    /// Resume a single URI
    pub fn resume_uri(uri: impl Into<String>) -> Self {
        Self {
            scope: PolicyScope::Uri(uri.into()),
            action: PolicyAction::Resume,
        }
    }
}

// ============================================================================
// Policy Store
// ============================================================================

#[derive(Default)]
struct PolicyInner {
    suspended_hosts: HashSet<String>,
    suspended_uris: HashSet<String>,
}

/// Current set of active suspend directives.
///
/// Consulted by the manager on creation, promotion and every completion
/// callback, so directives apply to URIs the store has never seen.
pub struct PolicyStore {
    inner: RwLock<PolicyInner>,
}

impl PolicyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(PolicyInner::default()),
        }
    }

    /// Record a suspend directive for a host; returns `true` when new
    pub async fn suspend_host(&self, host: &str) -> bool {
        self.inner
            .write()
            .await
            .suspended_hosts
            .insert(host.to_ascii_lowercase())
    }

    /// Drop the suspend directive for a host; returns `true` when one existed
    pub async fn resume_host(&self, host: &str) -> bool {
        self.inner
            .write()
            .await
            .suspended_hosts
            .remove(&host.to_ascii_lowercase())
    }

    /// Record a suspend directive for a single URI
    pub async fn suspend_uri(&self, uri: &str) -> bool {
        self.inner.write().await.suspended_uris.insert(uri.to_string())
    }

    /// Drop the suspend directive for a single URI
    pub async fn resume_uri(&self, uri: &str) -> bool {
        self.inner.write().await.suspended_uris.remove(uri)
    }

    /// Whether a directive currently covers this URI or its host
    pub async fn is_suspended(&self, uri: &str, host: &str) -> bool {
        let inner = self.inner.read().await;
        inner.suspended_uris.contains(uri)
            || inner.suspended_hosts.contains(&host.to_ascii_lowercase())
    }

    /// Whether a site-wide directive covers this host
    pub async fn is_host_suspended(&self, host: &str) -> bool {
        self.inner
            .read()
            .await
            .suspended_hosts
            .contains(&host.to_ascii_lowercase())
    }

    /// Count of active directives (hosts, uris)
    pub async fn directive_counts(&self) -> (usize, usize) {
        let inner = self.inner.read().await;
        (inner.suspended_hosts.len(), inner.suspended_uris.len())
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Policy Update Listener
// ============================================================================

/// Consumes policy events and applies them through the manager.
///
/// The parser's policy-event stream feeds [`PolicyUpdateListener::run`]
/// through an mpsc channel; `handle` is also callable directly.
pub struct PolicyUpdateListener {
    manager: Arc<UriManager>,
}

impl PolicyUpdateListener {
    /// Create a listener over a manager
    pub fn new(manager: Arc<UriManager>) -> Self {
        Self { manager }
    }

    /// Apply a single event; returns how many existing URIs changed state
    pub async fn handle(&self, event: PolicyEvent) -> Result<usize> {
        self.manager.apply_policy_event(event).await
    }

    /// Consume events from a channel until it closes
    pub async fn run(&self, mut events: mpsc::Receiver<PolicyEvent>) {
        while let Some(event) = events.recv().await {
            match self.handle(event.clone()).await {
                Ok(changed) => {
                    tracing::debug!(?event, changed, "applied policy event");
                }
                Err(e) => {
                    tracing::warn!(?event, error = %e, "failed to apply policy event");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_host_directives() {
        let store = PolicyStore::new();
        assert!(!store.is_host_suspended("a.example").await);

        assert!(store.suspend_host("A.Example").await);
        assert!(store.is_host_suspended("a.example").await);
        assert!(store.is_suspended("https://a.example/x", "a.example").await);

        // Exact-host matching: subdomains are not covered
        assert!(!store.is_suspended("https://sub.a.example/x", "sub.a.example").await);

        assert!(store.resume_host("a.example").await);
        assert!(!store.is_host_suspended("a.example").await);
    }

    #[tokio::test]
    async fn test_uri_directives() {
        let store = PolicyStore::new();
        store.suspend_uri("https://a.example/x").await;
        assert!(store.is_suspended("https://a.example/x", "a.example").await);
        assert!(!store.is_suspended("https://a.example/y", "a.example").await);

        assert!(store.resume_uri("https://a.example/x").await);
        assert!(!store.is_suspended("https://a.example/x", "a.example").await);
    }

    #[tokio::test]
    async fn test_directive_counts() {
        let store = PolicyStore::new();
        store.suspend_host("a.example").await;
        store.suspend_uri("https://b.example/x").await;
        assert_eq!(store.directive_counts().await, (1, 1));
    }

    #[test]
    fn test_event_constructors_lowercase_hosts() {
        let event = PolicyEvent::suspend_site("A.Example");
        assert_eq!(event.scope, PolicyScope::Site("a.example".to_string()));
        assert_eq!(event.action, PolicyAction::Suspend);
    }
}
