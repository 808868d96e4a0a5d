//! DNS resolution seam
//!
//! The core never talks to DNS itself; it asks a [`HostResolver`] when a new
//! URI arrives without an IP and tolerates an empty answer. Production wires
//! in a real resolver, tests use [`StaticResolver`].

use async_trait::async_trait;
use std::collections::HashMap;

/// Supplies the resolved IP address for a host
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Resolve a host to an IP address string; `None` when unknown
    async fn resolve(&self, host: &str) -> Option<String>;
}

/// Resolver that never answers; records keep an empty `host_ip_address`
pub struct NoopResolver;

#[async_trait]
impl HostResolver for NoopResolver {
    async fn resolve(&self, _host: &str) -> Option<String> {
        None
    }
}

/// Fixed host-to-IP table, for tests and static deployments
pub struct StaticResolver {
    entries: HashMap<String, String>,
}

impl StaticResolver {
    /// Create a resolver over a fixed table
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str) -> Option<String> {
        self.entries.get(host).cloned()
    }
}
