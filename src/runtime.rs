//! Crate assembly and lifecycle
//!
//! [`FrontierCore`] wires the manager and the activator together from a
//! [`Config`] and owns their startup and shutdown order. Embedding programs
//! build one core, hand [`FrontierCore::manager`] to their fetcher and
//! parser collaborators, and call [`FrontierCore::shutdown`] when draining.

use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::activator::Activator;
use crate::config::{Config, LoggingConfig};
use crate::manager::UriManager;
use crate::resolver::HostResolver;
use crate::store::UriStore;

/// Assembled coordination core: manager plus activator
pub struct FrontierCore {
    manager: Arc<UriManager>,
    activator: Arc<Activator>,
}

impl FrontierCore {
    /// Build a core over the in-memory store
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let manager = Arc::new(UriManager::in_memory(config));
        let activator = Arc::new(Activator::new(
            Arc::clone(&manager),
            config.sweep_interval(),
        ));
        Ok(Self { manager, activator })
    }

    /// Build a core over an explicit store and resolver
    pub fn with_store(
        config: &Config,
        store: Arc<dyn UriStore>,
        resolver: Arc<dyn HostResolver>,
    ) -> Result<Self> {
        config.validate()?;
        let manager = Arc::new(UriManager::new(config, store, resolver));
        let activator = Arc::new(Activator::new(
            Arc::clone(&manager),
            config.sweep_interval(),
        ));
        Ok(Self { manager, activator })
    }

    /// The lifecycle manager, for fetcher and parser collaborators
    pub fn manager(&self) -> Arc<UriManager> {
        Arc::clone(&self.manager)
    }

    /// Start the promotion sweep loop
    pub fn start(&self) -> JoinHandle<()> {
        self.activator.spawn()
    }

    /// Stop the sweep loop and release every blocked claim.
    ///
    /// Queued dispatch entries stay queued, so a drained worker pool can
    /// finish them before the process exits.
    pub fn shutdown(&self) {
        self.activator.shutdown();
        self.manager.shutdown();
    }
}

/// Install the global tracing subscriber from the logging configuration.
///
/// `FRONTIER_LOG` overrides the configured level with a full filter
/// directive. Call once at process startup.
pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("FRONTIER_LOG")
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
