//! frontier - Coordination core for a distributed web crawler
//!
//! Tracks every URI the crawler knows through its download lifecycle,
//! decides when and where each one is downloaded next, and hands ready work
//! to download workers. Fetching, parsing and durable storage are external
//! collaborators behind seams; this crate owns the state machine between
//! them.
//!
//! # Architecture
//!
//! - [`models`] - URI state record and lifecycle status table
//! - [`store`] - per-URI state storage seam with a sharded in-memory backend
//! - [`cache`] - activation cache of pending URIs ordered by due time
//! - [`queue`] - per-cluster dispatch FIFOs feeding download workers
//! - [`scheduler`] - backoff, revisit and cluster-assignment policy
//! - [`manager`] - the single writer driving every state transition
//! - [`policy`] - suspend/resume directives for sites and single URIs
//! - [`activator`] - periodic sweep promoting due URIs into dispatch
//! - [`runtime`] - assembly, startup and shutdown
//! - [`config`] - tunables from environment variables or TOML
//! - [`error`] - unified error type and handling categories
//!
//! # Example
//!
//! ```no_run
//! use frontier::config::Config;
//! use frontier::models::FetchOutcome;
//! use frontier::runtime::FrontierCore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let core = FrontierCore::new(&config)?;
//!     let sweeps = core.start();
//!
//!     let manager = core.manager();
//!     manager.create_uri("https://news.example/front").await?;
//!
//!     // A download worker for cluster "alpha"
//!     while let Some(claimed) = manager.claim("alpha").await? {
//!         let outcome = FetchOutcome::failure(503); // fetch here
//!         manager.complete_download(&claimed.uri, outcome).await?;
//!     }
//!
//!     core.shutdown();
//!     sweeps.await?;
//!     Ok(())
//! }
//! ```

pub mod activator;
pub mod cache;
pub mod config;
pub mod error;
pub mod manager;
pub mod models;
pub mod policy;
pub mod queue;
pub mod resolver;
pub mod runtime;
pub mod scheduler;
pub mod store;
pub mod uri;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::ActivationCache;
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::manager::UriManager;
    pub use crate::models::{FetchOutcome, UriState, UriStatus};
    pub use crate::policy::{PolicyAction, PolicyEvent, PolicyScope, PolicyUpdateListener};
    pub use crate::queue::DispatchQueue;
    pub use crate::runtime::FrontierCore;
    pub use crate::scheduler::{ScheduleDecision, ScheduleEvent, Scheduler};
    pub use crate::store::{MemoryUriStore, UriQuery, UriSort, UriStore};
}

// Direct re-exports for convenience
pub use models::{FetchOutcome, UriState, UriStatus};
