//! Scheduling policy engine
//!
//! The scheduler is the central policy authority of the core: it computes
//! the next `download_at` and the cluster for a URI after creation, after a
//! failed download, after a successful parse, and when a due entry leaves
//! the activation cache. It is the sole component allowed to convert
//! `Created`/`DownloadFailed`/`Parsed` into `Scheduled`.
//!
//! [`Scheduler::decide`] is a pure function of `(state, event, now)`:
//! identical inputs always produce identical decisions. Jitter comes from a
//! seeded RNG and the clock is a parameter, so tests can replay decisions
//! exactly.
//!
//! # Modules
//!
//! - [`backoff`] - exponential failure backoff with deterministic jitter
//! - [`cluster`] - stable host-to-cluster hashing
//! - [`revisit`] - fixed and adaptive revisit-interval policies

pub mod backoff;
pub mod cluster;
pub mod revisit;

use chrono::{DateTime, Duration, Utc};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{UriState, UriStatus};
use crate::uri;

pub use backoff::BackoffPolicy;
pub use cluster::ClusterAssigner;
pub use revisit::{AdaptiveRevisit, FixedRevisit, RevisitPolicy};

// ============================================================================
// Events and Decisions
// ============================================================================

/// What happened to the URI, prompting a scheduling decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleEvent {
    /// The record was just created; due immediately
    InitialSchedule,

    /// The last download failed; compute the retry slot
    RetryAfterFailure,

    /// The document was parsed; compute the next revisit
    Revisit {
        /// Whether the document hash changed on the last fetch
        content_changed: bool,
    },

    /// A due entry is leaving the activation cache for the dispatch queue
    Promotion,
}

/// The scheduler's answer: status, due time and cluster for the URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleDecision {
    /// Status the URI moves to
    pub status: UriStatus,

    /// When the next download should start
    pub download_at: DateTime<Utc>,

    /// Cluster the URI is assigned to
    pub cluster: String,

    /// New revisit interval, when the event recomputed it
    pub revisit_interval_secs: Option<u64>,
}

// ============================================================================
// Scheduler
// ============================================================================

/// Deterministic scheduling policy engine
pub struct Scheduler {
    backoff: BackoffPolicy,
    revisit: Box<dyn RevisitPolicy>,
    clusters: ClusterAssigner,
}

impl Scheduler {
    /// Create a scheduler from explicit policies
    pub fn new(
        backoff: BackoffPolicy,
        revisit: Box<dyn RevisitPolicy>,
        clusters: ClusterAssigner,
    ) -> Self {
        Self {
            backoff,
            revisit,
            clusters,
        }
    }

    /// Create a scheduler from configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            backoff: BackoffPolicy::from_config(&config.backoff),
            revisit: revisit::from_config(&config.revisit),
            clusters: ClusterAssigner::new(config.dispatch.clusters.clone()),
        }
    }

    /// The stable cluster for a host
    pub fn assign_cluster(&self, host: &str) -> &str {
        self.clusters.assign(host)
    }

    /// Compute the scheduling decision for a state and event.
    ///
    /// A URI's cluster is assigned on first schedule and kept on every later
    /// event; an ordinary reschedule never migrates it.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidTransition`] when the state's current status does not
    /// admit the event; [`Error::InvalidArgument`] when the stored URI has
    /// no host (a corrupt record).
    pub fn decide(
        &self,
        state: &UriState,
        event: ScheduleEvent,
        now: DateTime<Utc>,
    ) -> Result<ScheduleDecision> {
        let cluster = if state.cluster.is_empty() {
            let host = uri::host_of(&state.uri)?;
            self.clusters.assign(&host).to_string()
        } else {
            state.cluster.clone()
        };

        match event {
            ScheduleEvent::InitialSchedule => {
                self.require(state, UriStatus::Created, UriStatus::Created)?;
                Ok(ScheduleDecision {
                    status: UriStatus::Created,
                    download_at: now,
                    cluster,
                    revisit_interval_secs: None,
                })
            }
            ScheduleEvent::RetryAfterFailure => {
                self.require(state, UriStatus::DownloadFailed, UriStatus::Scheduled)?;
                let host = uri::host_of(&state.uri)?;
                let delay = self.backoff.delay_secs(&host, state.consecutive_failures);
                Ok(ScheduleDecision {
                    status: UriStatus::DownloadFailed,
                    download_at: now + Duration::seconds(delay as i64),
                    cluster,
                    revisit_interval_secs: None,
                })
            }
            ScheduleEvent::Revisit { content_changed } => {
                self.require(state, UriStatus::Parsed, UriStatus::Scheduled)?;
                let interval = self
                    .revisit
                    .next_interval(state.revisit_interval_secs, content_changed);
                Ok(ScheduleDecision {
                    status: UriStatus::Parsed,
                    download_at: now + Duration::seconds(interval as i64),
                    cluster,
                    revisit_interval_secs: Some(interval),
                })
            }
            ScheduleEvent::Promotion => {
                if !state.status.is_schedulable() {
                    return Err(Error::InvalidTransition {
                        uri: state.uri.clone(),
                        from: state.status,
                        to: UriStatus::Scheduled,
                    });
                }
                Ok(ScheduleDecision {
                    status: UriStatus::Scheduled,
                    download_at: state.download_at,
                    cluster,
                    revisit_interval_secs: None,
                })
            }
        }
    }

    fn require(&self, state: &UriState, expected: UriStatus, target: UriStatus) -> Result<()> {
        if state.status == expected {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                uri: state.uri.clone(),
                from: state.status,
                to: target,
            })
        }
    }
}
