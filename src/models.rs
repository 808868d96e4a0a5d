//! Core data structures for the coordination core
//!
//! One [`UriState`] record exists per normalized URI; [`UriStatus`] encodes
//! where in the download workflow the URI currently is, and the transition
//! table in [`UriStatus::can_transition_to`] is the single source of truth
//! for permitted lifecycle edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// URI Status
// ============================================================================

/// Where in the overall workflow a URI is at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UriStatus {
    /// The URI has entered the crawler and awaits its first activation
    Created,

    /// The URI must not be downloaded (policy directive, authorization, ...)
    Suspended,

    /// The next download time has been set and the URI is in the activation
    /// cache or on its way through the dispatch queue
    Scheduled,

    /// A worker has claimed the URI and the download is in flight
    Downloading,

    /// The download failed; the failure is in `UriState::last_http_status`
    DownloadFailed,

    /// The downloaded document is being parsed into its output streams
    Parsing,

    /// The document has been parsed and is ready to be re-scheduled
    Parsed,
}

impl UriStatus {
    /// All statuses, in workflow order
    pub fn all() -> Vec<Self> {
        vec![
            Self::Created,
            Self::Suspended,
            Self::Scheduled,
            Self::Downloading,
            Self::DownloadFailed,
            Self::Parsing,
            Self::Parsed,
        ]
    }

    /// Stable string identifier
    pub fn id(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Suspended => "suspended",
            Self::Scheduled => "scheduled",
            Self::Downloading => "downloading",
            Self::DownloadFailed => "download_failed",
            Self::Parsing => "parsing",
            Self::Parsed => "parsed",
        }
    }

    /// Parse from the stable identifier
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "created" => Some(Self::Created),
            "suspended" => Some(Self::Suspended),
            "scheduled" => Some(Self::Scheduled),
            "downloading" => Some(Self::Downloading),
            "download_failed" => Some(Self::DownloadFailed),
            "parsing" => Some(Self::Parsing),
            "parsed" => Some(Self::Parsed),
            _ => None,
        }
    }

    /// Whether the scheduler may convert this status into `Scheduled`
    pub fn is_schedulable(&self) -> bool {
        matches!(self, Self::Created | Self::DownloadFailed | Self::Parsed)
    }

    /// Whether `download_at` carries meaning in this status
    pub fn honors_download_at(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Scheduled | Self::DownloadFailed | Self::Parsed
        )
    }

    /// Whether a download or parse is currently in flight
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Downloading | Self::Parsing)
    }

    /// Check whether the lifecycle permits the edge `self -> next`.
    ///
    /// Any status may move to `Suspended`; no other edge may skip a state.
    pub fn can_transition_to(&self, next: Self) -> bool {
        if next == Self::Suspended {
            return *self != Self::Suspended;
        }
        matches!(
            (self, next),
            (Self::Created, Self::Scheduled)
                | (Self::Scheduled, Self::Downloading)
                | (Self::Downloading, Self::Parsing)
                | (Self::Downloading, Self::DownloadFailed)
                | (Self::DownloadFailed, Self::Scheduled)
                | (Self::Parsing, Self::Parsed)
                | (Self::Parsed, Self::Scheduled)
                | (Self::Suspended, Self::Created)
        )
    }
}

impl fmt::Display for UriStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

// ============================================================================
// URI State
// ============================================================================

/// Per-URI record managed by the crawler core.
///
/// Identity is the normalized URI string; exactly one record exists per
/// distinct URI. Every mutation refreshes `updated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UriState {
    /// The normalized URI managed by the crawler (immutable identity)
    pub uri: String,

    /// When the URI entered the system (seeded or referenced)
    pub created: DateTime<Utc>,

    /// When the state was last updated
    pub updated: DateTime<Utc>,

    /// DNS-resolved IP address of the host; empty until resolved
    pub host_ip_address: String,

    /// The cluster this URI is assigned to; empty until first schedule
    pub cluster: String,

    /// Where in the workflow the URI is at
    pub status: UriStatus,

    /// When the next download should start
    pub download_at: DateTime<Utc>,

    /// The URI that referenced this one. Set only by the link-discovery
    /// path; a pure lookup relation for the analytical subsystem, never an
    /// ownership edge.
    pub referenced_by: Option<String>,

    /// When the last download started
    pub download_started: Option<DateTime<Utc>>,

    /// When the last download finished
    pub download_finished: Option<DateTime<Utc>>,

    /// HTTP status from the last download; 0 on transport error
    pub last_http_status: u16,

    /// Hex digest of the last successfully fetched content; empty until the
    /// first successful download
    pub document_hash: String,

    /// Whether the last successful download changed the document hash
    pub content_changed: bool,

    /// Headers from the last response
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Consecutive failed download attempts; reset on successful parse
    pub consecutive_failures: u32,

    /// Current revisit interval in seconds; 0 until the first revisit is
    /// computed
    pub revisit_interval_secs: u64,
}

impl UriState {
    /// Create a fresh record in `Created` status, due immediately.
    pub fn new(uri: impl Into<String>) -> Self {
        let now = Utc::now();
        Self::new_at(uri, now)
    }

    /// Create a fresh record with an explicit clock, for deterministic tests.
    pub fn new_at(uri: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            uri: uri.into(),
            created: now,
            updated: now,
            host_ip_address: String::new(),
            cluster: String::new(),
            status: UriStatus::Created,
            download_at: now,
            referenced_by: None,
            download_started: None,
            download_finished: None,
            last_http_status: 0,
            document_hash: String::new(),
            content_changed: false,
            headers: HashMap::new(),
            consecutive_failures: 0,
            revisit_interval_secs: 0,
        }
    }

    /// Set the referencing URI (link-discovery path)
    pub fn with_referenced_by(mut self, referrer: impl Into<String>) -> Self {
        self.referenced_by = Some(referrer.into());
        self
    }

    /// Set the resolved host IP
    pub fn with_host_ip(mut self, ip: impl Into<String>) -> Self {
        self.host_ip_address = ip.into();
        self
    }

    /// Refresh `updated`, keeping it monotonic even if the clock steps back.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated = self.updated.max(now);
    }
}

// ============================================================================
// Fetch Outcome
// ============================================================================

/// Result of a download attempt, reported by the external fetcher
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// HTTP 2xx with a body
    Success {
        /// The HTTP status code
        http_status: u16,
        /// Hex digest of the fetched body
        document_hash: String,
        /// Response headers
        headers: HashMap<String, String>,
    },

    /// Non-2xx response, timeout or network error
    Failure {
        /// The HTTP status code; 0 on transport error
        http_status: u16,
    },
}

impl FetchOutcome {
    /// Build a success outcome
    pub fn success(
        http_status: u16,
        document_hash: impl Into<String>,
        headers: HashMap<String, String>,
    ) -> Self {
        Self::Success {
            http_status,
            document_hash: document_hash.into(),
            headers,
        }
    }

    /// Build a failure outcome
    pub fn failure(http_status: u16) -> Self {
        Self::Failure { http_status }
    }

    /// The HTTP status carried by this outcome
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Success { http_status, .. } | Self::Failure { http_status } => *http_status,
        }
    }
}
