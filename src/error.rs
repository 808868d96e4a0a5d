//! Unified error handling for the frontier crate
//!
//! A single [`Error`] enum covers every failure the coordination core can
//! surface. Callers can branch on [`Error::category`] to pick a handling
//! strategy without matching individual variants.
//!
//! Design rules:
//!
//! - [`Error::NotFound`] and [`Error::InvalidArgument`] are returned to the
//!   immediate caller, never swallowed.
//! - [`Error::Conflict`] is retried internally (re-read, re-apply) a bounded
//!   number of times before being escalated to [`Error::Fatal`].
//! - Downstream fetch/parse failures are recorded on the `UriState` rather
//!   than propagated past the boundary; [`Error::TransientDownstream`] only
//!   appears when a collaborator cannot be reached at all.

use thiserror::Error;

use crate::models::UriStatus;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Caller supplied bad input
    Argument,
    /// The referenced URI does not exist
    Missing,
    /// Concurrent mutation raced with this operation
    Concurrency,
    /// A collaborator (fetcher, parser, storage) is temporarily unavailable
    Downstream,
    /// Invariant violation; processing of the affected URI must halt
    Fatal,
}

/// Unified error type for the frontier crate
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or non-absolute URI
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation on a URI the store does not know
    #[error("URI not found: {0}")]
    NotFound(String),

    /// A concurrent transition was applied first; caller must retry against
    /// fresh state
    #[error("conflicting update on '{uri}': {reason}")]
    Conflict {
        /// The contested URI
        uri: String,
        /// What the conflict was
        reason: String,
    },

    /// Attempted state-machine edge that the lifecycle does not permit
    #[error("transition {from} -> {to} is not permitted for '{uri}'")]
    InvalidTransition {
        /// The URI whose transition was rejected
        uri: String,
        /// Status before the attempt
        from: UriStatus,
        /// Requested status
        to: UriStatus,
    },

    /// Fetcher/parser/storage temporarily unavailable; the core surfaces
    /// this but does not retry I/O itself
    #[error("downstream unavailable: {0}")]
    TransientDownstream(String),

    /// Storage corruption or invariant violation
    #[error("fatal: {0}")]
    Fatal(String),
}

impl Error {
    /// Create an invalid-argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a not-found error for a URI
    pub fn not_found(uri: impl Into<String>) -> Self {
        Self::NotFound(uri.into())
    }

    /// Create a conflict error
    pub fn conflict(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conflict {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    /// Create a fatal error
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArgument(_) => ErrorCategory::Argument,
            Self::NotFound(_) => ErrorCategory::Missing,
            Self::Conflict { .. } | Self::InvalidTransition { .. } => ErrorCategory::Concurrency,
            Self::TransientDownstream(_) => ErrorCategory::Downstream,
            Self::Fatal(_) => ErrorCategory::Fatal,
        }
    }

    /// Check if this error is recoverable (can be retried against fresh state)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::TransientDownstream(_))
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let err = Error::invalid_argument("not a uri");
        assert_eq!(err.category(), ErrorCategory::Argument);

        let err = Error::not_found("https://a.example/x");
        assert_eq!(err.category(), ErrorCategory::Missing);

        let err = Error::conflict("https://a.example/x", "stale read");
        assert_eq!(err.category(), ErrorCategory::Concurrency);
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::conflict("u", "stale").is_recoverable());
        assert!(Error::TransientDownstream("fetcher down".into()).is_recoverable());
        assert!(!Error::fatal("corrupt record").is_recoverable());
        assert!(!Error::not_found("u").is_recoverable());
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = Error::InvalidTransition {
            uri: "https://a.example/x".to_string(),
            from: UriStatus::Created,
            to: UriStatus::Downloading,
        };
        let msg = err.to_string();
        assert!(msg.contains("created"));
        assert!(msg.contains("downloading"));
        assert!(msg.contains("https://a.example/x"));
    }
}
