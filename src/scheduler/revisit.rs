//! Revisit interval policies
//!
//! After a successful parse the scheduler asks a [`RevisitPolicy`] for the
//! delay before the next download. Two implementations ship with the core:
//! a fixed interval, and an adaptive interval that lengthens while the
//! document hash stays unchanged and shortens when it changes.

use crate::config::RevisitConfig;

/// Policy computing the delay before the next re-download
pub trait RevisitPolicy: Send + Sync {
    /// Next interval in seconds.
    ///
    /// `previous_secs` is the interval used for the last cycle (0 when this
    /// is the first revisit); `content_changed` reports whether the document
    /// hash changed on the last successful fetch.
    fn next_interval(&self, previous_secs: u64, content_changed: bool) -> u64;
}

/// Constant revisit interval
#[derive(Debug, Clone)]
pub struct FixedRevisit {
    interval_secs: u64,
}

impl FixedRevisit {
    /// Create a fixed policy
    pub fn new(interval_secs: u64) -> Self {
        Self { interval_secs }
    }
}

impl RevisitPolicy for FixedRevisit {
    fn next_interval(&self, _previous_secs: u64, _content_changed: bool) -> u64 {
        self.interval_secs
    }
}

/// Adaptive revisit interval driven by document-hash change frequency
#[derive(Debug, Clone)]
pub struct AdaptiveRevisit {
    default_secs: u64,
    min_secs: u64,
    max_secs: u64,
    growth_factor: f64,
    shrink_factor: f64,
}

impl AdaptiveRevisit {
    /// Create an adaptive policy
    pub fn new(
        default_secs: u64,
        min_secs: u64,
        max_secs: u64,
        growth_factor: f64,
        shrink_factor: f64,
    ) -> Self {
        Self {
            default_secs,
            min_secs,
            max_secs,
            growth_factor: growth_factor.max(1.0),
            shrink_factor: shrink_factor.clamp(0.01, 1.0),
        }
    }

    fn clamp(&self, secs: u64) -> u64 {
        secs.clamp(self.min_secs, self.max_secs)
    }
}

impl RevisitPolicy for AdaptiveRevisit {
    fn next_interval(&self, previous_secs: u64, content_changed: bool) -> u64 {
        if previous_secs == 0 {
            return self.default_secs;
        }
        let factor = if content_changed {
            self.shrink_factor
        } else {
            self.growth_factor
        };
        self.clamp((previous_secs as f64 * factor) as u64)
    }
}

/// Build the configured revisit policy
pub fn from_config(config: &RevisitConfig) -> Box<dyn RevisitPolicy> {
    if config.adaptive {
        Box::new(AdaptiveRevisit::new(
            config.default_interval_secs,
            config.min_interval_secs,
            config.max_interval_secs,
            config.growth_factor,
            config.shrink_factor,
        ))
    } else {
        Box::new(FixedRevisit::new(config.default_interval_secs))
    }
}
