//! Failure backoff policy
//!
//! Exponential backoff with deterministic jitter, capped at a configured
//! maximum. The jitter is drawn from a ChaCha8 RNG seeded from the host and
//! the failure count, so the same inputs always produce the same delay and
//! consecutive failures produce non-decreasing delays (strictly increasing
//! until the cap is reached).

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

use crate::config::BackoffConfig;

/// Exponential backoff with seeded jitter
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base_secs: u64,
    cap_secs: u64,
    jitter_ratio: f64,
}

impl BackoffPolicy {
    /// Create a policy from explicit parameters
    pub fn new(base_secs: u64, cap_secs: u64, jitter_ratio: f64) -> Self {
        Self {
            base_secs: base_secs.max(1),
            cap_secs: cap_secs.max(base_secs.max(1)),
            jitter_ratio: jitter_ratio.clamp(0.0, 0.999),
        }
    }

    /// Create a policy from configuration
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.base_secs, config.cap_secs, config.jitter_ratio)
    }

    /// Retry delay in seconds for the given consecutive-failure count.
    ///
    /// `consecutive_failures` counts the failure that just happened, so the
    /// first retry is computed with a count of 1.
    pub fn delay_secs(&self, host: &str, consecutive_failures: u32) -> u64 {
        let failures = consecutive_failures.max(1);
        let exponent = (failures - 1).min(32);
        let raw = self
            .base_secs
            .checked_mul(1u64 << exponent)
            .unwrap_or(u64::MAX);

        if raw >= self.cap_secs {
            return self.cap_secs;
        }

        // Jitter below the cap only; at the cap the delay is exactly the cap
        // so the sequence stays non-decreasing.
        let mut rng = ChaCha8Rng::seed_from_u64(seed_for(host, failures));
        let jitter = rng.gen::<f64>() * self.jitter_ratio;
        let jittered = (raw as f64 * (1.0 + jitter)) as u64;
        jittered.min(self.cap_secs)
    }

    /// The configured maximum delay
    pub fn cap_secs(&self) -> u64 {
        self.cap_secs
    }
}

fn seed_for(host: &str, failures: u32) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(host.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes) ^ u64::from(failures)
}
