//! Common test utilities

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use frontier::config::Config;
use frontier::manager::UriManager;
use frontier::models::{FetchOutcome, UriState};

/// Configuration with small, easy-to-reason-about intervals
pub fn tight_config() -> Config {
    let mut config = Config::default();
    config.activation.sweep_interval_secs = 1;
    config.backoff.base_secs = 100;
    config.backoff.cap_secs = 100_000;
    config.backoff.jitter_ratio = 0.2;
    config.revisit.default_interval_secs = 1_000;
    config.revisit.min_interval_secs = 100;
    config.revisit.max_interval_secs = 100_000;
    config
}

/// Manager over the in-memory store, tests drive sweeps manually
pub fn manager() -> Arc<UriManager> {
    Arc::new(UriManager::in_memory(&tight_config()))
}

/// Create a URI, promote it and claim it for download
#[allow(dead_code)]
pub async fn create_and_claim(m: &UriManager, uri: &str) -> UriState {
    m.create_uri(uri).await.unwrap();
    promote_and_claim(m, uri).await
}

/// Promote a pending URI past its due time and claim it
#[allow(dead_code)]
pub async fn promote_and_claim(m: &UriManager, uri: &str) -> UriState {
    let state = m.get_uri(uri).await.unwrap();
    let promoted = m
        .sweep(state.download_at + chrono::Duration::seconds(1))
        .await;
    assert!(promoted >= 1, "no due entry promoted for {uri}");
    m.try_claim(&state.cluster)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("nothing claimable in cluster {}", state.cluster))
}

/// Run one successful download+parse cycle for an already claimed URI
#[allow(dead_code)]
pub async fn finish_cycle(m: &UriManager, uri: &str, hash: &str) -> UriState {
    m.complete_download(uri, FetchOutcome::success(200, hash, HashMap::new()))
        .await
        .unwrap();
    m.parse_completed(uri).await.unwrap()
}

/// Seconds from now until the state's next due time
#[allow(dead_code)]
pub fn secs_until_due(state: &UriState) -> i64 {
    (state.download_at - Utc::now()).num_seconds()
}
