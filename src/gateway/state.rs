//! Shared handler state.

use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::auth::TokenCache;
use crate::config::Config;
use crate::fingerprint::FingerprintStore;
use crate::stats::StatsCollector;
use crate::upstream::UpstreamClient;

/// Everything a request handler needs; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    pub tokens: Arc<TokenCache>,

    pub fingerprints: Arc<FingerprintStore>,

    pub upstream: Arc<UpstreamClient>,

    pub stats: Arc<StatsCollector>,

    /// Admission control: one permit per in-flight request.
    pub admission: Arc<Semaphore>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        tokens: Arc<TokenCache>,
        fingerprints: Arc<FingerprintStore>,
        upstream: Arc<UpstreamClient>,
        stats: Arc<StatsCollector>,
    ) -> Self {
        let admission = Arc::new(Semaphore::new(config.max_concurrent_requests));
        Self {
            config,
            tokens,
            fingerprints,
            upstream,
            stats,
            admission,
        }
    }
}
