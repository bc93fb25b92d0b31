//! Test harness: a gateway instance wired to a scripted mock upstream.

pub mod upstream;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use zgate::auth::TokenCache;
use zgate::config::Config;
use zgate::fingerprint::FingerprintStore;
use zgate::gateway::{AppState, create_router_with_state};
use zgate::stats::StatsCollector;
use zgate::upstream::UpstreamClient;

pub const E2E_API_KEY: &str = "sk-e2e-key";

pub struct TestGateway {
    pub addr: SocketAddr,
    pub upstream: Arc<upstream::MockUpstream>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn spawn_gateway(
    responses: Vec<upstream::MockResponse>,
    max_concurrent: usize,
) -> TestGateway {
    let mock = upstream::spawn(responses).await;

    let config = Arc::new(Config {
        api_key: E2E_API_KEY.to_string(),
        upstream_url: format!("http://{}/api/chat/completions", mock.addr),
        anon_token_enabled: true,
        max_concurrent_requests: max_concurrent,
        ..Default::default()
    });

    let http = UpstreamClient::shared_http();
    let tokens = Arc::new(TokenCache::new(
        http.clone(),
        format!("http://{}", mock.addr),
        None,
        true,
    ));
    let fingerprints = Arc::new(FingerprintStore::builtin());
    let upstream_client = Arc::new(UpstreamClient::new(
        http,
        config.upstream_url.clone(),
        tokens.clone(),
        fingerprints.clone(),
    ));
    let stats = Arc::new(StatsCollector::start());

    let state = AppState::new(config, tokens, fingerprints, upstream_client, stats);
    let app = create_router_with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("serve gateway");
    });

    TestGateway {
        addr,
        upstream: mock,
    }
}

/// Splits a raw SSE body into its `data:` payloads.
pub fn sse_payloads(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|payload| payload.to_string())
        .collect()
}
