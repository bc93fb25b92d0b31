//! zgate HTTP server entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tokio::signal;

use zgate::auth::TokenCache;
use zgate::config::Config;
use zgate::constants::{SHUTDOWN_DRAIN, UPSTREAM_ORIGIN};
use zgate::fingerprint::FingerprintStore;
use zgate::gateway::{AppState, create_router_with_state};
use zgate::stats::StatsCollector;
use zgate::upstream::UpstreamClient;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    config.validate()?;

    init_tracing(&config);

    let addr: SocketAddr = config.socket_addr().parse()?;
    tracing::info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        upstream = %config.upstream_url,
        "zgate starting"
    );

    // Startup order: config, fingerprints, token cache, stats, client.
    let config = Arc::new(config);

    let fingerprints = match &config.fingerprints_path {
        Some(path) => Arc::new(FingerprintStore::load(path)?),
        None => {
            tracing::info!("no FINGERPRINTS_PATH configured, using built-in fingerprints");
            Arc::new(FingerprintStore::builtin())
        }
    };

    let http = UpstreamClient::shared_http();

    let upstream_origin = origin_of(&config.upstream_url);
    let tokens = Arc::new(TokenCache::new(
        http.clone(),
        upstream_origin,
        config.upstream_token.clone(),
        config.anon_token_enabled,
    ));

    let stats = Arc::new(StatsCollector::start());

    let upstream = Arc::new(UpstreamClient::new(
        http,
        config.upstream_url.clone(),
        tokens.clone(),
        fingerprints.clone(),
    ));

    let state = AppState::new(config, tokens, fingerprints, upstream, stats.clone());
    let app = create_router_with_state(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Teardown in reverse: let the stats consumer drain, bounded by the
    // shutdown window.
    let _ = tokio::time::timeout(SHUTDOWN_DRAIN, stats.shutdown()).await;

    tracing::info!("zgate shutdown complete");
    Ok(())
}

fn init_tracing(config: &Config) {
    let default_filter = if config.debug_mode { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Scheme and authority of the upstream URL, for the anonymous-token
/// endpoint.
fn origin_of(upstream_url: &str) -> String {
    match reqwest::Url::parse(upstream_url) {
        Ok(url) => {
            let mut origin = format!(
                "{}://{}",
                url.scheme(),
                url.host_str().unwrap_or_default()
            );
            if let Some(port) = url.port() {
                origin.push_str(&format!(":{port}"));
            }
            origin
        }
        Err(_) => UPSTREAM_ORIGIN.to_string(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating graceful shutdown");
        }
    }
}
