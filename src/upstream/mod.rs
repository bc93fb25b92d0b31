//! Signed upstream calls with retry and token refresh.
//!
//! [`UpstreamClient`] owns the outgoing side of the gateway: it assembles
//! the signed query string, injects browser-fingerprint headers, posts the
//! request body and hands back the raw streaming response. The retry loop
//! classifies failures per [`retry`] and refreshes the cached token on 401
//! before the next attempt.

pub mod error;
pub mod retry;


pub use error::UpstreamError;

use chrono::Utc;
use reqwest::header;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::{TokenCache, decode_jwt, guest_user_id, sign};
use crate::constants::{
    NONSTREAM_TIMEOUT, POOL_IDLE_TIMEOUT, POOL_MAX_IDLE_PER_HOST, RETRY_BODY_PEEK_BYTES,
    RETRY_DRAIN_BYTES, STREAM_TIMEOUT, UPSTREAM_ORIGIN,
};
use crate::fingerprint::{FingerprintStore, Scenario};
use crate::protocol::UpstreamRequest;

/// Process-wide client for the upstream chat endpoint.
pub struct UpstreamClient {
    http: reqwest::Client,
    chat_url: String,
    tokens: Arc<TokenCache>,
    fingerprints: Arc<FingerprintStore>,
}

impl UpstreamClient {
    /// Builds the shared HTTP client with the pooling policy all upstream
    /// traffic uses. Response decompression (gzip and brotli, brotli
    /// preferred) is negotiated by the client itself; setting
    /// `Accept-Encoding` by hand would disable its decoders.
    pub fn shared_http() -> reqwest::Client {
        reqwest::Client::builder()
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build()
            .unwrap_or_default()
    }

    pub fn new(
        http: reqwest::Client,
        chat_url: impl Into<String>,
        tokens: Arc<TokenCache>,
        fingerprints: Arc<FingerprintStore>,
    ) -> Self {
        Self {
            http,
            chat_url: chat_url.into(),
            tokens,
            fingerprints,
        }
    }

    /// Posts the request, retrying per the backoff policy.
    ///
    /// Returns the live response once the upstream answers 2xx; the caller
    /// owns the body stream and tears the connection down by dropping it.
    pub async fn call(
        &self,
        request: &UpstreamRequest,
        session_id: &str,
        streaming: bool,
    ) -> Result<reqwest::Response, UpstreamError> {
        let mut rate_limited = false;
        let mut last_error: Option<UpstreamError> = None;

        for attempt in 0..retry::MAX_ATTEMPTS {
            if attempt > 0 {
                let delay = retry::backoff_delay(attempt - 1, rate_limited, streaming);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying upstream call");
                tokio::time::sleep(delay).await;
            }

            let token = self.tokens.get().await?;

            let send_result = self
                .signed_request(&token, request, session_id, streaming)
                .send()
                .await;

            let response = match send_result {
                Ok(response) => response,
                Err(error) => {
                    if retry::is_retryable_transport(&error) {
                        warn!(attempt, error = %error, "transient transport failure");
                        rate_limited = false;
                        last_error = Some(if error.is_timeout() {
                            UpstreamError::Timeout
                        } else {
                            UpstreamError::Transport(error)
                        });
                        continue;
                    }
                    return Err(UpstreamError::Transport(error));
                }
            };

            let status = response.status().as_u16();
            if response.status().is_success() {
                return Ok(response);
            }

            if status == 401 {
                warn!(attempt, "upstream rejected token, refreshing");
                drain_for_reuse(response).await;
                // The cache refetches on the next get(), and the next
                // attempt re-signs with the new token's user id.
                self.tokens.invalidate();
                rate_limited = false;
                last_error = Some(UpstreamError::Status {
                    status,
                    body: String::new(),
                });
                continue;
            }

            if retry::is_retryable_status(status) {
                warn!(attempt, status, "retryable upstream status");
                drain_for_reuse(response).await;
                rate_limited = status == 429;
                last_error = Some(UpstreamError::Status {
                    status,
                    body: String::new(),
                });
                continue;
            }

            if status == 400 {
                let body = peek_body(response, RETRY_BODY_PEEK_BYTES).await;
                if retry::is_busy_body(&body) {
                    warn!(attempt, "upstream busy (400), retrying");
                    rate_limited = false;
                    last_error = Some(UpstreamError::Status { status, body });
                    continue;
                }
                return Err(UpstreamError::Status { status, body });
            }

            let body = peek_body(response, RETRY_BODY_PEEK_BYTES).await;
            return Err(UpstreamError::Status { status, body });
        }

        Err(last_error.unwrap_or(UpstreamError::Timeout))
    }

    fn signed_request(
        &self,
        token: &str,
        request: &UpstreamRequest,
        session_id: &str,
        streaming: bool,
    ) -> reqwest::RequestBuilder {
        let user_id = decode_jwt(token)
            .map(|claims| claims.id)
            .unwrap_or_else(|_| guest_user_id(token));

        let request_id = Uuid::new_v4().to_string();
        let timestamp_ms = Utc::now().timestamp_millis();
        let user_content = last_user_content(request);
        let signature = sign(&user_id, &request_id, timestamp_ms, user_content);

        let pathname = if request.chat_id.is_empty() {
            "/".to_string()
        } else {
            format!("/c/{}", request.chat_id)
        };
        let current_url = format!("{UPSTREAM_ORIGIN}{pathname}");
        let referer = format!("{UPSTREAM_ORIGIN}{pathname}");

        let timeout = if streaming {
            STREAM_TIMEOUT
        } else {
            NONSTREAM_TIMEOUT
        };

        let accept = if streaming {
            "text/event-stream"
        } else {
            "application/json"
        };

        let fingerprint = self.fingerprints.for_session(session_id);

        let mut builder = self
            .http
            .post(&self.chat_url)
            .timeout(timeout)
            .query(&[
                ("signature_timestamp", timestamp_ms.to_string()),
                ("requestId", request_id),
                ("timestamp", timestamp_ms.to_string()),
                ("user_id", user_id),
                ("token", token.to_string()),
                ("current_url", current_url),
                ("pathname", pathname),
            ]);

        for (name, value) in FingerprintStore::header_set(&fingerprint, Scenario::Xhr) {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::ACCEPT, accept)
            .header(header::CONTENT_TYPE, "application/json")
            .header(
                header::ACCEPT_LANGUAGE,
                "zh-CN,zh;q=0.9,en;q=0.8,en-GB;q=0.7,en-US;q=0.6",
            )
            .header(header::ORIGIN, UPSTREAM_ORIGIN)
            .header(header::REFERER, referer)
            .header("X-Signature", signature)
            .json(request)
    }
}

fn last_user_content(request: &UpstreamRequest) -> &str {
    request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

/// Consumes up to 8 KB of a doomed body so the pooled connection can be
/// reused, then drops it.
async fn drain_for_reuse(mut response: reqwest::Response) {
    let mut drained = 0usize;
    while drained < RETRY_DRAIN_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => drained += chunk.len(),
            _ => break,
        }
    }
}

/// Reads at most `limit` bytes of a body for classification or reporting.
async fn peek_body(mut response: reqwest::Response, limit: usize) -> String {
    let mut buffer: Vec<u8> = Vec::new();
    while buffer.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => buffer.extend_from_slice(&chunk),
            _ => break,
        }
    }
    buffer.truncate(limit);
    String::from_utf8_lossy(&buffer).into_owned()
}
