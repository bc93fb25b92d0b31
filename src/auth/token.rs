//! Upstream token cache.
//!
//! Anonymous tokens come from `GET <origin>/api/v1/auths/` and stay valid
//! well past the 5-minute TTL used here; the TTL is a freshness guideline,
//! not a hard expiry. A 401 from the upstream forces a refresh through
//! [`TokenCache::invalidate`] regardless of remaining TTL.

use parking_lot::RwLock;
use serde::Deserialize;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::error::AuthError;
use crate::constants::{ANON_TOKEN_PATH, TOKEN_TTL};

#[derive(Debug, Deserialize)]
struct AnonAuthResponse {
    token: String,
}

struct TokenState {
    token: Option<String>,
    expires_at: Instant,
}

/// Process-wide cache for the upstream bearer token.
///
/// Reads take the fast path under a read lock. A miss funnels through a
/// single-flight gate so exactly one caller fetches from the upstream while
/// the rest wait for and share the result. Fetch failures propagate to the
/// caller and never poison the cached value.
pub struct TokenCache {
    http: reqwest::Client,
    origin: String,
    fixed_token: Option<String>,
    anon_enabled: bool,
    state: RwLock<TokenState>,
    fetch_gate: Mutex<()>,
}

impl TokenCache {
    pub fn new(
        http: reqwest::Client,
        origin: impl Into<String>,
        fixed_token: Option<String>,
        anon_enabled: bool,
    ) -> Self {
        Self {
            http,
            origin: origin.into(),
            fixed_token,
            anon_enabled,
            state: RwLock::new(TokenState {
                token: None,
                expires_at: Instant::now(),
            }),
            fetch_gate: Mutex::new(()),
        }
    }

    /// Returns a bearer token for the next upstream call.
    ///
    /// With anonymous tokens enabled this is the cached-or-fetched anonymous
    /// token, falling back to the configured token if the fetch fails and
    /// one exists. With anonymous tokens disabled the configured token is
    /// returned directly.
    pub async fn get(&self) -> Result<String, AuthError> {
        if self.anon_enabled {
            match self.get_anonymous().await {
                Ok(token) => return Ok(token),
                Err(e) => {
                    if let Some(fixed) = &self.fixed_token {
                        warn!(error = %e, "anonymous token fetch failed, using configured token");
                        return Ok(fixed.clone());
                    }
                    return Err(e);
                }
            }
        }

        self.fixed_token
            .clone()
            .ok_or(AuthError::NoTokenConfigured)
    }

    /// Drops the cached anonymous token so the next [`get`](Self::get)
    /// fetches a fresh one.
    pub fn invalidate(&self) {
        let mut state = self.state.write();
        state.token = None;
        state.expires_at = Instant::now();
        debug!("token cache invalidated");
    }

    async fn get_anonymous(&self) -> Result<String, AuthError> {
        {
            let state = self.state.read();
            if let Some(token) = &state.token {
                if Instant::now() < state.expires_at {
                    return Ok(token.clone());
                }
            }
        }

        // Single-flight: the first caller through fetches, the rest queue on
        // the gate and hit the double-check below.
        let _gate = self.fetch_gate.lock().await;

        {
            let state = self.state.read();
            if let Some(token) = &state.token {
                if Instant::now() < state.expires_at {
                    return Ok(token.clone());
                }
            }
        }

        let token = self.fetch_anonymous().await?;

        {
            let mut state = self.state.write();
            state.token = Some(token.clone());
            state.expires_at = Instant::now() + TOKEN_TTL;
        }

        debug!("anonymous token refreshed");
        Ok(token)
    }

    async fn fetch_anonymous(&self) -> Result<String, AuthError> {
        let url = format!("{}{}", self.origin, ANON_TOKEN_PATH);
        let response = self.http.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(AuthError::TokenFetchStatus {
                status: response.status().as_u16(),
            });
        }

        let body: AnonAuthResponse = response.json().await?;
        Ok(body.token)
    }
}
