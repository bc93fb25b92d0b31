//! Cross-cutting, shared constants.
//!
//! Values fixed by the upstream wire protocol live here so the modules that
//! touch them (auth, upstream, gateway) cannot drift apart. Prefer deriving
//! secondary constants from primary ones.

use std::time::Duration;

/// Browser origin the upstream expects in `Origin`/`Referer`/`current_url`.
pub const UPSTREAM_ORIGIN: &str = "https://chat.z.ai";

/// Default chat-completions endpoint when `UPSTREAM_URL` is unset.
pub const DEFAULT_UPSTREAM_URL: &str = "https://chat.z.ai/api/chat/completions";

/// Anonymous-token endpoint, relative to the upstream origin.
pub const ANON_TOKEN_PATH: &str = "/api/v1/auths/";

/// HMAC key for the signature hierarchy. Fixed by the upstream; bit-exact.
pub const SIGNATURE_KEY: &[u8] = b"junjie";

/// Width of one signature time window in milliseconds (5 minutes).
pub const SIGNATURE_WINDOW_MS: i64 = 5 * 60 * 1000;

/// Lifetime of a cached anonymous token. A 401 forces a refresh regardless.
pub const TOKEN_TTL: Duration = Duration::from_secs(5 * 60);

/// Upstream call timeout when the client asked for a stream.
pub const STREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// Upstream call timeout for aggregated (non-streaming) completions.
pub const NONSTREAM_TIMEOUT: Duration = Duration::from_secs(120);

/// Wall-clock budget for one client request, end to end.
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(300);

/// Hard cap on accumulated raw upstream bytes during aggregation.
pub const MAX_AGGREGATE_BYTES: usize = 10 * 1024 * 1024;

/// Per-message content ceiling enforced by request validation.
pub const MAX_MESSAGE_BYTES: usize = 500 * 1024;

/// Total request content ceiling enforced by request validation.
pub const MAX_TOTAL_CONTENT_BYTES: usize = 1024 * 1024;

/// Tool-definition ceiling at the deserialization boundary.
pub const MAX_TOOLS_BINDING: usize = 20;

/// Tool-definition ceiling enforced by the business-rule layer (dominates).
pub const MAX_TOOLS: usize = 10;

/// Bytes drained from a doomed response body before it is dropped, so the
/// pooled connection stays reusable.
pub const RETRY_DRAIN_BYTES: usize = 8 * 1024;

/// Bytes of an HTTP 400 body inspected for retryable busy markers.
pub const RETRY_BODY_PEEK_BYTES: usize = 1024;

/// Idle connections kept across all hosts in the shared HTTP client pool.
pub const POOL_MAX_IDLE: usize = 100;

/// Idle connections kept per host in the shared HTTP client pool.
pub const POOL_MAX_IDLE_PER_HOST: usize = 10;

/// Idle timeout for pooled upstream connections.
pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Drain window allowed to in-flight requests during graceful shutdown.
pub const SHUTDOWN_DRAIN: Duration = Duration::from_secs(30);
