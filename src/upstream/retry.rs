//! Retry classification and backoff schedule for upstream calls.
//!
//! Transient transport failures and a fixed set of HTTP statuses retry
//! with exponential backoff and jitter. Rate limiting (429) gets its own,
//! slower schedule. HTTP 400 is normally fatal, except when the body
//! carries one of the upstream's "busy" markers.

use rand::Rng;
use std::error::Error as _;
use std::time::Duration;

/// Total attempts per upstream call (initial + 4 retries).
pub const MAX_ATTEMPTS: u32 = 5;

const BASE_DELAY: Duration = Duration::from_millis(100);
const MAX_DELAY: Duration = Duration::from_secs(10);

const RATE_LIMIT_BASE_DELAY: Duration = Duration::from_secs(1);
const RATE_LIMIT_MAX_DELAY: Duration = Duration::from_secs(30);
const RATE_LIMIT_MAX_DELAY_STREAM: Duration = Duration::from_secs(180);

const JITTER_FACTOR: f64 = 0.25;

/// Body fragments that mark an HTTP 400 as transient upstream congestion.
const BUSY_MARKERS: &[&str] = &[
    "系统繁忙",
    "system busy",
    "rate limit",
    "too many requests",
    "temporarily unavailable",
];

/// HTTP statuses that are always worth another attempt.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 401 | 408 | 429 | 500 | 502 | 503 | 504)
}

/// Whether a 400 body (first KB) reads as upstream congestion.
pub fn is_busy_body(body: &str) -> bool {
    let lower = body.to_lowercase();
    BUSY_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Whether a transport-level failure is transient.
///
/// Timeouts and connect failures are flagged by reqwest directly; reset,
/// refused, broken-pipe and truncated-body failures only show up in the
/// source chain text.
pub fn is_retryable_transport(error: &reqwest::Error) -> bool {
    if error.is_timeout() || error.is_connect() {
        return true;
    }

    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(current) = source {
        let text = current.to_string().to_ascii_lowercase();
        if text.contains("connection reset")
            || text.contains("connection refused")
            || text.contains("broken pipe")
            || text.contains("unexpected eof")
            || text.contains("early eof")
            || text.contains("unexpected end of file")
        {
            return true;
        }
        source = current.source();
    }

    false
}

/// Delay before the attempt following failed attempt `attempt` (0-based).
///
/// Exponential with factor 2, jittered by ±25%, clamped to [base, max].
pub fn backoff_delay(attempt: u32, rate_limited: bool, streaming: bool) -> Duration {
    let (base, max) = if rate_limited {
        let max = if streaming {
            RATE_LIMIT_MAX_DELAY_STREAM
        } else {
            RATE_LIMIT_MAX_DELAY
        };
        (RATE_LIMIT_BASE_DELAY, max)
    } else {
        (BASE_DELAY, MAX_DELAY)
    };

    let base_ms = base.as_millis() as f64;
    let max_ms = max.as_millis() as f64;

    let exponential = base_ms * 2f64.powi(attempt as i32);
    let capped = exponential.min(max_ms);

    let jitter_span = capped * JITTER_FACTOR;
    let jittered = capped + rand::thread_rng().gen_range(-jitter_span..=jitter_span);

    Duration::from_millis(jittered.clamp(base_ms, max_ms) as u64)
}
