//! Upstream request signature.
//!
//! The upstream verifies an `X-Signature` header computed over the request
//! id, timestamp, user id and the last user message. The construction is a
//! two-level HMAC-SHA256: a per-window key is derived from a fixed secret
//! and the 5-minute window index, then the payload is signed with that
//! derived key. Both digests render as lowercase hex.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use ring::hmac;
use serde::Deserialize;

use super::error::AuthError;
use crate::constants::{SIGNATURE_KEY, SIGNATURE_WINDOW_MS};

/// The one claim the gateway needs out of an upstream JWT.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtClaims {
    pub id: String,
}

/// Decodes the payload segment of a JWT without verifying its signature.
///
/// The upstream only needs the `id` claim to bind the signature to a user;
/// trust in the token itself is established by the upstream.
pub fn decode_jwt(token: &str) -> Result<JwtClaims, AuthError> {
    let payload = token.split('.').nth(1).ok_or_else(|| AuthError::InvalidJwt {
        reason: "missing payload segment".to_string(),
    })?;

    let mut padded = payload.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }

    let bytes = URL_SAFE
        .decode(padded.as_bytes())
        .map_err(|e| AuthError::InvalidJwt {
            reason: format!("payload is not base64url: {e}"),
        })?;

    serde_json::from_slice(&bytes).map_err(|e| AuthError::InvalidJwt {
        reason: format!("payload is not a claims object: {e}"),
    })
}

/// Computes the upstream `X-Signature` value.
///
/// Deterministic: identical inputs always yield the identical signature.
pub fn sign(user_id: &str, request_id: &str, timestamp_ms: i64, user_content: &str) -> String {
    let prefix = format!("requestId,{request_id},timestamp,{timestamp_ms},user_id,{user_id}");
    let payload = format!("{prefix}|{user_content}|{timestamp_ms}");

    let window = timestamp_ms / SIGNATURE_WINDOW_MS;
    let window_key = hmac_sha256_hex(SIGNATURE_KEY, window.to_string().as_bytes());

    hmac_sha256_hex(window_key.as_bytes(), payload.as_bytes())
}

/// Derives the stable pseudo-identity for tokens that are not JWTs.
pub fn guest_user_id(token: &str) -> String {
    format!("guest-user-{}", fnv1a32(token.as_bytes()) % 1_000_000)
}

fn hmac_sha256_hex(key: &[u8], message: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hex::encode(hmac::sign(&key, message).as_ref())
}

/// FNV-1a, 32 bit. The upstream protocol fixes this exact hash for guest ids.
fn fnv1a32(data: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &byte in data {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}
