//! Upstream authentication: request signatures and token acquisition.
//!
//! The upstream authenticates calls with a signed query string (see
//! [`signature`]) and a bearer token that is either configured or fetched
//! anonymously and cached (see [`token`]).

pub mod error;
pub mod signature;
pub mod token;


pub use error::AuthError;
pub use signature::{JwtClaims, decode_jwt, guest_user_id, sign};
pub use token::TokenCache;
