//! Data models shared by the session and API layers.
//!
//! - `TokenPair`: the access/refresh credential record persisted under `tokens`
//! - `TokenClaims`: fields read from an access token payload
//! - `LoginRequest`, `SignupRequest`: form bodies with input validation

pub mod auth;

pub use auth::{LoginRequest, SignupRequest, TokenClaims, TokenPair, ValidationError};
