//! Core library for RecipeHub clients.
//!
//! This crate owns everything a RecipeHub front end needs to talk to the
//! REST API on behalf of a signed-in user:
//!
//! - `auth`: token payload decoding, the credential store and the
//!   `SessionManager` with its background token refresh loop
//! - `api`: the REST client, the HTTP transport seam and the endpoint probe
//! - `storage`: key-value persistence backends (memory, file, OS keychain)
//! - `models`: request and token types shared across the crate
//! - `config`: user configuration and API base URL resolution
//!
//! Presentation (prompts, banners, redirects) is left to the caller.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod storage;

pub use api::{ApiClient, ApiError, HttpTransport, ReqwestTransport};
pub use auth::{CredentialStore, RefreshOutcome, SessionInfo, SessionManager};
pub use config::Config;
pub use models::{LoginRequest, SignupRequest, TokenClaims, TokenPair};
