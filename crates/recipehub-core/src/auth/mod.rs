//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `token`: decoding of the claims carried by an access token
//! - `CredentialStore`: the persisted access/refresh pair and derived user id
//! - `SessionManager`: login/logout, the background token refresh loop and
//!   bearer-decorated API calls
//!
//! Tokens are refreshed every 30 seconds while a session is active. A 401
//! from the refresh endpoint or from any authenticated call ends the session.

pub mod credentials;
pub mod session;
pub mod token;

pub use credentials::{CredentialStore, TOKENS_KEY, USER_ID_KEY};
pub use session::{RefreshOutcome, SessionInfo, SessionManager, DEFAULT_REFRESH_INTERVAL_SECS};
pub use token::{decode_claims, TokenError};
