use std::sync::Arc;

use tracing::{debug, warn};

use super::token::decode_claims;
use crate::models::{TokenClaims, TokenPair};
use crate::storage::KeyValueStore;

/// Storage key holding the serialised token pair
pub const TOKENS_KEY: &str = "tokens";

/// Storage key holding the user id derived from the access token
pub const USER_ID_KEY: &str = "user_id";

/// Persists the session's token pair on top of a key-value backend.
///
/// Backend and parse failures stop here: they are logged and reported to
/// callers as "no session", never as errors.
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Persist the pair as one record, overwriting any previous one
    pub fn save(&self, tokens: &TokenPair) {
        let record = match serde_json::to_string(tokens) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Failed to serialise token pair");
                return;
            }
        };
        if let Err(e) = self.backend.set(TOKENS_KEY, &record) {
            warn!(error = %e, "Failed to store token pair");
            return;
        }

        let derived = match decode_claims(&tokens.access) {
            Ok(claims) => self.backend.set(USER_ID_KEY, &claims.user_id),
            Err(e) => {
                debug!(error = %e, "Access token has no readable user id");
                self.backend.remove(USER_ID_KEY)
            }
        };
        if let Err(e) = derived {
            warn!(error = %e, "Failed to update stored user id");
        }
    }

    /// The stored pair, or `None` if missing or unreadable
    pub fn load(&self) -> Option<TokenPair> {
        let record = match self.backend.get(TOKENS_KEY) {
            Ok(record) => record?,
            Err(e) => {
                warn!(error = %e, "Failed to read token pair");
                return None;
            }
        };
        match serde_json::from_str(&record) {
            Ok(tokens) => Some(tokens),
            Err(e) => {
                debug!(error = %e, "Stored token record is not a valid pair");
                None
            }
        }
    }

    /// Remove the pair and the derived user id. Safe to repeat.
    pub fn clear(&self) {
        for key in [TOKENS_KEY, USER_ID_KEY] {
            if let Err(e) = self.backend.remove(key) {
                warn!(key = key, error = %e, "Failed to remove stored credential");
            }
        }
    }

    pub fn has_session(&self) -> bool {
        self.load().is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        self.load().map(|t| t.access)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.load().map(|t| t.refresh)
    }

    /// Claims of the stored access token
    pub fn current_claims(&self) -> Option<TokenClaims> {
        let tokens = self.load()?;
        match decode_claims(&tokens.access) {
            Ok(claims) => Some(claims),
            Err(e) => {
                debug!(error = %e, "Stored access token could not be decoded");
                None
            }
        }
    }

    pub fn current_user_id(&self) -> Option<String> {
        self.current_claims().map(|c| c.user_id)
    }
}
