use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::token::decode_claims;
use super::CredentialStore;
use crate::api::{ApiClient, ApiError, HttpResponse};
use crate::models::{LoginRequest, SignupRequest, TokenClaims, TokenPair};

/// Seconds between token refresh attempts.
/// Short enough to beat access token expiry, long enough not to hammer the server.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30;

/// What a single refresh attempt did to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new pair was stored
    Refreshed,
    /// The refresh token was rejected; the session is gone
    Terminated,
    /// Network or server trouble; the old pair is kept for the next tick
    Transient,
    /// Nothing stored to refresh
    NoSession,
}

/// Who is signed in, as read from the access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionInfo {
    fn from_claims(claims: Option<TokenClaims>) -> Self {
        match claims {
            Some(claims) => Self {
                expires_at: claims.expires_at(),
                user_id: Some(claims.user_id),
                username: claims.username,
            },
            None => Self {
                user_id: None,
                username: None,
                expires_at: None,
            },
        }
    }

    fn from_tokens(tokens: &TokenPair) -> Self {
        Self::from_claims(decode_claims(&tokens.access).ok())
    }
}

struct Inner {
    api: ApiClient,
    credentials: CredentialStore,
    refresh_interval: Duration,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let task = self
            .refresh_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }
}

/// Owns the authentication session: login/logout, the background token
/// refresh loop, and bearer-decorated API calls.
///
/// Build one per process and share it; clones refer to the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// A zero `refresh_interval` falls back to the default.
    pub fn new(api: ApiClient, credentials: CredentialStore, refresh_interval: Duration) -> Self {
        let refresh_interval = if refresh_interval.is_zero() {
            warn!("Refresh interval of zero, using {}s", DEFAULT_REFRESH_INTERVAL_SECS);
            Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS)
        } else {
            refresh_interval
        };
        Self {
            inner: Arc::new(Inner {
                api,
                credentials,
                refresh_interval,
                refresh_task: Mutex::new(None),
            }),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    pub fn refresh_interval(&self) -> Duration {
        self.inner.refresh_interval
    }

    // ===== Session lifecycle =====

    /// Log in, store the pair and start the refresh loop
    pub async fn login(&self, login: &LoginRequest) -> Result<SessionInfo, ApiError> {
        login.validate()?;

        let tokens = self.inner.api.obtain_token(login).await?;
        self.inner.credentials.save(&tokens);
        let session = SessionInfo::from_tokens(&tokens);
        info!(user_id = ?session.user_id, username = ?session.username, "Logged in");

        self.start_refresh();
        Ok(session)
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, signup: &SignupRequest) -> Result<serde_json::Value, ApiError> {
        signup.validate()?;
        let user = self.inner.api.register(signup).await?;
        info!(username = %signup.username, "Account created");
        Ok(user)
    }

    /// End the session. Safe to call when already logged out.
    pub fn logout(&self) {
        self.teardown();
        info!("Logged out");
    }

    /// Pick up a session stored by an earlier run and keep it fresh
    pub fn resume(&self) -> Option<SessionInfo> {
        let tokens = self.inner.credentials.load()?;
        self.start_refresh();
        Some(SessionInfo::from_tokens(&tokens))
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.credentials.has_session()
    }

    pub fn current_user(&self) -> Option<SessionInfo> {
        self.inner.credentials.load().map(|t| SessionInfo::from_tokens(&t))
    }

    pub fn current_user_id(&self) -> Option<String> {
        self.inner.credentials.current_user_id()
    }

    fn teardown(&self) {
        self.inner.credentials.clear();
        self.stop_refresh();
    }

    // ===== Refresh loop =====

    fn refresh_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.inner
            .refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the refresh loop. Returns whether a new loop was spawned.
    ///
    /// Does nothing if a loop is already running, if no session is stored,
    /// or if there is no Tokio runtime to run on.
    pub fn start_refresh(&self) -> bool {
        let mut task = self.refresh_task();
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("Refresh loop already running");
            return false;
        }
        if !self.inner.credentials.has_session() {
            debug!("No stored session, not starting refresh loop");
            return false;
        }
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "No async runtime, token refresh disabled");
                return false;
            }
        };

        let period = self.inner.refresh_interval;
        *task = Some(runtime.spawn(refresh_loop(Arc::downgrade(&self.inner), period)));
        info!(interval_secs = period.as_secs(), "Token refresh loop started");
        true
    }

    /// Cancel future refresh ticks. Safe to call when nothing is running.
    pub fn stop_refresh(&self) {
        if let Some(handle) = self.refresh_task().take() {
            handle.abort();
            debug!("Token refresh loop stopped");
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh_task()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// One refresh attempt: the body of every loop tick.
    ///
    /// Only an explicit rejection of the refresh token ends the session;
    /// every other failure leaves the pair in place for the next tick.
    pub async fn refresh_now(&self) -> RefreshOutcome {
        let Some(refresh) = self.inner.credentials.refresh_token() else {
            debug!("No refresh token stored");
            self.stop_refresh();
            return RefreshOutcome::NoSession;
        };

        match self.inner.api.refresh_token(&refresh).await {
            Ok(tokens) => {
                self.inner.credentials.save(&tokens);
                debug!(user_id = ?self.inner.credentials.current_user_id(), "Token pair refreshed");
                RefreshOutcome::Refreshed
            }
            Err(e) if e.is_auth_failure() => {
                info!("Refresh token expired, ending session");
                self.teardown();
                RefreshOutcome::Terminated
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, will retry");
                RefreshOutcome::Transient
            }
        }
    }

    // ===== Authenticated requests =====

    /// Send a request with the current bearer token attached.
    ///
    /// With no stored session the request goes out without an
    /// `Authorization` header. A 401 answer ends the session and comes back
    /// as `ApiError::Unauthorized`; any other status is returned as is.
    pub async fn call(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<HttpResponse, ApiError> {
        self.call_with_headers(method, endpoint, body, HeaderMap::new())
            .await
    }

    /// `call` with extra request headers. They may replace the default
    /// `Content-Type`. A stored bearer replaces any caller `Authorization`.
    pub async fn call_with_headers(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
        headers: HeaderMap,
    ) -> Result<HttpResponse, ApiError> {
        let access = self.inner.credentials.access_token();
        let response = self
            .inner
            .api
            .send_with_headers(method, endpoint, body, headers, access.as_deref())
            .await?;

        if response.status == StatusCode::UNAUTHORIZED {
            info!(endpoint = endpoint, "Request rejected as unauthenticated, ending session");
            self.teardown();
            return Err(ApiError::Unauthorized);
        }
        Ok(response)
    }

    /// `call`, then require a 2xx and parse the body
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, ApiError> {
        let response = self.call(method, endpoint, body).await?;
        if !response.is_success() {
            return Err(ApiError::from_status(response.status, &response.body));
        }
        response.json().map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", endpoint, e))
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.call_json(Method::GET, endpoint, None).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to encode request: {}", e)))?;
        self.call_json(Method::POST, endpoint, Some(&body)).await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<(), ApiError> {
        let response = self.call(Method::DELETE, endpoint, None).await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(ApiError::from_status(response.status, &response.body))
        }
    }
}

async fn refresh_loop(inner: Weak<Inner>, period: Duration) {
    let mut ticks = interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;
        let Some(inner) = inner.upgrade() else {
            debug!("Session manager dropped, refresh loop exiting");
            return;
        };
        let session = SessionManager { inner };
        match session.refresh_now().await {
            RefreshOutcome::Refreshed | RefreshOutcome::Transient => {}
            RefreshOutcome::Terminated | RefreshOutcome::NoSession => return,
        }
    }
}
