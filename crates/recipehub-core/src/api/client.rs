//! API client for the RecipeHub REST API.
//!
//! This module provides the `ApiClient` struct for the authentication
//! endpoints and for raw requests that the session layer decorates with
//! the bearer token.

use std::sync::Arc;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::transport::{HttpRequest, HttpResponse, HttpTransport};
use super::ApiError;
use crate::models::{LoginRequest, SignupRequest, TokenPair};

// ============================================================================
// Endpoints
// ============================================================================

/// Obtain a token pair from email and password
pub const TOKEN_PATH: &str = "/api/auth/token/";

/// Exchange a refresh token for a new pair
pub const TOKEN_REFRESH_PATH: &str = "/api/auth/token/refresh/";

/// Create a user account
pub const USER_LIST_PATH: &str = "/api/user/list/";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access: Option<String>,
    refresh: Option<String>,
}

impl TokenResponse {
    fn into_pair(self) -> Option<TokenPair> {
        match (self.access, self.refresh) {
            (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
                Some(TokenPair { access, refresh })
            }
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// Pull a human readable message out of an error body (`detail` or `message`)
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["detail", "message"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

/// API client for RecipeHub.
/// Clone is cheap - the transport is shared behind an Arc.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            transport,
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an endpoint. Paths starting with `/` are joined to
    /// the base URL; anything else is taken as already absolute.
    pub fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            endpoint.to_string()
        }
    }

    /// Perform a request, returning the response whatever its status.
    ///
    /// The JSON content type is always set; the bearer header only when a
    /// token is given.
    pub async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
        bearer: Option<&str>,
    ) -> Result<HttpResponse, ApiError> {
        self.send_with_headers(method, endpoint, body, HeaderMap::new(), bearer)
            .await
    }

    /// `send` with caller headers merged in.
    ///
    /// Caller headers replace the default `Content-Type`. `Authorization` is
    /// set last, so a bearer always wins over one in `headers`. A token that
    /// cannot be carried in a header is left off and logged.
    pub async fn send_with_headers(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
        headers: HeaderMap,
        bearer: Option<&str>,
    ) -> Result<HttpResponse, ApiError> {
        let mut request = HttpRequest::new(method, self.url(endpoint));
        request.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        request.headers.extend(headers);
        if let Some(token) = bearer {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(value) => {
                    request.headers.insert(header::AUTHORIZATION, value);
                }
                Err(_) => warn!("Stored access token is not a valid header value, sending without it"),
            }
        }
        if let Some(body) = body {
            request.body = Some(body.to_string());
        }

        Ok(self.transport.send(request).await?)
    }

    async fn post_json<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<HttpResponse, ApiError> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to encode request: {}", e)))?;
        self.send(Method::POST, endpoint, Some(&body), None).await
    }

    /// Log in with email and password
    pub async fn obtain_token(&self, login: &LoginRequest) -> Result<TokenPair, ApiError> {
        let response = self.post_json(TOKEN_PATH, login).await?;

        if !response.is_success() {
            let message = error_message(&response.body);
            debug!(status = %response.status, "Login rejected");
            return Err(match response.status.as_u16() {
                400 | 401 => ApiError::InvalidCredentials(
                    message.unwrap_or_else(|| "Please check your credentials".to_string()),
                ),
                _ => ApiError::from_status(response.status, message.as_deref().unwrap_or(&response.body)),
            });
        }

        response
            .json::<TokenResponse>()
            .ok()
            .and_then(TokenResponse::into_pair)
            .ok_or_else(|| {
                ApiError::InvalidResponse("Access or refresh token missing in the response".into())
            })
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// A 401 comes back as `ApiError::Unauthorized`: the refresh token itself
    /// is no longer valid.
    pub async fn refresh_token(&self, refresh: &str) -> Result<TokenPair, ApiError> {
        let response = self
            .post_json(TOKEN_REFRESH_PATH, &RefreshRequest { refresh })
            .await?;

        if !response.is_success() {
            return Err(ApiError::from_status(response.status, &response.body));
        }

        response
            .json::<TokenResponse>()
            .ok()
            .and_then(TokenResponse::into_pair)
            .ok_or_else(|| {
                ApiError::InvalidResponse("Refresh response did not carry a token pair".into())
            })
    }

    /// Create an account, returning the created user record
    pub async fn register(&self, signup: &SignupRequest) -> Result<serde_json::Value, ApiError> {
        let response = self.post_json(USER_LIST_PATH, signup).await?;

        if !response.is_success() {
            let message = error_message(&response.body).unwrap_or(response.body);
            return Err(ApiError::from_status(response.status, &message));
        }

        response
            .json()
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse user record: {}", e)))
    }
}
