//! Backend connection verification.
//!
//! Hits a fixed set of RecipeHub endpoints and reports which ones answer.
//! Probing is read-only with respect to the session: a 401 here is just a
//! failed check, it never logs the user out.

use std::fmt;

use futures::future::join_all;
use reqwest::Method;
use serde::Serialize;

use super::ApiClient;
use crate::auth::CredentialStore;

#[derive(Debug, Clone)]
pub struct EndpointCheck {
    pub name: &'static str,
    pub path: &'static str,
    pub method: Method,
    pub requires_auth: bool,
}

impl EndpointCheck {
    pub const fn get(name: &'static str, path: &'static str) -> Self {
        Self {
            name,
            path,
            method: Method::GET,
            requires_auth: false,
        }
    }

    pub fn with_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }
}

/// The endpoints the web front end depends on
pub fn default_checks() -> Vec<EndpointCheck> {
    vec![
        EndpointCheck::get("User Registration", "/api/user/list/"),
        EndpointCheck::get("User Profile", "/api/chat/profile/").with_auth(),
        EndpointCheck::get("Recipe Posts", "/api/kitchen/post/"),
        EndpointCheck::get("Comments", "/api/comment/list/"),
        EndpointCheck::get("Reactions", "/api/comment/react/list/"),
        EndpointCheck::get("Chat Groups", "/api/chat/group/").with_auth(),
        EndpointCheck::get("Podcasts", "/api/podcast/list/"),
    ]
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub name: String,
    pub url: String,
    /// `None` when no response was received at all
    pub status: Option<u16>,
    pub ok: bool,
    /// Array length, or key count for an object body
    pub item_count: Option<usize>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProbeReport {
    pub results: Vec<ProbeResult>,
}

impl ProbeReport {
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.ok).count()
    }

    pub fn failure_count(&self) -> usize {
        self.results.len() - self.success_count()
    }

    /// Rounded success percentage; 0 for an empty report
    pub fn success_rate(&self) -> u32 {
        if self.results.is_empty() {
            return 0;
        }
        ((self.success_count() as f64 / self.results.len() as f64) * 100.0).round() as u32
    }
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Backend Connection Report")?;
        writeln!(f, "{}", "=".repeat(50))?;
        for result in &self.results {
            let mark = if result.ok { "OK  " } else { "FAIL" };
            let status = result
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "ERROR".to_string());
            let items = result
                .item_count
                .map(|n| format!(" ({} items)", n))
                .unwrap_or_default();
            writeln!(f, "{} {}: {}{}", mark, result.name, status, items)?;
            if let Some(ref error) = result.error {
                writeln!(f, "     Error: {}", error)?;
            }
        }
        writeln!(f, "{}", "=".repeat(50))?;
        let total = self.results.len();
        writeln!(f, "Successful: {}/{}", self.success_count(), total)?;
        writeln!(f, "Failed: {}/{}", self.failure_count(), total)?;
        write!(f, "Success Rate: {}%", self.success_rate())
    }
}

fn count_items(body: &str) -> Option<usize> {
    match serde_json::from_str::<serde_json::Value>(body).ok()? {
        serde_json::Value::Array(items) => Some(items.len()),
        serde_json::Value::Object(map) => Some(map.len()),
        _ => None,
    }
}

async fn run_check(api: &ApiClient, bearer: Option<&str>, check: &EndpointCheck) -> ProbeResult {
    let url = api.url(check.path);
    let bearer = if check.requires_auth { bearer } else { None };

    match api.send(check.method.clone(), check.path, None, bearer).await {
        Ok(response) => {
            let ok = response.is_success();
            ProbeResult {
                name: check.name.to_string(),
                url,
                status: Some(response.status.as_u16()),
                ok,
                item_count: if ok { count_items(&response.body) } else { None },
                error: if ok {
                    None
                } else {
                    Some(
                        response
                            .status
                            .canonical_reason()
                            .unwrap_or("Unknown status")
                            .to_string(),
                    )
                },
            }
        }
        Err(e) => ProbeResult {
            name: check.name.to_string(),
            url,
            status: None,
            ok: false,
            item_count: None,
            error: Some(e.to_string()),
        },
    }
}

/// Run every check concurrently; results keep the order of `checks`
pub async fn run_checks(
    api: &ApiClient,
    credentials: &CredentialStore,
    checks: &[EndpointCheck],
) -> ProbeReport {
    let access = credentials.access_token();
    let futures = checks
        .iter()
        .map(|check| run_check(api, access.as_deref(), check));
    ProbeReport {
        results: join_all(futures).await,
    }
}
