#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use serde_json::{json, Value};

use recipehub_core::api::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use recipehub_core::storage::MemoryStore;
use recipehub_core::{ApiClient, CredentialStore, SessionManager, TokenPair};

pub const BASE_URL: &str = "http://api.test";
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

type Responder = Box<dyn FnMut(&HttpRequest) -> Result<HttpResponse, TransportError> + Send>;

/// Transport that answers from a closure and records every request
pub struct FakeTransport {
    responder: Mutex<Responder>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: FnMut(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + 'static,
    {
        Arc::new(Self {
            responder: Mutex::new(Box::new(responder)),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Replace the responder mid-test
    pub fn respond_with<F>(&self, responder: F)
    where
        F: FnMut(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + 'static,
    {
        *self.responder.lock().unwrap() = Box::new(responder);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        let url = format!("{}{}", BASE_URL, path);
        self.requests().into_iter().filter(|r| r.url == url).collect()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut respond = self.responder.lock().unwrap();
        (*respond)(&request)
    }
}

pub fn ok_json(body: Value) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse::new(StatusCode::OK, body.to_string()))
}

pub fn status(code: u16, body: &str) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse::new(StatusCode::from_u16(code).unwrap(), body))
}

pub fn offline() -> Result<HttpResponse, TransportError> {
    Err(TransportError::Connect("connection refused".into()))
}

/// Unsigned token whose payload is `claims`
pub fn make_jwt(claims: Value) -> String {
    let header = general_purpose::URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.sig", header, payload)
}

pub fn jwt_for(user_id: u64) -> String {
    make_jwt(json!({"user_id": user_id, "username": format!("user{}", user_id)}))
}

pub fn path_of(request: &HttpRequest) -> &str {
    request.url.strip_prefix(BASE_URL).unwrap_or(&request.url)
}

pub fn body_of(request: &HttpRequest) -> Value {
    serde_json::from_str(request.body.as_deref().unwrap_or("null")).unwrap()
}

pub struct Harness {
    pub transport: Arc<FakeTransport>,
    pub storage: Arc<MemoryStore>,
    pub session: SessionManager,
}

impl Harness {
    pub fn new(transport: Arc<FakeTransport>) -> Self {
        let storage = Arc::new(MemoryStore::new());
        let api = ApiClient::new(transport.clone(), BASE_URL);
        let credentials = CredentialStore::new(storage.clone());
        let session = SessionManager::new(api, credentials, REFRESH_INTERVAL);
        Self {
            transport,
            storage,
            session,
        }
    }

    /// Harness with a session already stored (loop not started)
    pub fn logged_in(transport: Arc<FakeTransport>, tokens: TokenPair) -> Self {
        let harness = Self::new(transport);
        harness.session.credentials().save(&tokens);
        harness
    }

    pub fn stored(&self) -> Option<TokenPair> {
        self.session.credentials().load()
    }
}
