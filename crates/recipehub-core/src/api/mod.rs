//! REST API client module for RecipeHub services.
//!
//! This module provides the `ApiClient` for the authentication endpoints,
//! the `HttpTransport` seam it sends through, and a connection probe for
//! the endpoints the front end relies on.
//!
//! The API uses JWT bearer tokens obtained from `/api/auth/token/` and
//! renewed through `/api/auth/token/refresh/`.

pub mod client;
pub mod error;
pub mod probe;
pub mod transport;

pub use client::ApiClient;
pub use error::ApiError;
pub use probe::{default_checks, run_checks, EndpointCheck, ProbeReport, ProbeResult};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
