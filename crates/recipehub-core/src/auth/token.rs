//! Access token payload decoding.
//!
//! Tokens are three dot-separated segments; the second is base64url JSON
//! carrying at least `user_id`. The signature is not checked here: the
//! client only reads its own claims, the server does the verifying.

use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;
use thiserror::Error;

use crate::models::TokenClaims;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid token format: expected 3 segments, found {0}")]
    SegmentCount(usize),

    #[error("Token payload is not valid base64")]
    Base64,

    #[error("Token payload is not valid UTF-8")]
    Utf8,

    #[error("Token payload is not valid JSON")]
    Json,

    #[error("Token payload is not a JSON object")]
    NotAnObject,

    #[error("Token payload has no usable user_id claim")]
    MissingUserId,
}

/// Decode the claims embedded in an access token.
pub fn decode_claims(token: &str) -> Result<TokenClaims, TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(TokenError::SegmentCount(segments.len()));
    }

    let payload = segments[1].trim_end_matches('=');
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| general_purpose::STANDARD_NO_PAD.decode(payload))
        .map_err(|_| TokenError::Base64)?;
    let text = String::from_utf8(bytes).map_err(|_| TokenError::Utf8)?;
    let value: Value = serde_json::from_str(&text).map_err(|_| TokenError::Json)?;
    let claims = value.as_object().ok_or(TokenError::NotAnObject)?;

    let user_id = match claims.get("user_id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(TokenError::MissingUserId),
    };

    Ok(TokenClaims {
        user_id,
        username: claims
            .get("username")
            .and_then(Value::as_str)
            .map(str::to_string),
        exp: claims.get("exp").and_then(Value::as_i64),
    })
}

#[cfg(test)]
pub(crate) fn encode_test_token(payload: &Value) -> String {
    let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.signature", header, body)
}
