// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer token authentication for the gateway.
//!
//! When a token is configured, every `/api` route requires
//! `Authorization: Bearer <token>`. The websocket handshake accepts the same
//! header or a `?token=` query parameter. Without a configured token the
//! gateway is open; configuration validation only allows that on loopback.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

/// Authentication configuration for the gateway.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// Expected bearer token. `None` disables authentication.
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

impl AuthConfig {
    pub fn new(bearer_token: Option<String>) -> Self {
        Self {
            bearer_token: bearer_token.filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.bearer_token.is_some()
    }

    /// True when auth is disabled or `presented` equals the configured token.
    pub fn accepts(&self, presented: Option<&str>) -> bool {
        match (&self.bearer_token, presented) {
            (None, _) => true,
            (Some(expected), Some(token)) => constant_time_eq(expected, token),
            (Some(_), None) => false,
        }
    }
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Compares digests so the running time does not depend on where the
/// inputs first differ.
fn constant_time_eq(expected: &str, presented: &str) -> bool {
    let a = Sha256::digest(expected.as_bytes());
    let b = Sha256::digest(presented.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Middleware rejecting requests without the configured bearer token.
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if auth.accepts(bearer_from_headers(request.headers())) {
        return Ok(next.run(request).await);
    }
    tracing::debug!(path = %request.uri().path(), "rejected request without valid bearer token");
    Err(StatusCode::UNAUTHORIZED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_auth_accepts_anything() {
        let auth = AuthConfig::new(None);
        assert!(!auth.is_enabled());
        assert!(auth.accepts(None));
        assert!(auth.accepts(Some("whatever")));
    }

    #[test]
    fn blank_token_disables_auth() {
        assert!(!AuthConfig::new(Some("  ".into())).is_enabled());
    }

    #[test]
    fn token_must_match_exactly() {
        let auth = AuthConfig::new(Some("secret-token".into()));
        assert!(auth.accepts(Some("secret-token")));
        assert!(!auth.accepts(Some("secret-toke")));
        assert!(!auth.accepts(Some("")));
        assert!(!auth.accepts(None));
    }

    #[test]
    fn bearer_header_is_parsed() {
        let mut headers = HeaderMap::new();
        assert!(bearer_from_headers(&headers).is_none());
        headers.insert("authorization", "Bearer abc".parse().unwrap());
        assert_eq!(bearer_from_headers(&headers), Some("abc"));
        headers.insert("authorization", "Basic abc".parse().unwrap());
        assert!(bearer_from_headers(&headers).is_none());
    }

    #[test]
    fn debug_redacts_token() {
        let auth = AuthConfig::new(Some("secret-token".into()));
        let out = format!("{auth:?}");
        assert!(!out.contains("secret-token"));
        assert!(out.contains("[redacted]"));
    }
}
