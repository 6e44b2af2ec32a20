// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.

pub mod campaigns;
pub mod conversations;
pub mod messages;

use axum::{Json, body::Bytes, extract::State};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::ApiError;
use crate::server::AppState;

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// GET /health: liveness probe, no auth.
pub async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    })
}

/// Parses a JSON request body. An empty body reads as `{}`.
pub(crate) fn parse_body<T: DeserializeOwned>(bytes: &Bytes) -> Result<T, ApiError> {
    let raw: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        bytes
    };
    serde_json::from_slice(raw)
        .map_err(|e| ApiError::validation("INVALID_BODY", format!("invalid JSON body: {e}")))
}

/// Like [`parse_body`] but keeps the loose JSON value.
pub(crate) fn parse_value(bytes: &Bytes) -> Result<Value, ApiError> {
    let value: Value = parse_body(bytes)?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(ApiError::validation(
            "INVALID_BODY",
            "request body must be a JSON object",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_reads_as_object() {
        let value = parse_value(&Bytes::new()).unwrap();
        assert!(value.as_object().unwrap().is_empty());
        let value = parse_value(&Bytes::from_static(b"  \n")).unwrap();
        assert!(value.is_object());
    }

    #[test]
    fn malformed_body_is_rejected() {
        let err = parse_value(&Bytes::from_static(b"{oops")).unwrap_err();
        assert_eq!(err.0.code(), "INVALID_BODY");
        let err = parse_value(&Bytes::from_static(b"[1,2]")).unwrap_err();
        assert_eq!(err.0.code(), "INVALID_BODY");
    }
}
