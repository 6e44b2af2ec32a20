// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping of engine errors to JSON responses.
//!
//! Every error body has the shape
//! `{"error": "...", "code": "...", "hint"?: "...", "owner"?: "...", "assignment"?: {...}}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use herald_core::{HeraldError, OwnershipRecord, StorageFailure};

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment: Option<OwnershipRecord>,
}

/// Handler error wrapper so `?` works on [`HeraldError`] inside handlers.
#[derive(Debug)]
pub struct ApiError(pub HeraldError);

impl From<HeraldError> for ApiError {
    fn from(err: HeraldError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self(HeraldError::validation(code, message))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = err.code();

        let body = match err {
            HeraldError::Conflict {
                message,
                owner,
                record,
                ..
            } => ErrorResponse {
                error: message,
                code,
                hint: None,
                owner: Some(owner),
                assignment: Some(*record),
            },
            HeraldError::Storage { source } => {
                let message = source.to_string();
                tracing::error!(error = %message, "record store failure");
                let failure = StorageFailure::classify(&message);
                ErrorResponse {
                    error: match failure {
                        Some(_) => format!("storage error: {message}"),
                        None => "storage error".to_string(),
                    },
                    code,
                    hint: failure.map(StorageFailure::hint),
                    owner: None,
                    assignment: None,
                }
            }
            HeraldError::Internal(message) | HeraldError::Config(message) => {
                tracing::error!(error = %message, "unexpected error");
                ErrorResponse {
                    error: "unexpected error".to_string(),
                    code,
                    hint: None,
                    owner: None,
                    assignment: None,
                }
            }
            other => ErrorResponse {
                error: other.to_string(),
                code,
                hint: None,
                owner: None,
                assignment: None,
            },
        };

        (status, Json(body)).into_response()
    }
}
