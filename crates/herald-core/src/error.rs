// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Herald delivery engine.

use thiserror::Error;

use crate::ownership::OwnershipRecord;

/// The primary error type used across the record store contract and engine operations.
#[derive(Debug, Error)]
pub enum HeraldError {
    /// Missing or malformed input (phone, text, id, operator).
    #[error("{message}")]
    Validation { code: &'static str, message: String },

    /// The conversation is held by another operator. Carries the current owner.
    #[error("{message}")]
    Conflict {
        code: &'static str,
        message: String,
        owner: String,
        record: Box<OwnershipRecord>,
    },

    /// Ownership is required but absent or held by someone else.
    #[error("{message}")]
    Forbidden { code: &'static str, message: String },

    /// Unknown job, campaign, or assignment.
    #[error("{message}")]
    NotFound { code: &'static str, message: String },

    /// Record store failure (connection, query, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HeraldError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        Self::Forbidden {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound {
            code,
            message: message.into(),
        }
    }

    /// Wraps any error (or message) as a storage failure.
    pub fn storage<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Storage { source: err.into() }
    }

    /// Machine-readable error code surfaced to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { code, .. }
            | Self::Conflict { code, .. }
            | Self::Forbidden { code, .. }
            | Self::NotFound { code, .. } => code,
            Self::Storage { source } => StorageFailure::classify(&source.to_string())
                .map(StorageFailure::code)
                .unwrap_or("STORAGE_ERROR"),
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "UNKNOWN_ERROR",
        }
    }

    /// HTTP status code matching the error class.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::Storage { .. } | Self::Config(_) | Self::Internal(_) => 500,
        }
    }
}

/// Recognized record store failure conditions that have an actionable fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageFailure {
    PermissionDenied,
    MissingTable,
    InvalidCredentials,
}

impl StorageFailure {
    /// Classifies a raw store error message. Returns `None` for unrecognized failures.
    pub fn classify(message: &str) -> Option<Self> {
        let lower = message.to_lowercase();
        if lower.contains("permission denied")
            || lower.contains("readonly database")
            || lower.contains("unable to open database")
        {
            Some(Self::PermissionDenied)
        } else if lower.contains("no such table") || lower.contains("could not find the table") {
            Some(Self::MissingTable)
        } else if lower.contains("invalid api key")
            || lower.contains("file is not a database")
            || lower.contains("not authorized")
        {
            Some(Self::InvalidCredentials)
        } else {
            None
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::PermissionDenied => "STORAGE_PERMISSION_DENIED",
            Self::MissingTable => "STORAGE_TABLE_NOT_FOUND",
            Self::InvalidCredentials => "STORAGE_INVALID_CREDENTIALS",
        }
    }

    /// Operator-facing remediation hint.
    pub fn hint(self) -> &'static str {
        match self {
            Self::PermissionDenied => {
                "the database file is not writable; check storage.database_path ownership and permissions"
            }
            Self::MissingTable => {
                "the database schema is missing; restart the server so migrations can run"
            }
            Self::InvalidCredentials => {
                "the database could not be opened with the configured credentials or is not a SQLite file"
            }
        }
    }
}
