// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator identity and loose flag parsing for guarded routes.

use axum::http::HeaderMap;
use serde_json::Value;

pub const OPERATOR_HEADER: &str = "x-operator-id";

/// Operator identity: body `operator`, then the `operator` query parameter,
/// then the `x-operator-id` header. Blank values are skipped.
pub fn resolve_operator(
    body: Option<&Value>,
    query: Option<&str>,
    headers: &HeaderMap,
) -> Option<String> {
    let from_body = body
        .and_then(|b| b.get("operator"))
        .and_then(Value::as_str);
    let from_header = headers
        .get(OPERATOR_HEADER)
        .and_then(|v| v.to_str().ok());

    [from_body, query, from_header]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Accepts JSON booleans and the strings "1", "true", "yes".
pub fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => text_flag(Some(s)),
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

pub fn text_flag(value: Option<&str>) -> bool {
    value.is_some_and(|s| {
        matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        )
    })
}

/// Trimmed, non-empty string field of a JSON body.
pub fn str_field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
