// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `/api/messages/conversations` handlers: inbox listing and the operator
//! ownership lock.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use serde_json::{Value, json};

use herald_core::MessageJob;
use herald_engine::{ConversationFilter, ConversationSummary, HistorySyncReport, HistorySyncRequest};

use super::parse_value;
use crate::error::ApiError;
use crate::operator::{flag, resolve_operator, str_field, text_flag};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationListQuery {
    pub search: Option<String>,
    pub only_with_replies: Option<String>,
    pub only_assigned: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OperatorQuery {
    pub operator: Option<String>,
    pub limit: Option<usize>,
}

fn require_operator(
    body: Option<&Value>,
    query: &OperatorQuery,
    headers: &HeaderMap,
) -> Result<String, ApiError> {
    resolve_operator(body, query.operator.as_deref(), headers)
        .ok_or_else(|| ApiError::validation("OPERATOR_REQUIRED", "operator is required"))
}

/// GET /api/messages/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ConversationListQuery>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let list = state
        .engine
        .conversations
        .list(ConversationFilter {
            search: query.search,
            only_with_replies: text_flag(query.only_with_replies.as_deref()),
            only_assigned: text_flag(query.only_assigned.as_deref()),
            limit: query.limit,
        })
        .await?;
    Ok(Json(list))
}

/// PUT /api/messages/conversations/{phone}/assign
///
/// 201 when a new record was opened, 200 when an existing one changed hands.
pub async fn assign(
    State(state): State<AppState>,
    Path(phone): Path<String>,
    Query(query): Query<OperatorQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let body = parse_value(&body)?;
    let operator = require_operator(Some(&body), &query, &headers)?;
    let assignment = state
        .engine
        .ownership
        .assign(
            &phone,
            &operator,
            str_field(&body, "assignedBy"),
            str_field(&body, "campaignId"),
            flag(body.get("force")),
        )
        .await?;

    let status = if assignment.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(json!({ "assignment": assignment.record }))))
}

/// POST /api/messages/conversations/{phone}/release
pub async fn release(
    State(state): State<AppState>,
    Path(phone): Path<String>,
    Query(query): Query<OperatorQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let body = parse_value(&body)?;
    let operator = require_operator(Some(&body), &query, &headers)?;
    let record = state
        .engine
        .ownership
        .release(&phone, &operator, flag(body.get("force")))
        .await?;
    Ok(Json(json!({ "assignment": record })))
}

/// GET /api/messages/conversations/{phone}/history: owner only.
pub async fn history(
    State(state): State<AppState>,
    Path(phone): Path<String>,
    Query(query): Query<OperatorQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Vec<MessageJob>>, ApiError> {
    let body = parse_value(&body)?;
    let operator = require_operator(Some(&body), &query, &headers)?;
    let messages = state
        .engine
        .ownership
        .history(&phone, &operator, query.limit)
        .await?;
    Ok(Json(messages))
}

/// POST /api/messages/conversations/{phone}/history/sync: owner only.
pub async fn sync_history(
    State(state): State<AppState>,
    Path(phone): Path<String>,
    Query(query): Query<OperatorQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<HistorySyncReport>, ApiError> {
    let body = parse_value(&body)?;
    let operator = require_operator(Some(&body), &query, &headers)?;
    let request: HistorySyncRequest = serde_json::from_value(body).map_err(|e| {
        ApiError::validation("INVALID_BODY", format!("invalid history payload: {e}"))
    })?;
    let report = state
        .engine
        .reconciler
        .sync_history(&phone, &operator, request)
        .await?;
    Ok(Json(report))
}
