// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `/api/messages` handlers: queue consumer, status updates, edits, and
//! capture of messages seen in the chat client.

use std::str::FromStr;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};

use herald_core::{Direction, JobStatus, MessageJob};
use herald_engine::{CaptureOutcome, CaptureRequest, JobAudit, MessageEdits, MessageFilter};

use super::{parse_body, parse_value};
use crate::error::ApiError;
use crate::operator::str_field;
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextJobQuery {
    pub campaign_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageListQuery {
    pub status: Option<String>,
    pub direction: Option<String>,
    pub campaign_id: Option<String>,
    pub phone: Option<String>,
    pub limit: Option<usize>,
}

/// Case-insensitive parse of one of the four job statuses. Anything else is
/// a 400 with code `INVALID_STATUS`.
fn parse_job_status(raw: &str) -> Result<JobStatus, ApiError> {
    JobStatus::from_str(&raw.trim().to_ascii_lowercase()).map_err(|_| {
        ApiError::validation(
            "INVALID_STATUS",
            format!("unknown status '{raw}', expected pending, processing, sent or failed"),
        )
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// GET /api/messages
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<Vec<MessageJob>>, ApiError> {
    let status = non_blank(query.status)
        .as_deref()
        .map(parse_job_status)
        .transpose()?;
    let direction = non_blank(query.direction)
        .as_deref()
        .map(|d| {
            Direction::from_str(&d.to_ascii_lowercase()).map_err(|_| {
                ApiError::validation(
                    "INVALID_DIRECTION",
                    format!("unknown direction '{d}', expected inbound or outbound"),
                )
            })
        })
        .transpose()?;

    let messages = state
        .engine
        .queue
        .list_messages(MessageFilter {
            status,
            direction,
            campaign_id: non_blank(query.campaign_id),
            phone: non_blank(query.phone),
            limit: query.limit,
        })
        .await?;
    Ok(Json(messages))
}

/// GET /api/messages/next: `{job: ClaimedJob | null}`
pub async fn next_job(
    State(state): State<AppState>,
    Query(query): Query<NextJobQuery>,
) -> Result<Json<Value>, ApiError> {
    let job = state
        .engine
        .queue
        .claim_next_job(query.campaign_id.as_deref())
        .await?;
    Ok(Json(json!({ "job": job })))
}

async fn apply_status(state: &AppState, id: &str, body: &Value) -> Result<MessageJob, ApiError> {
    let raw = str_field(body, "status")
        .ok_or_else(|| ApiError::validation("STATUS_REQUIRED", "status is required"))?;
    let status = parse_job_status(raw)?;
    let error = str_field(body, "error").map(str::to_string);
    Ok(state.engine.queue.set_job_status(id, status, error).await?)
}

/// PUT /api/messages/{id}/status
pub async fn put_job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<MessageJob>, ApiError> {
    let body = parse_value(&body)?;
    Ok(Json(apply_status(&state, &id, &body).await?))
}

/// POST /api/messages/status: id travels in the body.
pub async fn post_job_status(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MessageJob>, ApiError> {
    let body = parse_value(&body)?;
    let id = str_field(&body, "id").unwrap_or_default().to_string();
    Ok(Json(apply_status(&state, &id, &body).await?))
}

/// GET /api/messages/{id}/audit
pub async fn get_audit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobAudit>, ApiError> {
    Ok(Json(state.engine.queue.job_audit(&id).await?))
}

/// PATCH /api/messages/{id}
pub async fn edit_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<MessageJob>, ApiError> {
    let edits: MessageEdits = parse_body(&body)?;
    Ok(Json(state.engine.queue.edit_job(&id, edits).await?))
}

/// POST /api/messages/{id}/retry
pub async fn retry_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<MessageJob>, ApiError> {
    let edits: MessageEdits = parse_body(&body)?;
    Ok(Json(state.engine.queue.retry_job(&id, edits).await?))
}

/// 201 stored, 200 duplicate, 202 ignored.
fn capture_response(outcome: CaptureOutcome) -> Response {
    match outcome {
        CaptureOutcome::Stored(message) => (
            StatusCode::CREATED,
            Json(json!({ "duplicate": false, "message": message })),
        )
            .into_response(),
        CaptureOutcome::Duplicate(message) => (
            StatusCode::OK,
            Json(json!({ "duplicate": true, "message": message })),
        )
            .into_response(),
        CaptureOutcome::Ignored { reason } => (
            StatusCode::ACCEPTED,
            Json(json!({ "ignored": true, "reason": reason })),
        )
            .into_response(),
    }
}

/// POST /api/messages/inbound
pub async fn register_inbound(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: CaptureRequest = parse_body(&body)?;
    let outcome = state.engine.reconciler.capture_inbound(request).await?;
    Ok(capture_response(outcome))
}

/// POST /api/messages/outbound/manual
pub async fn register_manual_outbound(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: CaptureRequest = parse_body(&body)?;
    let outcome = state
        .engine
        .reconciler
        .capture_manual_outbound(request)
        .await?;
    Ok(capture_response(outcome))
}
