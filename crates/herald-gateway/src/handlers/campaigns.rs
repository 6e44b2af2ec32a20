// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `/api/campaigns` handlers.

use std::str::FromStr;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};

use herald_core::{Campaign, CampaignStatus};
use herald_engine::{CampaignFailures, NewCampaign};

use super::{parse_body, parse_value};
use crate::error::ApiError;
use crate::operator::str_field;
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CampaignListQuery {
    pub status: Option<String>,
}

fn parse_status(raw: &str) -> Result<CampaignStatus, ApiError> {
    CampaignStatus::from_str(&raw.trim().to_ascii_lowercase()).map_err(|_| {
        ApiError::validation(
            "INVALID_CAMPAIGN_STATUS",
            format!("unknown campaign status '{raw}', expected running, paused or completed"),
        )
    })
}

/// POST /api/campaigns
pub async fn create_campaign(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Campaign>), ApiError> {
    let input: NewCampaign = parse_body(&body)?;
    let campaign = state.engine.campaigns.create(input).await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

/// GET /api/campaigns
pub async fn list_campaigns(
    State(state): State<AppState>,
    Query(query): Query<CampaignListQuery>,
) -> Result<Json<Vec<Campaign>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(parse_status)
        .transpose()?;
    Ok(Json(state.engine.campaigns.list(status).await?))
}

/// GET /api/campaigns/{id}
pub async fn get_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Campaign>, ApiError> {
    Ok(Json(state.engine.campaigns.get(&id).await?))
}

/// GET /api/campaigns/{id}/failures
pub async fn get_campaign_failures(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CampaignFailures>, ApiError> {
    Ok(Json(state.engine.campaigns.failures(&id).await?))
}

/// PATCH /api/campaigns/{id}/status
pub async fn update_campaign_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Campaign>, ApiError> {
    let body = parse_value(&body)?;
    let raw = str_field(&body, "status")
        .ok_or_else(|| ApiError::validation("STATUS_REQUIRED", "status is required"))?;
    let status = parse_status(raw)?;
    Ok(Json(state.engine.campaigns.set_status(&id, status).await?))
}

/// DELETE /api/campaigns/{id}
pub async fn delete_campaign(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let campaign = state.engine.campaigns.delete(&id).await?;
    Ok(Json(json!({ "msg": "campaign removed", "id": campaign.id })))
}
