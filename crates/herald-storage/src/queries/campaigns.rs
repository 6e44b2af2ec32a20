// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign CRUD operations.

use herald_core::{Campaign, CampaignStatus, HeraldError, MessageJob, Timestamp};
use rusqlite::{OptionalExtension, params};

use crate::codec::{CAMPAIGN_COLUMNS, MessageRow, row_to_campaign, to_json, ts};
use crate::database::{Database, map_tr_err};

/// Insert a campaign and all of its jobs in one transaction.
pub async fn create_campaign(
    db: &Database,
    campaign: &Campaign,
    jobs: &[MessageJob],
) -> Result<(), HeraldError> {
    let rows = jobs
        .iter()
        .map(MessageRow::from_job)
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(HeraldError::storage)?;
    let variants = to_json(&campaign.message_variants).map_err(HeraldError::storage)?;
    let media = campaign
        .media
        .as_ref()
        .map(to_json)
        .transpose()
        .map_err(HeraldError::storage)?;
    let campaign = campaign.clone();

    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                &format!(
                    "INSERT INTO campaigns ({CAMPAIGN_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                params![
                    campaign.id,
                    campaign.name,
                    campaign.message_template,
                    variants,
                    campaign.turbo,
                    campaign.status.to_string(),
                    campaign.delay.min_seconds,
                    campaign.delay.max_seconds,
                    campaign.stats.total,
                    campaign.stats.sent,
                    campaign.stats.failed,
                    media,
                    ts(&campaign.created_at),
                    ts(&campaign.updated_at),
                ],
            )?;
            for row in &rows {
                row.insert(&tx)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_campaign(db: &Database, id: &str) -> Result<Option<Campaign>, HeraldError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"),
                params![id],
                row_to_campaign,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Campaigns newest first, optionally filtered by status.
pub async fn list_campaigns(
    db: &Database,
    status: Option<CampaignStatus>,
) -> Result<Vec<Campaign>, HeraldError> {
    let status = status.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CAMPAIGN_COLUMNS} FROM campaigns
                 WHERE (?1 IS NULL OR status = ?1)
                 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt.query_map(params![status], row_to_campaign)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_campaign_status(
    db: &Database,
    id: &str,
    status: CampaignStatus,
    now: Timestamp,
) -> Result<Option<Campaign>, HeraldError> {
    let id = id.to_string();
    let status = status.to_string();
    let now = ts(&now);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE campaigns SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status, now],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            conn.query_row(
                &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"),
                params![id],
                row_to_campaign,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a campaign and every job that belongs to it.
pub async fn delete_campaign(db: &Database, id: &str) -> Result<bool, HeraldError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM messages WHERE campaign_id = ?1", params![id])?;
            let deleted = tx.execute("DELETE FROM campaigns WHERE id = ?1", params![id])?;
            tx.commit()?;
            Ok(deleted > 0)
        })
        .await
        .map_err(map_tr_err)
}
