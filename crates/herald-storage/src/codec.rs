// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversions between domain records and SQLite rows.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings so SQL text
//! comparison orders them; list-valued fields are stored as JSON text.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, ToSql, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

use herald_core::{
    Campaign, CampaignStats, DelayRange, JobStatus, JobVersion, MessageJob, OwnershipRecord,
    Timestamp,
};

pub(crate) const MESSAGE_COLUMNS: &str = "id, campaign_id, phone, phone_original, search_terms, \
     name, variables, text, status, direction, attempt_count, error, last_error, audit, \
     sent_at, last_attempt_at, created_at, updated_at, origin";

pub(crate) const CAMPAIGN_COLUMNS: &str = "id, name, message_template, message_variants, turbo, \
     status, delay_min_seconds, delay_max_seconds, stats_total, stats_sent, stats_failed, \
     media, created_at, updated_at";

pub(crate) const OWNERSHIP_COLUMNS: &str = "id, phone, campaign_id, assigned_to, assigned_by, \
     status, assigned_at, last_inbound_at, closed_at, created_at, updated_at";

pub(crate) fn ts(t: &Timestamp) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn opt_ts(t: &Option<Timestamp>) -> Option<String> {
    t.as_ref().map(ts)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<Timestamp> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Timestamp> {
    let raw: String = row.get(idx)?;
    parse_ts(idx, &raw)
}

fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Timestamp>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| parse_ts(idx, &r)).transpose()
}

fn get_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn get_json<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn get_opt_json<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| {
        serde_json::from_str(&r)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> rusqlite::Result<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn to_opt_json<T: Serialize>(value: &Option<T>) -> rusqlite::Result<Option<String>> {
    value.as_ref().map(to_json).transpose()
}

pub(crate) fn row_to_message(row: &Row<'_>) -> rusqlite::Result<MessageJob> {
    Ok(MessageJob {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        phone: row.get(2)?,
        phone_original: row.get(3)?,
        search_terms: get_json(row, 4)?,
        name: row.get(5)?,
        variables: get_opt_json(row, 6)?,
        text: row.get(7)?,
        status: get_enum(row, 8)?,
        direction: get_enum(row, 9)?,
        attempt_count: row.get(10)?,
        error: row.get(11)?,
        last_error: row.get(12)?,
        audit: get_json(row, 13)?,
        sent_at: get_opt_ts(row, 14)?,
        last_attempt_at: get_opt_ts(row, 15)?,
        created_at: get_ts(row, 16)?,
        updated_at: get_ts(row, 17)?,
        origin: get_enum(row, 18)?,
    })
}

pub(crate) fn row_to_campaign(row: &Row<'_>) -> rusqlite::Result<Campaign> {
    Ok(Campaign {
        id: row.get(0)?,
        name: row.get(1)?,
        message_template: row.get(2)?,
        message_variants: get_json(row, 3)?,
        turbo: row.get(4)?,
        status: get_enum(row, 5)?,
        delay: DelayRange {
            min_seconds: row.get(6)?,
            max_seconds: row.get(7)?,
        },
        stats: CampaignStats {
            total: row.get(8)?,
            sent: row.get(9)?,
            failed: row.get(10)?,
        },
        media: get_opt_json(row, 11)?,
        created_at: get_ts(row, 12)?,
        updated_at: get_ts(row, 13)?,
    })
}

pub(crate) fn row_to_ownership(row: &Row<'_>) -> rusqlite::Result<OwnershipRecord> {
    Ok(OwnershipRecord {
        id: row.get(0)?,
        phone: row.get(1)?,
        campaign_id: row.get(2)?,
        assigned_to: row.get(3)?,
        assigned_by: row.get(4)?,
        status: get_enum(row, 5)?,
        assigned_at: get_ts(row, 6)?,
        last_inbound_at: get_opt_ts(row, 7)?,
        closed_at: get_opt_ts(row, 8)?,
        created_at: get_ts(row, 9)?,
        updated_at: get_ts(row, 10)?,
    })
}

/// Condition on a message update, checked against the stored row.
pub(crate) enum UpdateGuard {
    /// Stored status must equal this value.
    Status(JobStatus),
    /// Stored status and `updated_at` must both equal the version read.
    Version(JobVersion),
    /// Stored job must still be processing with its last attempt before the cutoff.
    StaleSince(String),
}

/// A message job flattened into SQL-ready values.
pub(crate) struct MessageRow {
    id: String,
    campaign_id: Option<String>,
    phone: String,
    phone_original: String,
    search_terms: String,
    name: String,
    variables: Option<String>,
    text: String,
    status: String,
    direction: String,
    origin: String,
    attempt_count: u32,
    error: Option<String>,
    last_error: Option<String>,
    audit: String,
    sent_at: Option<String>,
    last_attempt_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl MessageRow {
    pub(crate) fn from_job(job: &MessageJob) -> rusqlite::Result<Self> {
        Ok(Self {
            id: job.id.clone(),
            campaign_id: job.campaign_id.clone(),
            phone: job.phone.clone(),
            phone_original: job.phone_original.clone(),
            search_terms: to_json(&job.search_terms)?,
            name: job.name.clone(),
            variables: to_opt_json(&job.variables)?,
            text: job.text.clone(),
            status: job.status.to_string(),
            direction: job.direction.to_string(),
            origin: job.origin.to_string(),
            attempt_count: job.attempt_count,
            error: job.error.clone(),
            last_error: job.last_error.clone(),
            audit: to_json(&job.audit)?,
            sent_at: opt_ts(&job.sent_at),
            last_attempt_at: opt_ts(&job.last_attempt_at),
            created_at: ts(&job.created_at),
            updated_at: ts(&job.updated_at),
        })
    }

    pub(crate) fn insert(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            &format!(
                "INSERT INTO messages ({MESSAGE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
            ),
            params![
                self.id,
                self.campaign_id,
                self.phone,
                self.phone_original,
                self.search_terms,
                self.name,
                self.variables,
                self.text,
                self.status,
                self.direction,
                self.attempt_count,
                self.error,
                self.last_error,
                self.audit,
                self.sent_at,
                self.last_attempt_at,
                self.created_at,
                self.updated_at,
                self.origin,
            ],
        )
    }

    /// Overwrites every mutable column when `guard` holds. Returns the
    /// number of rows changed.
    pub(crate) fn update(&self, conn: &Connection, guard: &UpdateGuard) -> rusqlite::Result<usize> {
        let guard_values: Vec<String> = match guard {
            UpdateGuard::Status(status) => vec![status.to_string()],
            UpdateGuard::Version(version) => {
                vec![version.status.to_string(), ts(&version.updated_at)]
            }
            UpdateGuard::StaleSince(cutoff) => vec![cutoff.clone()],
        };
        let condition = match guard {
            UpdateGuard::Status(_) => " AND status = ?18",
            UpdateGuard::Version(_) => " AND status = ?18 AND updated_at = ?19",
            UpdateGuard::StaleSince(_) => {
                " AND status = 'processing' AND COALESCE(last_attempt_at, updated_at) < ?18"
            }
        };
        let sql = format!(
            "UPDATE messages SET campaign_id = ?2, phone = ?3, phone_original = ?4,
                 search_terms = ?5, name = ?6, variables = ?7, text = ?8, status = ?9,
                 direction = ?10, attempt_count = ?11, error = ?12, last_error = ?13,
                 audit = ?14, sent_at = ?15, last_attempt_at = ?16, updated_at = ?17
             WHERE id = ?1{condition}"
        );
        let mut values: Vec<&dyn ToSql> = vec![
            &self.id,
            &self.campaign_id,
            &self.phone,
            &self.phone_original,
            &self.search_terms,
            &self.name,
            &self.variables,
            &self.text,
            &self.status,
            &self.direction,
            &self.attempt_count,
            &self.error,
            &self.last_error,
            &self.audit,
            &self.sent_at,
            &self.last_attempt_at,
            &self.updated_at,
        ];
        for value in &guard_values {
            values.push(value);
        }
        conn.execute(&sql, values.as_slice())
    }
}

/// Placeholder list `?1, ?2, ...` for an `IN` clause starting at `first`.
pub(crate) fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_fixed_width_and_sortable() {
        let a = DateTime::parse_from_rfc3339("2026-03-01T09:05:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let b = DateTime::parse_from_rfc3339("2026-03-01T10:00:00.5Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(ts(&a), "2026-03-01T09:05:00.000Z");
        assert_eq!(ts(&b), "2026-03-01T10:00:00.500Z");
        assert!(ts(&a) < ts(&b));
        assert_eq!(parse_ts(0, &ts(&b)).unwrap(), b);
    }

    #[test]
    fn placeholder_list() {
        assert_eq!(placeholders(1, 3), "?1, ?2, ?3");
        assert_eq!(placeholders(4, 1), "?4");
    }
}
