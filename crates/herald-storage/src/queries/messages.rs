// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message job CRUD and filtered queries.

use herald_core::{CaptureDedup, CaptureInsert, HeraldError, MessageJob, MessageOrder, MessageQuery};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, TransactionBehavior, params, params_from_iter};

use crate::codec::{MESSAGE_COLUMNS, MessageRow, row_to_message};
use crate::database::{Database, map_tr_err};

pub async fn insert_message(db: &Database, job: &MessageJob) -> Result<(), HeraldError> {
    let row = MessageRow::from_job(job).map_err(HeraldError::storage)?;
    db.connection()
        .call(move |conn| {
            row.insert(conn)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_message(db: &Database, id: &str) -> Result<Option<MessageJob>, HeraldError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
                row_to_message,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a captured message unless it repeats one already stored for the
/// phone. The lookup runs under the write lock, so identical captures racing
/// each other store one row.
pub async fn insert_capture(
    db: &Database,
    job: &MessageJob,
    dedup: CaptureDedup,
) -> Result<CaptureInsert, HeraldError> {
    let row = MessageRow::from_job(job).map_err(HeraldError::storage)?;
    let candidate = job.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let existing = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE phone = ?1 AND direction = ?2"
                ))?;
                let rows = stmt.query_map(
                    params![candidate.phone, candidate.direction.to_string()],
                    row_to_message,
                )?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            if let Some(repeat) = dedup.find_repeat(&candidate, &existing) {
                let repeat = repeat.clone();
                tx.rollback()?;
                return Ok(CaptureInsert::Duplicate(repeat));
            }
            row.insert(&tx)?;
            tx.commit()?;
            Ok(CaptureInsert::Inserted)
        })
        .await
        .map_err(map_tr_err)
}

/// Filtered message listing.
pub async fn query_messages(
    db: &Database,
    query: &MessageQuery,
) -> Result<Vec<MessageJob>, HeraldError> {
    let (sql, values) = build_query(query);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), row_to_message)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

fn build_query(query: &MessageQuery) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    let mut push = |clause: &str, value: Value| {
        values.push(value);
        clauses.push(clause.replace('?', &format!("?{}", values.len())));
    };

    if let Some(campaign_id) = &query.campaign_id {
        push("campaign_id = ?", Value::Text(campaign_id.clone()));
    }
    if let Some(phone) = &query.phone {
        push("phone = ?", Value::Text(phone.clone()));
    }
    if let Some(status) = query.status {
        push("status = ?", Value::Text(status.to_string()));
    }
    if let Some(direction) = query.direction {
        push("direction = ?", Value::Text(direction.to_string()));
    }
    if query.with_campaign {
        clauses.push("campaign_id IS NOT NULL".to_string());
    }

    let mut sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(match query.order {
        MessageOrder::Oldest => " ORDER BY seq ASC",
        MessageOrder::Newest => " ORDER BY updated_at DESC, seq DESC",
    });
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    (sql, values)
}
