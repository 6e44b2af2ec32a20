// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation ownership records.

use herald_core::{HeraldError, OwnershipInsert, OwnershipRecord, Timestamp};
use rusqlite::{ErrorCode, OptionalExtension, params};

use crate::codec::{OWNERSHIP_COLUMNS, opt_ts, row_to_ownership, ts};
use crate::database::{Database, map_tr_err};

pub async fn active_ownership(
    db: &Database,
    phone: &str,
) -> Result<Option<OwnershipRecord>, HeraldError> {
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {OWNERSHIP_COLUMNS} FROM conversation_ownership
                     WHERE phone = ?1 AND status = 'active'"
                ),
                params![phone],
                row_to_ownership,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// All active records, most recently touched first.
pub async fn list_active(db: &Database) -> Result<Vec<OwnershipRecord>, HeraldError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {OWNERSHIP_COLUMNS} FROM conversation_ownership
                 WHERE status = 'active'
                 ORDER BY updated_at DESC"
            ))?;
            let rows = stmt.query_map([], row_to_ownership)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a new record. A second active record for the same phone trips the
/// partial unique index and is reported as [`OwnershipInsert::ActiveExists`].
pub async fn insert(
    db: &Database,
    record: &OwnershipRecord,
) -> Result<OwnershipInsert, HeraldError> {
    let record = record.clone();
    db.connection()
        .call(move |conn| {
            let result = conn.execute(
                &format!(
                    "INSERT INTO conversation_ownership ({OWNERSHIP_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    record.id,
                    record.phone,
                    record.campaign_id,
                    record.assigned_to,
                    record.assigned_by,
                    record.status.to_string(),
                    ts(&record.assigned_at),
                    opt_ts(&record.last_inbound_at),
                    opt_ts(&record.closed_at),
                    ts(&record.created_at),
                    ts(&record.updated_at),
                ],
            );
            match result {
                Ok(_) => Ok(OwnershipInsert::Inserted),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Ok(OwnershipInsert::ActiveExists)
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Write `record` only if nobody touched it since `expected_updated_at`.
pub async fn update(
    db: &Database,
    record: &OwnershipRecord,
    expected_updated_at: Timestamp,
) -> Result<bool, HeraldError> {
    let record = record.clone();
    let expected = ts(&expected_updated_at);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE conversation_ownership
                 SET campaign_id = ?2, assigned_to = ?3, assigned_by = ?4, status = ?5,
                     assigned_at = ?6, last_inbound_at = ?7, closed_at = ?8, updated_at = ?9
                 WHERE id = ?1 AND updated_at = ?10",
                params![
                    record.id,
                    record.campaign_id,
                    record.assigned_to,
                    record.assigned_by,
                    record.status.to_string(),
                    ts(&record.assigned_at),
                    opt_ts(&record.last_inbound_at),
                    opt_ts(&record.closed_at),
                    ts(&record.updated_at),
                    expected,
                ],
            );
            match changed {
                Ok(n) => Ok(n > 0),
                // Reactivating a closed record while another is active.
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::open_db;
    use chrono::Duration;
    use herald_core::types::now;

    #[tokio::test]
    async fn one_active_record_per_phone() {
        let (db, _dir) = open_db().await;
        let first = OwnershipRecord::open("5511987654321", "ana", "ana", None, now());
        assert_eq!(insert(&db, &first).await.unwrap(), OwnershipInsert::Inserted);

        let second = OwnershipRecord::open("5511987654321", "bia", "bia", None, now());
        assert_eq!(
            insert(&db, &second).await.unwrap(),
            OwnershipInsert::ActiveExists
        );

        let active = active_ownership(&db, "5511987654321").await.unwrap().unwrap();
        assert_eq!(active.assigned_to, "ana");
        assert_eq!(list_active(&db).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn closed_records_allow_a_new_active_one() {
        let (db, _dir) = open_db().await;
        let mut record = OwnershipRecord::open("5511987654321", "ana", "ana", None, now());
        insert(&db, &record).await.unwrap();

        let expected = record.updated_at;
        record.close(now() + Duration::milliseconds(5));
        assert!(update(&db, &record, expected).await.unwrap());
        assert!(active_ownership(&db, "5511987654321").await.unwrap().is_none());

        let next = OwnershipRecord::open("5511987654321", "bia", "bia", None, now());
        assert_eq!(insert(&db, &next).await.unwrap(), OwnershipInsert::Inserted);
    }

    #[tokio::test]
    async fn update_rejects_stale_version() {
        let (db, _dir) = open_db().await;
        let mut record = OwnershipRecord::open("5511987654321", "ana", "ana", None, now());
        insert(&db, &record).await.unwrap();
        let original = record.updated_at;

        record.reassign("bia", "bia", None, original + Duration::milliseconds(5));
        assert!(update(&db, &record, original).await.unwrap());

        let mut late = record.clone();
        late.reassign("caio", "caio", None, original + Duration::milliseconds(10));
        assert!(!update(&db, &late, original).await.unwrap());

        let stored = active_ownership(&db, "5511987654321").await.unwrap().unwrap();
        assert_eq!(stored.assigned_to, "bia");
    }
}
