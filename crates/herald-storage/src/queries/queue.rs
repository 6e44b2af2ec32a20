// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job reservation, stale reclaim, and status transitions.
//!
//! Every write here is a conditional update inside an immediate transaction:
//! the row is re-read under the write lock and the UPDATE re-checks the
//! status it expects, so concurrent callers can never both move the same job.

use herald_core::{
    Campaign, HeraldError, JobStatus, JobVersion, MessageJob, StatDelta, Timestamp,
    TransitionWrite,
};
use rusqlite::{OptionalExtension, TransactionBehavior, params, params_from_iter};
use tracing::debug;

use crate::codec::{
    CAMPAIGN_COLUMNS, MESSAGE_COLUMNS, MessageRow, UpdateGuard, placeholders, row_to_campaign,
    row_to_message, ts,
};
use crate::database::{Database, map_tr_err};

/// Atomically reserve the oldest pending job among the given campaigns.
pub async fn reserve_next(
    db: &Database,
    campaign_ids: &[String],
    now: Timestamp,
) -> Result<Option<MessageJob>, HeraldError> {
    if campaign_ids.is_empty() {
        return Ok(None);
    }
    let ids = campaign_ids.to_vec();
    let select = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE status = 'pending' AND campaign_id IN ({})
         ORDER BY seq ASC LIMIT 1",
        placeholders(1, ids.len())
    );

    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let candidate = tx
                .query_row(&select, params_from_iter(ids.iter()), row_to_message)
                .optional()?;
            let Some(mut job) = candidate else {
                tx.commit()?;
                return Ok(None);
            };

            job.mark_reserved(now);
            let row = MessageRow::from_job(&job)?;
            if row.update(&tx, &UpdateGuard::Status(JobStatus::Pending))? == 0 {
                tx.rollback()?;
                return Ok(None);
            }
            tx.commit()?;
            Ok(Some(job))
        })
        .await
        .map_err(map_tr_err)
}

/// Processing jobs among the given campaigns whose last attempt is older than `cutoff`.
pub async fn find_stale(
    db: &Database,
    campaign_ids: &[String],
    cutoff: Timestamp,
    limit: usize,
) -> Result<Vec<MessageJob>, HeraldError> {
    if campaign_ids.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }
    let mut values: Vec<String> = campaign_ids.to_vec();
    values.push(ts(&cutoff));
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE status = 'processing' AND campaign_id IN ({})
           AND COALESCE(last_attempt_at, updated_at) < ?{}
         ORDER BY seq ASC LIMIT {limit}",
        placeholders(1, campaign_ids.len()),
        campaign_ids.len() + 1
    );

    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), row_to_message)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Return one stale job to pending. `None` when another caller already
/// reclaimed it or it was re-attempted since it was observed.
pub async fn requeue_stale(
    db: &Database,
    id: &str,
    cutoff: Timestamp,
    timeout_ms: u64,
    now: Timestamp,
) -> Result<Option<MessageJob>, HeraldError> {
    let id = id.to_string();
    let cutoff = ts(&cutoff);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let current = tx
                .query_row(
                    &format!(
                        "SELECT {MESSAGE_COLUMNS} FROM messages
                         WHERE id = ?1 AND status = 'processing'
                           AND COALESCE(last_attempt_at, updated_at) < ?2"
                    ),
                    params![id, cutoff],
                    row_to_message,
                )
                .optional()?;
            let Some(mut job) = current else {
                tx.commit()?;
                return Ok(None);
            };

            job.mark_stale_requeued(now, timeout_ms);
            let row = MessageRow::from_job(&job)?;
            if row.update(&tx, &UpdateGuard::StaleSince(cutoff.clone()))? == 0 {
                tx.rollback()?;
                return Ok(None);
            }
            tx.commit()?;
            Ok(Some(job))
        })
        .await
        .map_err(map_tr_err)
}

/// Persist a job whose stored status and `updated_at` must still match
/// `expected`, and apply the stat delta to its campaign in the same transaction.
pub async fn save_transition(
    db: &Database,
    job: &MessageJob,
    expected: JobVersion,
    delta: StatDelta,
) -> Result<TransitionWrite, HeraldError> {
    let row = MessageRow::from_job(job).map_err(HeraldError::storage)?;
    let campaign_id = job.campaign_id.clone();
    let updated_at = job.updated_at;
    let now = ts(&updated_at);

    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if row.update(&tx, &UpdateGuard::Version(expected))? == 0 {
                tx.rollback()?;
                return Ok(TransitionWrite::Stale);
            }

            let mut campaign: Option<Campaign> = None;
            if !delta.is_zero()
                && let Some(campaign_id) = campaign_id
            {
                let found = tx
                    .query_row(
                        &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"),
                        params![campaign_id],
                        row_to_campaign,
                    )
                    .optional()?;
                if let Some(mut found) = found {
                    found.stats.apply(delta);
                    tx.execute(
                        "UPDATE campaigns SET stats_sent = ?2, stats_failed = ?3, updated_at = ?4
                         WHERE id = ?1",
                        params![found.id, found.stats.sent, found.stats.failed, now],
                    )?;
                    found.updated_at = updated_at;
                    campaign = Some(found);
                } else {
                    debug!(campaign_id = %campaign_id, "transition for job of deleted campaign");
                }
            }

            tx.commit()?;
            Ok(TransitionWrite::Applied { campaign })
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::campaigns;
    use crate::queries::messages;
    use crate::queries::test_support::{open_db, sample_campaign, sample_job};
    use chrono::Duration;
    use herald_core::types::now;
    use std::collections::HashSet;

    #[tokio::test]
    async fn reserves_oldest_pending_first() {
        let (db, _dir) = open_db().await;
        let jobs = vec![sample_job("c1", "11987654321"), sample_job("c1", "11987654322")];
        campaigns::create_campaign(&db, &sample_campaign("c1", "A"), &jobs)
            .await
            .unwrap();

        let ids = vec!["c1".to_string()];
        let first = reserve_next(&db, &ids, now()).await.unwrap().unwrap();
        assert_eq!(first.id, jobs[0].id);
        assert_eq!(first.status, JobStatus::Processing);
        assert_eq!(first.attempt_count, 1);

        let second = reserve_next(&db, &ids, now()).await.unwrap().unwrap();
        assert_eq!(second.id, jobs[1].id);
        assert!(reserve_next(&db, &ids, now()).await.unwrap().is_none());

        let stored = messages::get_message(&db, &first.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Processing);
        assert_eq!(stored.audit.last().unwrap().action, "processing_started");
    }

    #[tokio::test]
    async fn reservation_ignores_other_campaigns() {
        let (db, _dir) = open_db().await;
        campaigns::create_campaign(&db, &sample_campaign("c1", "A"), &[sample_job("c1", "11987654321")])
            .await
            .unwrap();
        let ids = vec!["c2".to_string()];
        assert!(reserve_next(&db, &ids, now()).await.unwrap().is_none());
        assert!(reserve_next(&db, &[], now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_reservations_never_share_a_job() {
        let (db, _dir) = open_db().await;
        let jobs: Vec<_> = (0..5)
            .map(|i| sample_job("c1", &format!("1198765432{i}")))
            .collect();
        campaigns::create_campaign(&db, &sample_campaign("c1", "A"), &jobs)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                reserve_next(&db, &["c1".to_string()], now()).await.unwrap()
            }));
        }

        let mut reserved = Vec::new();
        for handle in handles {
            if let Some(job) = handle.await.unwrap() {
                reserved.push(job.id);
            }
        }
        assert_eq!(reserved.len(), 5);
        let unique: HashSet<_> = reserved.iter().collect();
        assert_eq!(unique.len(), 5);
    }

    #[tokio::test]
    async fn stale_jobs_are_requeued_once() {
        let (db, _dir) = open_db().await;
        let job = sample_job("c1", "11987654321");
        campaigns::create_campaign(&db, &sample_campaign("c1", "A"), &[job.clone()])
            .await
            .unwrap();
        let ids = vec!["c1".to_string()];
        let long_ago = now() - Duration::minutes(10);
        reserve_next(&db, &ids, long_ago).await.unwrap().unwrap();

        let cutoff = now() - Duration::seconds(90);
        let stale = find_stale(&db, &ids, cutoff, 25).await.unwrap();
        assert_eq!(stale.len(), 1);

        let requeued = requeue_stale(&db, &job.id, cutoff, 90_000, now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(requeued.status, JobStatus::Pending);
        assert_eq!(requeued.audit.last().unwrap().action, "stale_requeued");

        assert!(requeue_stale(&db, &job.id, cutoff, 90_000, now())
            .await
            .unwrap()
            .is_none());
        assert!(find_stale(&db, &ids, cutoff, 25).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fresh_processing_jobs_are_not_stale() {
        let (db, _dir) = open_db().await;
        campaigns::create_campaign(&db, &sample_campaign("c1", "A"), &[sample_job("c1", "11987654321")])
            .await
            .unwrap();
        let ids = vec!["c1".to_string()];
        reserve_next(&db, &ids, now()).await.unwrap().unwrap();
        let cutoff = now() - Duration::seconds(90);
        assert!(find_stale(&db, &ids, cutoff, 25).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transition_updates_job_and_stats_together() {
        let (db, _dir) = open_db().await;
        let job = sample_job("c1", "11987654321");
        let mut campaign = sample_campaign("c1", "A");
        campaign.stats.total = 1;
        campaigns::create_campaign(&db, &campaign, &[job.clone()])
            .await
            .unwrap();

        let read_at = job.version();
        let mut sent = job.clone();
        sent.status = JobStatus::Sent;
        sent.updated_at = job.updated_at + Duration::milliseconds(1);
        let delta = StatDelta::between(JobStatus::Pending, JobStatus::Sent);
        let result = save_transition(&db, &sent, read_at, delta).await.unwrap();
        let TransitionWrite::Applied { campaign: Some(updated) } = result else {
            panic!("expected applied transition with campaign, got {result:?}");
        };
        assert_eq!(updated.stats.sent, 1);

        let stored = campaigns::get_campaign(&db, "c1").await.unwrap().unwrap();
        assert_eq!(stored.stats.sent, 1);

        // The row moved on from the version read: nothing is written.
        let stale = save_transition(&db, &sent, read_at, delta).await.unwrap();
        assert_eq!(stale, TransitionWrite::Stale);
        let stored = campaigns::get_campaign(&db, "c1").await.unwrap().unwrap();
        assert_eq!(stored.stats.sent, 1);
    }

    #[tokio::test]
    async fn same_status_writer_with_old_version_is_rejected() {
        let (db, _dir) = open_db().await;
        let job = sample_job("c1", "11987654321");
        campaigns::create_campaign(&db, &sample_campaign("c1", "A"), &[job.clone()])
            .await
            .unwrap();
        let read_at = job.version();

        let mut first = job.clone();
        first.text = "first edit".into();
        first.updated_at = job.updated_at + Duration::milliseconds(1);
        let applied = save_transition(&db, &first, read_at, StatDelta::default())
            .await
            .unwrap();
        assert!(matches!(applied, TransitionWrite::Applied { .. }));

        // Status is still pending, but updated_at moved.
        let mut second = job.clone();
        second.text = "second edit".into();
        second.updated_at = job.updated_at + Duration::milliseconds(2);
        let stale = save_transition(&db, &second, read_at, StatDelta::default())
            .await
            .unwrap();
        assert_eq!(stale, TransitionWrite::Stale);

        let stored = messages::get_message(&db, &job.id).await.unwrap().unwrap();
        assert_eq!(stored.text, "first edit");
    }
}
