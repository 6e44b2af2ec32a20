// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job queue coordinator.
//!
//! Serves pending outbound jobs to the sending client one reservation at a
//! time, reclaims jobs abandoned in `processing`, and applies status
//! transitions together with the matching campaign counter change.

use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use herald_bus::events;
use herald_core::types::now;
use herald_core::{
    AuditEntry, Campaign, CampaignProjection, CampaignStatus, ClaimedJob, Direction, HeraldError,
    JobStatus, MessageJob, MessageOrder, MessageQuery, StatDelta, Timestamp, TransitionWrite,
};

use crate::{Shared, version_after};

/// Attempts made when a concurrent writer changes a job between read and write.
const TRANSITION_ATTEMPTS: usize = 5;
const DEFAULT_LIST_LIMIT: usize = 200;
const MAX_LIST_LIMIT: usize = 1000;
const UNKNOWN_SEND_ERROR: &str = "Unknown send error";

/// Field edits accepted by retry and edit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageEdits {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Filter for [`JobQueue::list_messages`].
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub status: Option<JobStatus>,
    pub direction: Option<Direction>,
    pub campaign_id: Option<String>,
    /// Any phone format; normalized before matching.
    pub phone: Option<String>,
    /// Defaults to 200, capped at 1000.
    pub limit: Option<usize>,
}

/// The audit trail of one job with its delivery bookkeeping.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAudit {
    pub id: String,
    pub status: JobStatus,
    pub phone: String,
    pub phone_original: String,
    pub attempt_count: u32,
    pub error: Option<String>,
    pub last_error: Option<String>,
    pub audit: Vec<AuditEntry>,
}

#[derive(Clone)]
pub struct JobQueue {
    shared: Shared,
}

impl JobQueue {
    pub(crate) fn new(shared: Shared) -> Self {
        Self { shared }
    }

    /// Reserves the oldest pending job among running campaigns, optionally
    /// restricted to one campaign. Returns `None` when nothing is eligible.
    pub async fn claim_next_job(
        &self,
        campaign_filter: Option<&str>,
    ) -> Result<Option<ClaimedJob>, HeraldError> {
        let running = self
            .shared
            .store
            .list_campaigns(Some(CampaignStatus::Running))
            .await?;

        let eligible: Vec<&Campaign> = match campaign_filter.map(str::trim).filter(|f| !f.is_empty()) {
            Some(id) => running.iter().filter(|c| c.id == id).collect(),
            None => running.iter().collect(),
        };
        if eligible.is_empty() {
            return Ok(None);
        }
        let ids: Vec<String> = eligible.iter().map(|c| c.id.clone()).collect();

        if let Err(e) = self.reclaim_stale(&ids).await {
            warn!(error = %e, "stale job reclaim failed");
        }

        let Some(job) = self.shared.store.reserve_next_job(&ids, now()).await? else {
            return Ok(None);
        };

        let campaign = eligible
            .iter()
            .find(|c| job.campaign_id.as_deref() == Some(c.id.as_str()))
            .map(|c| CampaignProjection::from(*c))
            .ok_or_else(|| {
                HeraldError::Internal(format!("reserved job {} has no running campaign", job.id))
            })?;

        debug!(job_id = %job.id, attempt = job.attempt_count, "job reserved");
        self.shared.bus.emit(
            events::QUEUE_RESERVED,
            json!({
                "messageId": job.id,
                "campaignId": job.campaign_id,
                "phone": job.phone,
                "status": job.status,
                "attemptCount": job.attempt_count,
            }),
        );

        Ok(Some(ClaimedJob { job, campaign }))
    }

    /// Moves processing jobs whose last attempt predates the stale timeout
    /// back to pending. Returns how many were reclaimed.
    pub async fn reclaim_stale(&self, campaign_ids: &[String]) -> Result<usize, HeraldError> {
        let timeout = self.shared.settings.stale_timeout;
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let cutoff = now()
            - ChronoDuration::from_std(timeout)
                .map_err(|e| HeraldError::Internal(format!("invalid stale timeout: {e}")))?;

        let stale = self
            .shared
            .store
            .find_stale_jobs(campaign_ids, cutoff, self.shared.settings.stale_batch_limit)
            .await?;

        let mut reclaimed = 0;
        for candidate in stale {
            let Some(job) = self
                .shared
                .store
                .requeue_stale_job(&candidate.id, cutoff, timeout_ms, now())
                .await?
            else {
                continue;
            };
            reclaimed += 1;
            info!(job_id = %job.id, timeout_ms, "stale job requeued");
            self.shared.bus.emit(
                events::QUEUE_REQUEUED,
                json!({
                    "messageId": job.id,
                    "campaignId": job.campaign_id,
                    "phone": job.phone,
                    "previousStatus": JobStatus::Processing,
                    "status": job.status,
                    "updatedAt": job.updated_at,
                }),
            );
        }
        Ok(reclaimed)
    }

    /// Records a delivery outcome reported by the sending client.
    pub async fn set_job_status(
        &self,
        id: &str,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<MessageJob, HeraldError> {
        let error = error.map(|e| e.trim().to_string()).filter(|e| !e.is_empty());

        let (job, previous, campaign) = self
            .transition(id, |job, at| {
                let previous = job.status;
                job.status = status;
                match status {
                    JobStatus::Sent => {
                        job.sent_at = Some(at);
                        job.error = None;
                        job.last_error = None;
                    }
                    JobStatus::Failed => {
                        let message = error.clone().unwrap_or_else(|| UNKNOWN_SEND_ERROR.into());
                        job.error = Some(message.clone());
                        job.last_error = Some(message);
                    }
                    JobStatus::Pending | JobStatus::Processing => {
                        if let Some(message) = &error {
                            job.error = Some(message.clone());
                            job.last_error = Some(message.clone());
                        }
                    }
                }
                job.record(AuditEntry::new(
                    at,
                    "status_updated",
                    format!("Status changed from {previous} to {status}"),
                    Some(json!({
                        "previousStatus": previous,
                        "status": status,
                        "error": job.error,
                    })),
                ));
                Ok(())
            })
            .await?;

        info!(job_id = %job.id, from = %previous, to = %job.status, "job status updated");
        self.shared.bus.emit(
            events::STATUS_UPDATED,
            json!({
                "id": job.id,
                "campaignId": job.campaign_id,
                "phone": job.phone,
                "previousStatus": previous,
                "status": job.status,
                "error": job.error,
                "sentAt": job.sent_at,
                "updatedAt": job.updated_at,
            }),
        );
        self.emit_stats(campaign.as_ref());
        Ok(job)
    }

    /// Puts a job back in the queue, optionally editing it first.
    pub async fn retry_job(&self, id: &str, edits: MessageEdits) -> Result<MessageJob, HeraldError> {
        let phones = self.shared.phones.clone();
        let (job, previous, campaign) = self
            .transition(id, |job, at| {
                let previous = job.status;
                let changed = edits.apply(job, &phones)?;
                job.status = JobStatus::Pending;
                job.error = None;
                job.last_error = None;
                job.sent_at = None;
                job.record(AuditEntry::new(
                    at,
                    "retried",
                    "Message moved back to queue",
                    Some(json!({
                        "previousStatus": previous,
                        "changedFields": changed,
                    })),
                ));
                Ok(())
            })
            .await?;

        info!(job_id = %job.id, from = %previous, "job retried");
        self.shared.bus.emit(
            events::MESSAGE_RETRIED,
            json!({
                "id": job.id,
                "campaignId": job.campaign_id,
                "phone": job.phone,
                "previousStatus": previous,
                "status": job.status,
                "updatedAt": job.updated_at,
            }),
        );
        self.emit_stats(campaign.as_ref());
        Ok(job)
    }

    /// Edits phone, name, or text without touching the status.
    pub async fn edit_job(&self, id: &str, edits: MessageEdits) -> Result<MessageJob, HeraldError> {
        let phones = self.shared.phones.clone();
        let mut changed_fields = Vec::new();
        let (job, _, _) = self
            .transition(id, |job, at| {
                let changed = edits.apply(job, &phones)?;
                job.record(AuditEntry::new(
                    at,
                    "edited",
                    "Message edited by user",
                    Some(json!({ "changedFields": changed })),
                ));
                changed_fields = changed;
                Ok(())
            })
            .await?;

        self.shared.bus.emit(
            events::MESSAGE_EDITED,
            json!({
                "id": job.id,
                "campaignId": job.campaign_id,
                "phone": job.phone,
                "changedFields": changed_fields,
                "updatedAt": job.updated_at,
            }),
        );
        Ok(job)
    }

    pub async fn job_audit(&self, id: &str) -> Result<JobAudit, HeraldError> {
        let job = self.load(id).await?;
        Ok(JobAudit {
            id: job.id,
            status: job.status,
            phone: job.phone,
            phone_original: job.phone_original,
            attempt_count: job.attempt_count,
            error: job.error,
            last_error: job.last_error,
            audit: job.audit,
        })
    }

    /// Messages newest first.
    pub async fn list_messages(&self, filter: MessageFilter) -> Result<Vec<MessageJob>, HeraldError> {
        let phone = filter
            .phone
            .as_deref()
            .map(|p| self.shared.phones.canonical_or_digits(p))
            .filter(|p| !p.is_empty());
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);

        self.shared
            .store
            .query_messages(&MessageQuery {
                campaign_id: filter.campaign_id.filter(|c| !c.trim().is_empty()),
                phone,
                status: filter.status,
                direction: filter.direction,
                with_campaign: false,
                order: MessageOrder::Newest,
                limit: Some(limit),
            })
            .await
    }

    async fn load(&self, id: &str) -> Result<MessageJob, HeraldError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(HeraldError::validation(
                "MESSAGE_ID_REQUIRED",
                "message id is required",
            ));
        }
        self.shared
            .store
            .get_message(id)
            .await?
            .ok_or_else(|| HeraldError::not_found("MESSAGE_NOT_FOUND", format!("message {id} not found")))
    }

    /// Reads the job, applies `mutate`, and writes it back guarded on the
    /// status and `updated_at` it was read with. Campaign counters move with
    /// the write for campaign-queued jobs. Retries when another writer got
    /// there first.
    async fn transition<F>(
        &self,
        id: &str,
        mut mutate: F,
    ) -> Result<(MessageJob, JobStatus, Option<Campaign>), HeraldError>
    where
        F: FnMut(&mut MessageJob, Timestamp) -> Result<(), HeraldError>,
    {
        for attempt in 1..=TRANSITION_ATTEMPTS {
            let mut job = self.load(id).await?;
            let read = job.version();
            let at = version_after(read.updated_at);
            mutate(&mut job, at)?;
            job.updated_at = at;

            let delta = if job.counts_toward_stats() {
                StatDelta::between(read.status, job.status)
            } else {
                StatDelta::default()
            };
            let previous = read.status;

            match self
                .shared
                .store
                .save_job_transition(&job, read, delta)
                .await?
            {
                TransitionWrite::Applied { campaign } => return Ok((job, previous, campaign)),
                TransitionWrite::Stale => {
                    debug!(job_id = %id, attempt, "job changed concurrently, retrying transition");
                }
            }
        }
        Err(HeraldError::Internal(format!(
            "message {id} kept changing concurrently, transition abandoned"
        )))
    }

    fn emit_stats(&self, campaign: Option<&Campaign>) {
        if let Some(campaign) = campaign {
            self.shared.bus.emit(
                events::CAMPAIGN_STATS_UPDATED,
                json!({
                    "campaignId": campaign.id,
                    "stats": campaign.stats,
                    "pending": campaign.stats.pending(),
                    "updatedAt": campaign.updated_at,
                }),
            );
        }
    }
}

impl MessageEdits {
    /// Applies the edits, returning the names of fields that changed.
    fn apply(
        &self,
        job: &mut MessageJob,
        phones: &herald_core::PhoneNormalizer,
    ) -> Result<Vec<&'static str>, HeraldError> {
        let mut changed = Vec::new();

        if let Some(raw) = &self.phone {
            let phone = phones.normalize(raw);
            if phone.canonical.is_empty() {
                return Err(HeraldError::validation("PHONE_REQUIRED", "phone is required"));
            }
            if phone.canonical != job.phone || phone.raw != job.phone_original {
                job.phone = phone.canonical;
                job.phone_original = phone.raw;
                job.search_terms = phone.search_terms;
                changed.push("phone");
            }
        }
        if let Some(name) = &self.name {
            let name = name.trim();
            if name != job.name {
                job.name = name.to_string();
                changed.push("name");
            }
        }
        if let Some(text) = &self.text {
            if text.trim().is_empty() {
                return Err(HeraldError::validation("TEXT_REQUIRED", "text is required"));
            }
            if *text != job.text {
                job.text = text.clone();
                changed.push("text");
            }
        }
        Ok(changed)
    }
}
