// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Record store contract over campaigns, message jobs, and ownership records.

use async_trait::async_trait;

use crate::campaign::{Campaign, StatDelta};
use crate::error::HeraldError;
use crate::message::{CaptureDedup, JobVersion, MessageJob};
use crate::ownership::OwnershipRecord;
use crate::traits::adapter::PluginAdapter;
use crate::types::{CampaignStatus, Direction, JobStatus, Timestamp};

/// Sort order for message queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageOrder {
    /// Insertion order.
    #[default]
    Oldest,
    /// Most recently updated first.
    Newest,
}

/// Filter for [`RecordStore::query_messages`]. Empty fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageQuery {
    pub campaign_id: Option<String>,
    pub phone: Option<String>,
    pub status: Option<JobStatus>,
    pub direction: Option<Direction>,
    /// Only messages attached to some campaign.
    pub with_campaign: bool,
    pub order: MessageOrder,
    pub limit: Option<usize>,
}

/// Result of writing a job status transition.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionWrite {
    /// Job persisted; carries the campaign when its counters changed.
    Applied { campaign: Option<Campaign> },
    /// The stored job no longer matched the version it was read at.
    Stale,
}

/// Result of inserting a captured message under a dedup rule.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureInsert {
    Inserted,
    /// Nothing written; the message repeats this stored one.
    Duplicate(MessageJob),
}

/// Result of opening an ownership record.
#[derive(Debug, Clone, PartialEq)]
pub enum OwnershipInsert {
    Inserted,
    /// Another active record for the phone already exists.
    ActiveExists,
}

/// Data-access contract required by the delivery engine.
///
/// Implementations must make [`reserve_next_job`](Self::reserve_next_job),
/// [`requeue_stale_job`](Self::requeue_stale_job),
/// [`save_job_transition`](Self::save_job_transition), and
/// [`insert_capture`](Self::insert_capture) atomic: each is a single
/// conditional update or transaction, never a read followed by a blind write.
#[async_trait]
pub trait RecordStore: PluginAdapter {
    /// Initializes the backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), HeraldError>;

    /// Flushes pending writes and releases connections.
    async fn close(&self) -> Result<(), HeraldError>;

    // --- Campaigns ---

    /// Inserts a campaign and its jobs in one transaction.
    async fn create_campaign(
        &self,
        campaign: &Campaign,
        jobs: &[MessageJob],
    ) -> Result<(), HeraldError>;

    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>, HeraldError>;

    /// Campaigns newest first, optionally filtered by status.
    async fn list_campaigns(
        &self,
        status: Option<CampaignStatus>,
    ) -> Result<Vec<Campaign>, HeraldError>;

    async fn set_campaign_status(
        &self,
        id: &str,
        status: CampaignStatus,
        now: Timestamp,
    ) -> Result<Option<Campaign>, HeraldError>;

    /// Deletes a campaign and all of its jobs. Returns false if it did not exist.
    async fn delete_campaign(&self, id: &str) -> Result<bool, HeraldError>;

    // --- Messages ---

    async fn insert_message(&self, job: &MessageJob) -> Result<(), HeraldError>;

    async fn get_message(&self, id: &str) -> Result<Option<MessageJob>, HeraldError>;

    /// Inserts a captured message unless `dedup` finds a stored message it
    /// repeats for the same phone. The check and the insert are one transaction.
    async fn insert_capture(
        &self,
        job: &MessageJob,
        dedup: CaptureDedup,
    ) -> Result<CaptureInsert, HeraldError>;

    async fn query_messages(&self, query: &MessageQuery) -> Result<Vec<MessageJob>, HeraldError>;

    // --- Queue ---

    /// Atomically moves the oldest pending job of the given campaigns to
    /// `processing` via [`MessageJob::mark_reserved`].
    async fn reserve_next_job(
        &self,
        campaign_ids: &[String],
        now: Timestamp,
    ) -> Result<Option<MessageJob>, HeraldError>;

    /// Processing jobs of the given campaigns whose last attempt predates `cutoff`.
    async fn find_stale_jobs(
        &self,
        campaign_ids: &[String],
        cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<MessageJob>, HeraldError>;

    /// Moves one job back to pending via [`MessageJob::mark_stale_requeued`],
    /// only if it is still processing and still older than `cutoff`.
    async fn requeue_stale_job(
        &self,
        id: &str,
        cutoff: Timestamp,
        timeout_ms: u64,
        now: Timestamp,
    ) -> Result<Option<MessageJob>, HeraldError>;

    /// Writes `job` if the stored row still has the `expected` status and
    /// `updated_at`, and applies `delta` to the owning campaign's counters in
    /// the same transaction. `job.updated_at` must be later than `expected`'s.
    async fn save_job_transition(
        &self,
        job: &MessageJob,
        expected: JobVersion,
        delta: StatDelta,
    ) -> Result<TransitionWrite, HeraldError>;

    // --- Ownership ---

    async fn active_ownership(&self, phone: &str) -> Result<Option<OwnershipRecord>, HeraldError>;

    async fn list_active_ownerships(&self) -> Result<Vec<OwnershipRecord>, HeraldError>;

    /// Inserts an active record, reporting a uniqueness violation instead of failing.
    async fn insert_ownership(
        &self,
        record: &OwnershipRecord,
    ) -> Result<OwnershipInsert, HeraldError>;

    /// Optimistic update: writes `record` only if the stored `updated_at`
    /// still equals `expected_updated_at`.
    async fn update_ownership(
        &self,
        record: &OwnershipRecord,
        expected_updated_at: Timestamp,
    ) -> Result<bool, HeraldError>;
}
