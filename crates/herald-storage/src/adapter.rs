// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`RecordStore`] trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use herald_config::model::StorageConfig;
use herald_core::{
    AdapterType, Campaign, CampaignStatus, CaptureDedup, CaptureInsert, HealthStatus, HeraldError,
    JobVersion, MessageJob, MessageQuery, OwnershipInsert, OwnershipRecord, PluginAdapter,
    RecordStore, StatDelta, Timestamp, TransitionWrite,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed record store.
///
/// The database is opened lazily by [`RecordStore::initialize`]; every other
/// call before that fails with a storage error.
pub struct SqliteStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, HeraldError> {
        self.db
            .get()
            .ok_or_else(|| HeraldError::storage("storage not initialized -- call initialize() first"))
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, HeraldError> {
        let Ok(db) = self.db() else {
            return Ok(HealthStatus::Unhealthy("not initialized".into()));
        };
        let probe = db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err);
        Ok(match probe {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), HeraldError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn initialize(&self) -> Result<(), HeraldError> {
        let path = &self.config.database_path;
        let db = Database::open_with(path, self.config.wal_mode).await?;
        self.db
            .set(db)
            .map_err(|_| HeraldError::storage("storage already initialized"))?;
        debug!(path = %path, "SQLite record store initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), HeraldError> {
        self.db()?.checkpoint().await
    }

    // --- Campaigns ---

    async fn create_campaign(
        &self,
        campaign: &Campaign,
        jobs: &[MessageJob],
    ) -> Result<(), HeraldError> {
        queries::campaigns::create_campaign(self.db()?, campaign, jobs).await
    }

    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>, HeraldError> {
        queries::campaigns::get_campaign(self.db()?, id).await
    }

    async fn list_campaigns(
        &self,
        status: Option<CampaignStatus>,
    ) -> Result<Vec<Campaign>, HeraldError> {
        queries::campaigns::list_campaigns(self.db()?, status).await
    }

    async fn set_campaign_status(
        &self,
        id: &str,
        status: CampaignStatus,
        now: Timestamp,
    ) -> Result<Option<Campaign>, HeraldError> {
        queries::campaigns::set_campaign_status(self.db()?, id, status, now).await
    }

    async fn delete_campaign(&self, id: &str) -> Result<bool, HeraldError> {
        queries::campaigns::delete_campaign(self.db()?, id).await
    }

    // --- Messages ---

    async fn insert_message(&self, job: &MessageJob) -> Result<(), HeraldError> {
        queries::messages::insert_message(self.db()?, job).await
    }

    async fn get_message(&self, id: &str) -> Result<Option<MessageJob>, HeraldError> {
        queries::messages::get_message(self.db()?, id).await
    }

    async fn insert_capture(
        &self,
        job: &MessageJob,
        dedup: CaptureDedup,
    ) -> Result<CaptureInsert, HeraldError> {
        queries::messages::insert_capture(self.db()?, job, dedup).await
    }

    async fn query_messages(&self, query: &MessageQuery) -> Result<Vec<MessageJob>, HeraldError> {
        queries::messages::query_messages(self.db()?, query).await
    }

    // --- Queue ---

    async fn reserve_next_job(
        &self,
        campaign_ids: &[String],
        now: Timestamp,
    ) -> Result<Option<MessageJob>, HeraldError> {
        queries::queue::reserve_next(self.db()?, campaign_ids, now).await
    }

    async fn find_stale_jobs(
        &self,
        campaign_ids: &[String],
        cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<MessageJob>, HeraldError> {
        queries::queue::find_stale(self.db()?, campaign_ids, cutoff, limit).await
    }

    async fn requeue_stale_job(
        &self,
        id: &str,
        cutoff: Timestamp,
        timeout_ms: u64,
        now: Timestamp,
    ) -> Result<Option<MessageJob>, HeraldError> {
        queries::queue::requeue_stale(self.db()?, id, cutoff, timeout_ms, now).await
    }

    async fn save_job_transition(
        &self,
        job: &MessageJob,
        expected: JobVersion,
        delta: StatDelta,
    ) -> Result<TransitionWrite, HeraldError> {
        queries::queue::save_transition(self.db()?, job, expected, delta).await
    }

    // --- Ownership ---

    async fn active_ownership(&self, phone: &str) -> Result<Option<OwnershipRecord>, HeraldError> {
        queries::ownership::active_ownership(self.db()?, phone).await
    }

    async fn list_active_ownerships(&self) -> Result<Vec<OwnershipRecord>, HeraldError> {
        queries::ownership::list_active(self.db()?).await
    }

    async fn insert_ownership(
        &self,
        record: &OwnershipRecord,
    ) -> Result<OwnershipInsert, HeraldError> {
        queries::ownership::insert(self.db()?, record).await
    }

    async fn update_ownership(
        &self,
        record: &OwnershipRecord,
        expected_updated_at: Timestamp,
    ) -> Result<bool, HeraldError> {
        queries::ownership::update(self.db()?, record, expected_updated_at).await
    }
}
