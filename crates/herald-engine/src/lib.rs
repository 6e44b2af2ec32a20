// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery coordination engine.
//!
//! Every service here talks to persistence only through the
//! [`RecordStore`] trait and announces every mutation on the [`EventBus`].
//! The process entry point owns both and hands them in through
//! [`Engine::new`].

pub mod campaigns;
pub mod conversations;
pub mod ingest;
pub mod ownership;
pub mod queue;

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use herald_bus::EventBus;
use herald_config::HeraldConfig;
use herald_core::types::now;
use herald_core::{PhoneNormalizer, RecordStore, Timestamp};

pub use campaigns::{AntiBan, CampaignFailures, CampaignService, ContactInput, NewCampaign};
pub use conversations::{ConversationFilter, ConversationSummary, Conversations};
pub use ingest::{
    CaptureOutcome, CaptureRequest, HistoryItem, HistorySyncReport, HistorySyncRequest, Reconciler,
};
pub use ownership::{Assignment, OwnershipLock};
pub use queue::{JobAudit, JobQueue, MessageEdits, MessageFilter};

/// Tunables shared by the engine services.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// How long a job may sit in `processing` before it is reclaimed.
    pub stale_timeout: Duration,
    /// Maximum jobs reclaimed per claim call.
    pub stale_batch_limit: usize,
    /// Dedup window for inbound replies.
    pub inbound_window: Duration,
    /// Dedup window for messages an operator sent directly.
    pub manual_outbound_window: Duration,
    /// Dedup window for text-only matches during history sync.
    pub history_window: Duration,
    /// Recent same-direction messages compared when deduplicating a capture.
    pub recent_scan_limit: usize,
    /// Minimum phone digits before campaign resolution scans every message.
    pub fuzzy_min_digits: usize,
    /// History items returned when the caller sets no limit.
    pub history_default_limit: usize,
    /// Upper bound on history items returned.
    pub history_max_limit: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&HeraldConfig::default())
    }
}

impl From<&HeraldConfig> for EngineSettings {
    fn from(config: &HeraldConfig) -> Self {
        Self {
            stale_timeout: Duration::from_secs(config.queue.stale_timeout_secs),
            stale_batch_limit: config.queue.stale_batch_limit,
            inbound_window: Duration::from_secs(config.ingest.inbound_window_secs),
            manual_outbound_window: Duration::from_secs(config.ingest.manual_outbound_window_secs),
            history_window: Duration::from_secs(config.ingest.history_window_secs),
            recent_scan_limit: config.ingest.recent_scan_limit,
            fuzzy_min_digits: config.ingest.fuzzy_min_digits,
            history_default_limit: config.ingest.history_default_limit,
            history_max_limit: config.ingest.history_max_limit,
        }
    }
}

/// Next `updated_at` for a record read at `expected`. Strictly later, so a
/// stale writer's guard can never match again.
pub(crate) fn version_after(expected: Timestamp) -> Timestamp {
    now().max(expected + ChronoDuration::milliseconds(1))
}

/// Dependencies every service holds a handle to.
#[derive(Clone)]
pub(crate) struct Shared {
    pub store: Arc<dyn RecordStore>,
    pub bus: EventBus,
    pub phones: PhoneNormalizer,
    pub settings: Arc<EngineSettings>,
}

/// All engine services wired to one store and one bus.
#[derive(Clone)]
pub struct Engine {
    pub campaigns: CampaignService,
    pub queue: JobQueue,
    pub ownership: OwnershipLock,
    pub reconciler: Reconciler,
    pub conversations: Conversations,
}

impl Engine {
    pub fn new(store: Arc<dyn RecordStore>, bus: EventBus, config: &HeraldConfig) -> Self {
        Self::with_settings(
            store,
            bus,
            PhoneNormalizer::new(config.phone.default_country_code.clone()),
            EngineSettings::from(config),
        )
    }

    pub fn with_settings(
        store: Arc<dyn RecordStore>,
        bus: EventBus,
        phones: PhoneNormalizer,
        settings: EngineSettings,
    ) -> Self {
        let shared = Shared {
            store,
            bus,
            phones,
            settings: Arc::new(settings),
        };
        let ownership = OwnershipLock::new(shared.clone());
        Self {
            campaigns: CampaignService::new(shared.clone()),
            queue: JobQueue::new(shared.clone()),
            reconciler: Reconciler::new(shared.clone(), ownership.clone()),
            conversations: Conversations::new(shared),
            ownership,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use herald_bus::EventBus;
    use herald_config::model::StorageConfig;
    use herald_core::RecordStore;
    use herald_storage::SqliteStore;
    use tempfile::TempDir;

    use crate::{Engine, EngineSettings};

    pub struct TestEngine {
        pub engine: Engine,
        pub store: Arc<dyn RecordStore>,
        pub bus: EventBus,
        _dir: TempDir,
    }

    pub async fn engine() -> TestEngine {
        engine_with(EngineSettings::default()).await
    }

    pub async fn engine_with(settings: EngineSettings) -> TestEngine {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(StorageConfig {
            database_path: dir.path().join("engine.db").to_string_lossy().into_owned(),
            wal_mode: true,
        });
        store.initialize().await.unwrap();
        let store: Arc<dyn RecordStore> = Arc::new(store);
        let bus = EventBus::new(256);
        let engine = Engine::with_settings(
            Arc::clone(&store),
            bus.clone(),
            herald_core::PhoneNormalizer::default(),
            settings,
        );
        TestEngine {
            engine,
            store,
            bus,
            _dir: dir,
        }
    }

    /// Event names received so far, in order.
    pub fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<herald_core::Envelope>) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            names.push(envelope.event);
        }
        names
    }
}
