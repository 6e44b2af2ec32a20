// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Herald delivery engine.
//!
//! Domain records (campaigns, message jobs, ownership records), the error
//! taxonomy, the phone normalizer, and the [`RecordStore`] contract every
//! persistence backend implements.

pub mod campaign;
pub mod error;
pub mod message;
pub mod ownership;
pub mod phone;
pub mod traits;
pub mod types;

pub use campaign::{Campaign, CampaignProjection, CampaignStats, DelayRange, MediaRef, StatDelta};
pub use error::{HeraldError, StorageFailure};
pub use message::{AuditEntry, CaptureDedup, ClaimedJob, JobVersion, MessageJob};
pub use ownership::OwnershipRecord;
pub use phone::{NormalizedPhone, PhoneNormalizer};
pub use types::{
    AdapterType, CampaignStatus, Direction, Envelope, HealthStatus, JobOrigin, JobStatus,
    OwnershipStatus, Timestamp,
};

pub use traits::{
    CaptureInsert, MessageOrder, MessageQuery, OwnershipInsert, PluginAdapter, RecordStore,
    TransitionWrite,
};
