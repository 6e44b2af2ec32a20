// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared enums, timestamps, and the realtime envelope.

use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Wall-clock instant, UTC, millisecond precision.
pub type Timestamp = DateTime<Utc>;

/// Current time truncated to milliseconds so values survive a store round-trip unchanged.
pub fn now() -> Timestamp {
    Utc::now().trunc_subsecs(3)
}

/// Parses a client-supplied timestamp: RFC 3339 or epoch milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc).trunc_subsecs(3));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

/// Generates a new record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Health status reported by an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Gateway,
}

/// Campaign lifecycle. Only running campaigns feed the job queue.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CampaignStatus {
    #[default]
    Running,
    Paused,
    Completed,
}

/// Message job lifecycle.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Sent,
    Failed,
}

/// Direction of a message relative to the operator.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    #[default]
    Outbound,
    Inbound,
}

impl Direction {
    /// Anything other than "inbound" (case-insensitive) is outbound.
    pub fn from_lenient(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("inbound") {
            Self::Inbound
        } else {
            Self::Outbound
        }
    }
}

/// How a message job came to exist. Only campaign-queued jobs count
/// toward the campaign's `total`, so only they move its counters.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobOrigin {
    /// Created in bulk when the campaign was created.
    #[default]
    Campaign,
    /// Recorded after the fact: inbound reply, manual send, or history sync.
    Captured,
}

/// Conversation ownership lifecycle.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OwnershipStatus {
    #[default]
    Active,
    Closed,
}

/// Event payload shared by broadcast subscribers and webhook targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub event: String,
    pub data: serde_json::Value,
    pub at: Timestamp,
}

impl Envelope {
    pub fn event(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: "event".to_string(),
            event: event.into(),
            data,
            at: now(),
        }
    }
}
