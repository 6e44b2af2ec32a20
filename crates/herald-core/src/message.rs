// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message jobs and their append-only audit trail.

use serde::{Deserialize, Serialize};

use crate::campaign::CampaignProjection;
use crate::phone::NormalizedPhone;
use crate::types::{Direction, JobOrigin, JobStatus, Timestamp, new_id};

/// One entry of a job's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: Timestamp,
    pub action: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn new(
        at: Timestamp,
        action: impl Into<String>,
        detail: impl Into<String>,
        meta: Option<serde_json::Value>,
    ) -> Self {
        Self {
            at,
            action: action.into(),
            detail: detail.into(),
            meta,
        }
    }

    /// Dedup fingerprint recorded in `meta.fingerprint`, if non-empty.
    pub fn fingerprint(&self) -> Option<&str> {
        self.meta
            .as_ref()
            .and_then(|m| m.get("fingerprint"))
            .and_then(|f| f.as_str())
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }
}

/// The unit of outbound work, or a captured conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageJob {
    pub id: String,
    pub campaign_id: Option<String>,
    pub phone: String,
    pub phone_original: String,
    pub search_terms: Vec<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Value>,
    pub text: String,
    pub status: JobStatus,
    pub direction: Direction,
    #[serde(default)]
    pub origin: JobOrigin,
    pub attempt_count: u32,
    pub error: Option<String>,
    pub last_error: Option<String>,
    pub audit: Vec<AuditEntry>,
    pub sent_at: Option<Timestamp>,
    pub last_attempt_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl MessageJob {
    /// A pending outbound job created as part of a campaign.
    pub fn queued(
        campaign_id: &str,
        phone: &NormalizedPhone,
        name: impl Into<String>,
        variables: Option<serde_json::Value>,
        text: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: new_id(),
            campaign_id: Some(campaign_id.to_string()),
            phone: phone.canonical.clone(),
            phone_original: phone.raw.clone(),
            search_terms: phone.search_terms.clone(),
            name: name.into(),
            variables,
            text: text.into(),
            status: JobStatus::Pending,
            direction: Direction::Outbound,
            origin: JobOrigin::Campaign,
            attempt_count: 0,
            error: None,
            last_error: None,
            audit: vec![AuditEntry::new(
                now,
                "queued",
                "Message added to queue",
                None,
            )],
            sent_at: None,
            last_attempt_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A message that already happened in the conversation (inbound reply,
    /// manual send, or history sync). Stored as terminal `sent`.
    pub fn captured(
        campaign_id: Option<String>,
        phone: &NormalizedPhone,
        name: impl Into<String>,
        text: impl Into<String>,
        direction: Direction,
        at: Timestamp,
        audit: AuditEntry,
    ) -> Self {
        Self {
            id: new_id(),
            campaign_id,
            phone: phone.canonical.clone(),
            phone_original: phone.raw.clone(),
            search_terms: phone.search_terms.clone(),
            name: name.into(),
            variables: None,
            text: text.into(),
            status: JobStatus::Sent,
            direction,
            origin: JobOrigin::Captured,
            attempt_count: 1,
            error: None,
            last_error: None,
            audit: vec![audit],
            sent_at: Some(at),
            last_attempt_at: Some(at),
            created_at: at,
            updated_at: at,
        }
    }

    /// Appends an audit entry and bumps `updated_at`.
    pub fn record(&mut self, entry: AuditEntry) {
        self.updated_at = entry.at;
        self.audit.push(entry);
    }

    /// Transition applied by a successful reservation.
    pub fn mark_reserved(&mut self, now: Timestamp) {
        self.status = JobStatus::Processing;
        self.attempt_count += 1;
        self.last_attempt_at = Some(now);
        let detail = format!(
            "Message processing started (attempt #{})",
            self.attempt_count
        );
        self.record(AuditEntry::new(now, "processing_started", detail, None));
    }

    /// Transition applied when an in-flight job outlived the stale timeout.
    pub fn mark_stale_requeued(&mut self, now: Timestamp, timeout_ms: u64) {
        let previous = self.status;
        self.status = JobStatus::Pending;
        self.sent_at = None;
        self.record(AuditEntry::new(
            now,
            "stale_requeued",
            "Message moved back to queue after processing timeout",
            Some(serde_json::json!({
                "previousStatus": previous,
                "timeoutMs": timeout_ms,
            })),
        ));
    }

    /// Reference time of the last attempt, used for staleness.
    pub fn attempted_at(&self) -> Timestamp {
        self.last_attempt_at.unwrap_or(self.updated_at)
    }

    /// When the message happened in the conversation.
    pub fn occurred_at(&self) -> Timestamp {
        self.sent_at.unwrap_or(self.created_at)
    }

    /// First dedup fingerprint found in the audit trail.
    pub fn fingerprint(&self) -> Option<&str> {
        self.audit.iter().find_map(AuditEntry::fingerprint)
    }

    pub fn version(&self) -> JobVersion {
        JobVersion {
            status: self.status,
            updated_at: self.updated_at,
        }
    }

    /// Whether status changes of this job move its campaign's counters.
    /// Captured messages were never part of `total`.
    pub fn counts_toward_stats(&self) -> bool {
        self.origin == JobOrigin::Campaign && self.direction == Direction::Outbound
    }
}

/// Status and `updated_at` a job was read with. Conditional writes only
/// land while the stored row still carries both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobVersion {
    pub status: JobStatus,
    pub updated_at: Timestamp,
}

/// Repeat detection for captured messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureDedup {
    /// Maximum distance between the two occurrence times.
    pub window: chrono::Duration,
    /// How many of the most recent same-direction messages are compared.
    pub scan_limit: usize,
}

impl CaptureDedup {
    /// The stored message `candidate` repeats, if any: same direction and
    /// trimmed text, occurring within the window, among the `scan_limit`
    /// most recent messages of that direction.
    pub fn find_repeat<'a>(
        &self,
        candidate: &MessageJob,
        existing: &'a [MessageJob],
    ) -> Option<&'a MessageJob> {
        let text = candidate.text.trim();
        let at = candidate.occurred_at();
        let mut recent: Vec<&MessageJob> = existing
            .iter()
            .filter(|m| m.direction == candidate.direction)
            .collect();
        recent.sort_by_key(|m| std::cmp::Reverse(m.occurred_at()));
        recent
            .into_iter()
            .take(self.scan_limit)
            .find(|m| m.text.trim() == text && (m.occurred_at() - at).abs() <= self.window)
    }
}

/// A reserved job handed to the sending client together with its campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedJob {
    #[serde(flatten)]
    pub job: MessageJob,
    pub campaign: CampaignProjection,
}
