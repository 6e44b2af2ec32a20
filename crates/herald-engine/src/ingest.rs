// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingestion and dedup reconciler.
//!
//! The sending client reports three kinds of messages that already happened
//! in a conversation: inbound replies, messages an operator typed directly,
//! and bulk snapshots of the chat history. Each accepted item becomes one
//! terminal [`MessageJob`] attached to a campaign; repeats are recognized and
//! dropped.

use std::time::Duration;

use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use herald_bus::events;
use herald_core::phone::{digits_only, phones_match};
use herald_core::types::{now, parse_timestamp};
use herald_core::{
    AuditEntry, CaptureDedup, CaptureInsert, Direction, HeraldError, MessageJob, MessageOrder,
    MessageQuery, NormalizedPhone, Timestamp,
};

use crate::Shared;
use crate::ownership::OwnershipLock;

const INBOUND_SOURCE: &str = "chat_client";
const MANUAL_OUTBOUND_SOURCE: &str = "operator_direct";
const HISTORY_SOURCE: &str = "history_sync";
/// Reason reported when no campaign could be attached to a capture.
pub const CAMPAIGN_NOT_RESOLVED: &str = "campaign_not_resolved";

/// One inbound reply or manually sent message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub name: Option<String>,
    /// RFC 3339 or epoch milliseconds. Missing or unparseable means now.
    #[serde(default)]
    pub at: Option<String>,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    /// A new message was stored.
    Stored(MessageJob),
    /// The item repeats this already stored message.
    Duplicate(MessageJob),
    /// Accepted but not stored.
    Ignored { reason: &'static str },
}

/// One item of a history snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub at: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub link_url: Option<String>,
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl HistoryItem {
    /// Text, else media URL, else link URL. Empty when nothing is renderable.
    fn body(&self) -> &str {
        [&self.text, &self.media_url, &self.link_url]
            .into_iter()
            .filter_map(|v| v.as_deref().map(str::trim))
            .find(|v| !v.is_empty())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySyncRequest {
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub messages: Vec<HistoryItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySyncReport {
    pub phone: String,
    pub campaign_id: Option<String>,
    pub inserted: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub total_received: usize,
}

/// Per-direction capture parameters.
struct CaptureKind {
    direction: Direction,
    window: Duration,
    default_source: &'static str,
    action: &'static str,
    detail: &'static str,
    stored_event: &'static str,
    duplicate_event: &'static str,
}

/// What the history dedup compares.
struct Seen {
    direction: Direction,
    fingerprint: Option<String>,
    text: String,
    at: Timestamp,
}

impl Seen {
    fn of(job: &MessageJob) -> Self {
        Self {
            direction: job.direction,
            fingerprint: job.fingerprint().map(str::to_string),
            text: job.text.trim().to_string(),
            at: job.occurred_at(),
        }
    }

    /// Same direction, and either the same fingerprint or the same text
    /// within `window`.
    fn repeats(&self, other: &Seen, window: ChronoDuration) -> bool {
        if self.direction != other.direction {
            return false;
        }
        if let (Some(a), Some(b)) = (&self.fingerprint, &other.fingerprint)
            && a == b
        {
            return true;
        }
        !self.text.is_empty()
            && self.text == other.text
            && (self.at - other.at).abs() <= window
    }
}

#[derive(Clone)]
pub struct Reconciler {
    shared: Shared,
    ownership: OwnershipLock,
}

impl Reconciler {
    pub(crate) fn new(shared: Shared, ownership: OwnershipLock) -> Self {
        Self { shared, ownership }
    }

    /// Stores a reply from the counterpart, refreshing the conversation's
    /// last inbound time.
    pub async fn capture_inbound(&self, request: CaptureRequest) -> Result<CaptureOutcome, HeraldError> {
        let kind = CaptureKind {
            direction: Direction::Inbound,
            window: self.shared.settings.inbound_window,
            default_source: INBOUND_SOURCE,
            action: "inbound_received",
            detail: "Inbound reply captured from chat",
            stored_event: events::INBOUND_RECEIVED,
            duplicate_event: events::INBOUND_DUPLICATE,
        };
        let outcome = self.capture(kind, request).await?;
        if let CaptureOutcome::Stored(job) = &outcome {
            self.ownership.touch_inbound(&job.phone, job.occurred_at()).await;
        }
        Ok(outcome)
    }

    /// Stores a message an operator sent directly from the chat client.
    pub async fn capture_manual_outbound(
        &self,
        request: CaptureRequest,
    ) -> Result<CaptureOutcome, HeraldError> {
        let kind = CaptureKind {
            direction: Direction::Outbound,
            window: self.shared.settings.manual_outbound_window,
            default_source: MANUAL_OUTBOUND_SOURCE,
            action: "manual_outbound_sent",
            detail: "Message sent directly by an operator",
            stored_event: events::MANUAL_OUTBOUND_SENT,
            duplicate_event: events::MANUAL_OUTBOUND_DUPLICATE,
        };
        self.capture(kind, request).await
    }

    async fn capture(
        &self,
        kind: CaptureKind,
        request: CaptureRequest,
    ) -> Result<CaptureOutcome, HeraldError> {
        let phone = self.normalize(&request.phone)?;
        let text = request.text.trim();
        if text.is_empty() {
            return Err(HeraldError::validation("TEXT_REQUIRED", "text is required"));
        }
        let at = request
            .at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(now);

        let related = self.messages_for(&phone.canonical).await?;
        let Some(campaign_id) = self
            .resolve_campaign(&phone.canonical, request.campaign_id.as_deref(), &related)
            .await?
        else {
            debug!(phone = %phone.canonical, direction = %kind.direction, "capture ignored, no campaign");
            return Ok(CaptureOutcome::Ignored {
                reason: CAMPAIGN_NOT_RESOLVED,
            });
        };

        let source = request
            .source
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(kind.default_source);
        let job = MessageJob::captured(
            Some(campaign_id.clone()),
            &phone,
            request.name.as_deref().map(str::trim).unwrap_or_default(),
            text,
            kind.direction,
            at,
            AuditEntry::new(now(), kind.action, kind.detail, Some(json!({ "source": source }))),
        );
        let dedup = CaptureDedup {
            window: to_chrono(kind.window)?,
            scan_limit: self.shared.settings.recent_scan_limit,
        };
        if let CaptureInsert::Duplicate(existing) =
            self.shared.store.insert_capture(&job, dedup).await?
        {
            debug!(phone = %phone.canonical, message_id = %existing.id, "duplicate capture");
            self.shared.bus.emit(
                kind.duplicate_event,
                json!({
                    "phone": phone.canonical,
                    "campaignId": campaign_id,
                    "messageId": existing.id,
                }),
            );
            return Ok(CaptureOutcome::Duplicate(existing));
        }

        info!(
            phone = %job.phone,
            campaign_id = %campaign_id,
            direction = %job.direction,
            "message captured"
        );
        self.shared.bus.emit(
            kind.stored_event,
            json!({
                "phone": job.phone,
                "campaignId": campaign_id,
                "message": job,
            }),
        );
        Ok(CaptureOutcome::Stored(job))
    }

    /// Imports a snapshot of the conversation on behalf of its owner.
    pub async fn sync_history(
        &self,
        phone: &str,
        operator: &str,
        request: HistorySyncRequest,
    ) -> Result<HistorySyncReport, HeraldError> {
        let record = self.ownership.require_ownership(phone, operator).await?;
        let operator = operator.trim();
        let phone = self.normalize(&record.phone)?;
        let total_received = request.messages.len();

        if request.messages.is_empty() {
            return Ok(HistorySyncReport {
                phone: phone.canonical,
                campaign_id: None,
                inserted: 0,
                duplicates: 0,
                skipped: 0,
                total_received,
            });
        }

        let existing = self.messages_for(&phone.canonical).await?;
        let preferred = request
            .campaign_id
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .or(record.campaign_id.as_deref());
        let campaign_id = self
            .resolve_campaign(&phone.canonical, preferred, &existing)
            .await?;

        let source = request
            .source
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(HISTORY_SOURCE);
        let window = to_chrono(self.shared.settings.history_window)?;
        let mut seen: Vec<Seen> = existing.iter().map(Seen::of).collect();
        let mut accepted = Vec::new();
        let mut duplicates = 0;
        let mut skipped = 0;
        let mut latest_inbound: Option<Timestamp> = None;

        for item in &request.messages {
            let body = item.body();
            if body.is_empty() {
                skipped += 1;
                continue;
            }
            let direction = Direction::from_lenient(item.direction.as_deref().unwrap_or_default());
            let at = item.at.as_deref().and_then(parse_timestamp).unwrap_or_else(now);
            let fingerprint = item
                .fingerprint
                .as_deref()
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string);

            let candidate = Seen {
                direction,
                fingerprint: fingerprint.clone(),
                text: body.to_string(),
                at,
            };
            if seen.iter().any(|s| s.repeats(&candidate, window)) {
                duplicates += 1;
                continue;
            }

            let name = item
                .name
                .as_deref()
                .or(request.name.as_deref())
                .map(str::trim)
                .unwrap_or_default();
            let job = MessageJob::captured(
                campaign_id.clone(),
                &phone,
                name,
                body,
                direction,
                at,
                AuditEntry::new(
                    now(),
                    "history_sync",
                    "Message imported from chat history",
                    Some(json!({
                        "source": source,
                        "syncedBy": operator,
                        "fingerprint": fingerprint,
                    })),
                ),
            );
            if direction == Direction::Inbound && latest_inbound.is_none_or(|l| at > l) {
                latest_inbound = Some(at);
            }
            seen.push(candidate);
            accepted.push(job);
        }

        for job in &accepted {
            self.shared.store.insert_message(job).await?;
        }

        if !accepted.is_empty() {
            info!(
                phone = %phone.canonical,
                inserted = accepted.len(),
                duplicates,
                skipped,
                "history synced"
            );
            self.shared.bus.emit(
                events::HISTORY_SYNCED,
                json!({
                    "phone": phone.canonical,
                    "campaignId": campaign_id,
                    "inserted": accepted.len(),
                    "syncedBy": operator,
                }),
            );
        }
        if let Some(at) = latest_inbound {
            self.ownership.touch_inbound(&phone.canonical, at).await;
        }

        Ok(HistorySyncReport {
            phone: phone.canonical,
            campaign_id,
            inserted: accepted.len(),
            duplicates,
            skipped,
            total_received,
        })
    }

    /// Campaign a conversation message belongs to: the explicit id, else the
    /// newest outbound campaign message for the phone, else a scan of every
    /// campaign message for a phone that matches loosely.
    ///
    /// The scan is linear in the number of stored campaign messages and only
    /// runs for phones with at least `fuzzy_min_digits` digits.
    pub async fn resolve_campaign(
        &self,
        phone: &str,
        preferred: Option<&str>,
        related: &[MessageJob],
    ) -> Result<Option<String>, HeraldError> {
        if let Some(id) = preferred.map(str::trim).filter(|id| !id.is_empty()) {
            return Ok(Some(id.to_string()));
        }

        if let Some(id) = newest_outbound_campaign(related) {
            return Ok(Some(id));
        }

        if digits_only(phone).len() < self.shared.settings.fuzzy_min_digits {
            return Ok(None);
        }
        let candidates = self
            .shared
            .store
            .query_messages(&MessageQuery {
                direction: Some(Direction::Outbound),
                with_campaign: true,
                order: MessageOrder::Newest,
                ..Default::default()
            })
            .await?;
        Ok(candidates
            .iter()
            .find(|m| phones_match(&m.phone, phone))
            .and_then(|m| m.campaign_id.clone()))
    }

    /// Every message stored for a canonical phone, newest first.
    async fn messages_for(&self, phone: &str) -> Result<Vec<MessageJob>, HeraldError> {
        let mut messages = self
            .shared
            .store
            .query_messages(&MessageQuery {
                phone: Some(phone.to_string()),
                order: MessageOrder::Newest,
                ..Default::default()
            })
            .await?;
        messages.sort_by_key(|m| std::cmp::Reverse(m.occurred_at()));
        Ok(messages)
    }

    /// Canonical phone, falling back to the bare digits for numbers the
    /// normalizer rejects.
    fn normalize(&self, raw: &str) -> Result<NormalizedPhone, HeraldError> {
        let mut phone = self.shared.phones.normalize(raw);
        if !phone.is_valid {
            phone.canonical = digits_only(raw);
        }
        if phone.canonical.is_empty() {
            return Err(HeraldError::validation("PHONE_REQUIRED", "phone is required"));
        }
        Ok(phone)
    }
}

/// Campaign of the newest outbound message that has one.
fn newest_outbound_campaign(messages: &[MessageJob]) -> Option<String> {
    messages
        .iter()
        .filter(|m| m.direction == Direction::Outbound && m.campaign_id.is_some())
        .max_by_key(|m| m.occurred_at())
        .and_then(|m| m.campaign_id.clone())
}

fn to_chrono(window: Duration) -> Result<ChronoDuration, HeraldError> {
    ChronoDuration::from_std(window)
        .map_err(|e| HeraldError::Internal(format!("invalid dedup window: {e}")))
}
