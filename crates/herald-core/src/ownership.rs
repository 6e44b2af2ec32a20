// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation ownership records.

use serde::{Deserialize, Serialize};

use crate::types::{OwnershipStatus, Timestamp, new_id};

/// Exclusive operator custody over one counterpart's conversation.
///
/// At most one record per phone is `active` at any time; a transfer mutates
/// that record instead of opening a second one. Closed records are kept as
/// history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipRecord {
    pub id: String,
    pub phone: String,
    pub campaign_id: Option<String>,
    pub assigned_to: String,
    pub assigned_by: String,
    pub status: OwnershipStatus,
    pub assigned_at: Timestamp,
    pub last_inbound_at: Option<Timestamp>,
    pub closed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl OwnershipRecord {
    pub fn open(
        phone: impl Into<String>,
        operator: impl Into<String>,
        assigned_by: impl Into<String>,
        campaign_id: Option<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: new_id(),
            phone: phone.into(),
            campaign_id,
            assigned_to: operator.into(),
            assigned_by: assigned_by.into(),
            status: OwnershipStatus::Active,
            assigned_at: now,
            last_inbound_at: None,
            closed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == OwnershipStatus::Active
    }

    pub fn is_owned_by(&self, operator: &str) -> bool {
        self.assigned_to == operator
    }

    /// Hands the record to `operator`. Keeps the campaign when none is given.
    pub fn reassign(
        &mut self,
        operator: &str,
        assigned_by: &str,
        campaign_id: Option<String>,
        now: Timestamp,
    ) {
        self.assigned_to = operator.to_string();
        self.assigned_by = assigned_by.to_string();
        if campaign_id.is_some() {
            self.campaign_id = campaign_id;
        }
        self.status = OwnershipStatus::Active;
        self.assigned_at = now;
        self.closed_at = None;
        self.updated_at = now;
    }

    pub fn close(&mut self, now: Timestamp) {
        self.status = OwnershipStatus::Closed;
        self.closed_at = Some(now);
        self.updated_at = now;
    }

    /// Moves `lastInboundAt` forward. Returns false when `at` is not newer.
    pub fn touch_inbound(&mut self, at: Timestamp, now: Timestamp) -> bool {
        if self.last_inbound_at.is_some_and(|last| last >= at) {
            return false;
        }
        self.last_inbound_at = Some(at);
        self.updated_at = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now;
    use chrono::Duration;

    #[test]
    fn reassign_keeps_campaign_when_absent() {
        let t0 = now();
        let mut record = OwnershipRecord::open("5511987654321", "ana", "ana", Some("c1".into()), t0);
        record.close(t0);
        record.reassign("beto", "lead", None, t0 + Duration::seconds(5));
        assert!(record.is_active());
        assert!(record.is_owned_by("beto"));
        assert_eq!(record.assigned_by, "lead");
        assert_eq!(record.campaign_id.as_deref(), Some("c1"));
        assert!(record.closed_at.is_none());
    }

    #[test]
    fn touch_inbound_only_moves_forward() {
        let t0 = now();
        let mut record = OwnershipRecord::open("5511987654321", "ana", "ana", None, t0);
        assert!(record.touch_inbound(t0, t0));
        assert!(!record.touch_inbound(t0 - Duration::seconds(10), t0));
        assert!(record.touch_inbound(t0 + Duration::seconds(10), t0));
        assert_eq!(record.last_inbound_at, Some(t0 + Duration::seconds(10)));
    }
}
