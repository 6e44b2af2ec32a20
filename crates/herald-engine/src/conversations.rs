// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbox view: messages grouped into one summary per counterpart phone.

use std::collections::HashMap;

use serde::Serialize;

use herald_core::{Direction, HeraldError, JobStatus, MessageQuery, OwnershipRecord, Timestamp};

use crate::Shared;

const DEFAULT_LIMIT: usize = 300;
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Clone, Default)]
pub struct ConversationFilter {
    /// Case-insensitive match on phone, contact name, or owning operator.
    pub search: Option<String>,
    pub only_with_replies: bool,
    pub only_assigned: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub phone: String,
    pub name: String,
    pub campaign_id: Option<String>,
    pub outbound_count: usize,
    pub inbound_count: usize,
    pub failed_count: usize,
    pub last_at: Timestamp,
    pub last_message: String,
    pub last_direction: Direction,
    pub last_status: JobStatus,
    pub has_response: bool,
    pub assignment: Option<OwnershipRecord>,
}

impl ConversationSummary {
    fn matches(&self, needle: &str) -> bool {
        self.phone.to_lowercase().contains(needle)
            || self.name.to_lowercase().contains(needle)
            || self
                .assignment
                .as_ref()
                .is_some_and(|a| a.assigned_to.to_lowercase().contains(needle))
    }
}

#[derive(Clone)]
pub struct Conversations {
    shared: Shared,
}

impl Conversations {
    pub(crate) fn new(shared: Shared) -> Self {
        Self { shared }
    }

    /// One summary per phone, most recent activity first.
    pub async fn list(
        &self,
        filter: ConversationFilter,
    ) -> Result<Vec<ConversationSummary>, HeraldError> {
        let messages = self
            .shared
            .store
            .query_messages(&MessageQuery::default())
            .await?;
        let mut owners: HashMap<String, OwnershipRecord> = self
            .shared
            .store
            .list_active_ownerships()
            .await?
            .into_iter()
            .map(|record| (record.phone.clone(), record))
            .collect();

        let mut by_phone: HashMap<String, ConversationSummary> = HashMap::new();
        for message in messages {
            let summary = by_phone
                .entry(message.phone.clone())
                .or_insert_with(|| ConversationSummary {
                    phone: message.phone.clone(),
                    name: String::new(),
                    campaign_id: None,
                    outbound_count: 0,
                    inbound_count: 0,
                    failed_count: 0,
                    last_at: message.updated_at,
                    last_message: String::new(),
                    last_direction: message.direction,
                    last_status: message.status,
                    has_response: false,
                    assignment: None,
                });

            match message.direction {
                Direction::Inbound => summary.inbound_count += 1,
                Direction::Outbound => summary.outbound_count += 1,
            }
            if message.status == JobStatus::Failed {
                summary.failed_count += 1;
            }
            if summary.campaign_id.is_none() {
                summary.campaign_id = message.campaign_id.clone();
            }
            if summary.name.is_empty() && !message.name.is_empty() {
                summary.name = message.name.clone();
            }

            if message.updated_at >= summary.last_at {
                summary.last_at = message.updated_at;
                summary.last_message = message.text;
                summary.last_direction = message.direction;
                summary.last_status = message.status;
                if !message.name.is_empty() {
                    summary.name = message.name;
                }
                if message.campaign_id.is_some() {
                    summary.campaign_id = message.campaign_id;
                }
            }
        }

        let needle = filter
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        let mut list: Vec<ConversationSummary> = by_phone
            .into_values()
            .map(|mut summary| {
                summary.has_response = summary.inbound_count > 0;
                summary.assignment = owners.remove(&summary.phone);
                if summary.name.is_empty() {
                    summary.name = summary.phone.clone();
                }
                summary
            })
            .filter(|s| !filter.only_with_replies || s.has_response)
            .filter(|s| !filter.only_assigned || s.assignment.is_some())
            .filter(|s| needle.as_deref().is_none_or(|n| s.matches(n)))
            .collect();
        list.sort_by(|a, b| b.last_at.cmp(&a.last_at).then_with(|| a.phone.cmp(&b.phone)));
        list.truncate(limit);
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::engine;
    use crate::{CaptureRequest, ContactInput, NewCampaign};

    #[tokio::test]
    async fn groups_messages_by_phone() {
        let t = engine().await;
        t.engine
            .campaigns
            .create(NewCampaign {
                name: "Inbox".into(),
                message_template: "Hi {name}".into(),
                contacts: vec![
                    ContactInput {
                        phone: "11987654321".into(),
                        name: "Maria".into(),
                        variables: None,
                    },
                    ContactInput {
                        phone: "11912345678".into(),
                        name: "Joao".into(),
                        variables: None,
                    },
                ],
                ..Default::default()
            })
            .await
            .unwrap();
        t.engine
            .reconciler
            .capture_inbound(CaptureRequest {
                phone: "11987654321".into(),
                text: "who is this?".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        t.engine
            .ownership
            .assign("11987654321", "Ana", None, None, false)
            .await
            .unwrap();

        let all = t
            .engine
            .conversations
            .list(ConversationFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        let maria = all.iter().find(|c| c.phone == "5511987654321").unwrap();
        assert_eq!(maria.outbound_count, 1);
        assert_eq!(maria.inbound_count, 1);
        assert!(maria.has_response);
        assert_eq!(maria.last_message, "who is this?");
        assert_eq!(maria.last_direction, Direction::Inbound);
        assert_eq!(maria.name, "Maria");
        assert_eq!(maria.assignment.as_ref().unwrap().assigned_to, "Ana");

        let replies = t
            .engine
            .conversations
            .list(ConversationFilter {
                only_with_replies: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(replies.len(), 1);

        let assigned = t
            .engine
            .conversations
            .list(ConversationFilter {
                only_assigned: true,
                search: Some("ANA".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].phone, "5511987654321");

        let joao = t
            .engine
            .conversations
            .list(ConversationFilter {
                search: Some("joao".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(joao.len(), 1);
        assert!(joao[0].assignment.is_none());
    }
}
