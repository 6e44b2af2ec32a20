// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event names carried in the envelope `event` field.

pub const QUEUE_RESERVED: &str = "messages.queue.reserved";
pub const QUEUE_REQUEUED: &str = "messages.queue.requeued";
pub const STATUS_UPDATED: &str = "messages.status.updated";
pub const MESSAGE_RETRIED: &str = "messages.retried";
pub const MESSAGE_EDITED: &str = "messages.edited";

pub const CAMPAIGN_CREATED: &str = "campaign.created";
pub const CAMPAIGN_MESSAGES_QUEUED: &str = "campaign.messages.queued";
pub const CAMPAIGN_DELETED: &str = "campaign.deleted";
pub const CAMPAIGN_STATS_UPDATED: &str = "campaign.stats.updated";
pub const CAMPAIGN_STATUS_UPDATED: &str = "campaign.status.updated";

pub const ASSIGNMENT_UPDATED: &str = "conversation.assignment.updated";
pub const ASSIGNMENT_RELEASED: &str = "conversation.assignment.released";

pub const INBOUND_RECEIVED: &str = "messages.inbound.received";
pub const INBOUND_DUPLICATE: &str = "messages.inbound.duplicate";
pub const MANUAL_OUTBOUND_SENT: &str = "messages.outbound.manual_sent";
pub const MANUAL_OUTBOUND_DUPLICATE: &str = "messages.outbound.duplicate";
pub const HISTORY_SYNCED: &str = "messages.history.synced";

pub const SERVER_STARTED: &str = "system.server_started";
