// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign creation, status control, listing, and removal.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use herald_bus::events;
use herald_core::types::{new_id, now};
use herald_core::{
    Campaign, CampaignStats, CampaignStatus, DelayRange, HeraldError, MediaRef, MessageJob,
    MessageOrder, MessageQuery, JobStatus,
};

use crate::Shared;

/// One recipient of a new campaign.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInput {
    pub phone: String,
    #[serde(default)]
    pub name: String,
    /// Extra `{placeholder}` values for the template.
    #[serde(default)]
    pub variables: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCampaign {
    pub name: String,
    #[serde(default)]
    pub message_template: String,
    #[serde(default)]
    pub message_variants: Vec<String>,
    #[serde(default)]
    pub turbo: bool,
    #[serde(default)]
    pub contacts: Vec<ContactInput>,
    #[serde(default)]
    pub media: Option<MediaRef>,
    #[serde(default)]
    pub min_delay_seconds: Option<i64>,
    #[serde(default)]
    pub max_delay_seconds: Option<i64>,
    /// Nested delay bounds. A value here wins over the top-level field.
    #[serde(default)]
    pub anti_ban: Option<AntiBan>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntiBan {
    #[serde(default)]
    pub min_delay_seconds: Option<i64>,
    #[serde(default)]
    pub max_delay_seconds: Option<i64>,
}

impl NewCampaign {
    fn delay(&self) -> DelayRange {
        let nested = self.anti_ban.as_ref();
        DelayRange::clamped(
            nested
                .and_then(|a| a.min_delay_seconds)
                .or(self.min_delay_seconds),
            nested
                .and_then(|a| a.max_delay_seconds)
                .or(self.max_delay_seconds),
        )
    }
}

/// A campaign together with its failed jobs, newest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignFailures {
    pub campaign: Campaign,
    pub failures: Vec<MessageJob>,
}

#[derive(Clone)]
pub struct CampaignService {
    shared: Shared,
}

impl CampaignService {
    pub(crate) fn new(shared: Shared) -> Self {
        Self { shared }
    }

    /// Creates a running campaign and one pending job per contact.
    pub async fn create(&self, input: NewCampaign) -> Result<Campaign, HeraldError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(HeraldError::validation(
                "CAMPAIGN_NAME_REQUIRED",
                "campaign name is required",
            ));
        }

        let variants = sanitize_variants(&input.message_variants, &input.message_template);
        let rotate = input.turbo && variants.len() > 1 && input.contacts.len() > 1;
        let template = input.message_template.trim();
        let fallback = if template.is_empty() {
            variants.first().map(String::as_str).unwrap_or_default()
        } else {
            template
        };

        let at = now();
        let campaign = Campaign {
            id: new_id(),
            name,
            message_template: input.message_template.clone(),
            message_variants: variants.clone(),
            turbo: rotate,
            status: CampaignStatus::Running,
            delay: input.delay(),
            stats: CampaignStats::new(input.contacts.len() as u32),
            media: input.media,
            created_at: at,
            updated_at: at,
        };

        let mut jobs = Vec::with_capacity(input.contacts.len());
        for (index, contact) in input.contacts.iter().enumerate() {
            let phone = self.shared.phones.normalize(&contact.phone);
            if phone.canonical.is_empty() {
                return Err(HeraldError::validation(
                    "CONTACT_PHONE_REQUIRED",
                    format!("contact #{} has no phone number", index + 1),
                ));
            }
            let template = if rotate {
                variants[index % variants.len()].as_str()
            } else {
                fallback
            };
            let text = render(template, &contact.name, contact.variables.as_ref());
            jobs.push(MessageJob::queued(
                &campaign.id,
                &phone,
                contact.name.clone(),
                contact.variables.clone(),
                text,
                at,
            ));
        }

        self.shared.store.create_campaign(&campaign, &jobs).await?;
        info!(
            campaign_id = %campaign.id,
            jobs = jobs.len(),
            turbo = campaign.turbo,
            "campaign created"
        );

        self.shared.bus.emit(
            events::CAMPAIGN_CREATED,
            json!({
                "campaign": {
                    "id": campaign.id,
                    "name": campaign.name,
                    "status": campaign.status,
                    "stats": campaign.stats,
                    "createdAt": campaign.created_at,
                },
                "queuedMessages": jobs.len(),
            }),
        );
        self.shared.bus.emit(
            events::CAMPAIGN_MESSAGES_QUEUED,
            json!({ "campaignId": campaign.id, "count": jobs.len() }),
        );

        Ok(campaign)
    }

    /// Campaigns newest first.
    pub async fn list(&self, status: Option<CampaignStatus>) -> Result<Vec<Campaign>, HeraldError> {
        self.shared.store.list_campaigns(status).await
    }

    pub async fn get(&self, id: &str) -> Result<Campaign, HeraldError> {
        self.shared
            .store
            .get_campaign(id)
            .await?
            .ok_or_else(|| campaign_not_found(id))
    }

    pub async fn failures(&self, id: &str) -> Result<CampaignFailures, HeraldError> {
        let campaign = self.get(id).await?;
        let failures = self
            .shared
            .store
            .query_messages(&MessageQuery {
                campaign_id: Some(campaign.id.clone()),
                status: Some(JobStatus::Failed),
                order: MessageOrder::Newest,
                ..Default::default()
            })
            .await?;
        Ok(CampaignFailures { campaign, failures })
    }

    /// Pauses, resumes, or completes a campaign. Only running campaigns feed the queue.
    pub async fn set_status(&self, id: &str, status: CampaignStatus) -> Result<Campaign, HeraldError> {
        let campaign = self
            .shared
            .store
            .set_campaign_status(id, status, now())
            .await?
            .ok_or_else(|| campaign_not_found(id))?;
        info!(campaign_id = %id, status = %status, "campaign status changed");
        self.shared.bus.emit(
            events::CAMPAIGN_STATUS_UPDATED,
            json!({
                "campaignId": campaign.id,
                "status": campaign.status,
                "updatedAt": campaign.updated_at,
            }),
        );
        Ok(campaign)
    }

    /// Removes a campaign and all of its jobs.
    pub async fn delete(&self, id: &str) -> Result<Campaign, HeraldError> {
        let campaign = self.get(id).await?;
        if !self.shared.store.delete_campaign(id).await? {
            return Err(campaign_not_found(id));
        }
        info!(campaign_id = %id, "campaign deleted");
        self.shared.bus.emit(
            events::CAMPAIGN_DELETED,
            json!({ "campaignId": campaign.id, "name": campaign.name }),
        );
        Ok(campaign)
    }
}

fn campaign_not_found(id: &str) -> HeraldError {
    HeraldError::not_found("CAMPAIGN_NOT_FOUND", format!("campaign {id} not found"))
}

/// Trimmed, de-duplicated variants with the base template first.
fn sanitize_variants(variants: &[String], template: &str) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();
    for variant in variants {
        let text = variant.trim();
        if !text.is_empty() && !unique.iter().any(|v| v == text) {
            unique.push(text.to_string());
        }
    }
    let base = template.trim();
    if !base.is_empty() && !unique.iter().any(|v| v == base) {
        unique.insert(0, base.to_string());
    }
    unique
}

/// Substitutes `{name}` and `{<variable>}` placeholders.
fn render(template: &str, name: &str, variables: Option<&Value>) -> String {
    let mut text = template.replace("{name}", name);
    if let Some(Value::Object(map)) = variables {
        for (key, value) in map {
            let replacement = match value {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            text = text.replace(&format!("{{{key}}}"), &replacement);
        }
    }
    text
}
