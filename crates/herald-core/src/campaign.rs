// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign aggregate: definition, anti-automation delay, and running totals.

use serde::{Deserialize, Serialize};

use crate::types::{CampaignStatus, JobStatus, Timestamp};

/// Default lower bound of the inter-message delay, in seconds.
pub const DEFAULT_DELAY_MIN_SECONDS: u32 = 0;
/// Default upper bound of the inter-message delay, in seconds.
pub const DEFAULT_DELAY_MAX_SECONDS: u32 = 120;
/// Hard ceiling for either delay bound.
pub const DELAY_CEILING_SECONDS: u32 = 3600;

/// Randomized pause the sending client waits between messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayRange {
    pub min_seconds: u32,
    pub max_seconds: u32,
}

impl Default for DelayRange {
    fn default() -> Self {
        Self {
            min_seconds: DEFAULT_DELAY_MIN_SECONDS,
            max_seconds: DEFAULT_DELAY_MAX_SECONDS,
        }
    }
}

impl DelayRange {
    /// Builds a range from optional client input: clamps both bounds to
    /// `[0, 3600]` and swaps them when reversed.
    pub fn clamped(min: Option<i64>, max: Option<i64>) -> Self {
        let clamp = |v: i64| v.clamp(0, i64::from(DELAY_CEILING_SECONDS)) as u32;
        let min = min.map(clamp).unwrap_or(DEFAULT_DELAY_MIN_SECONDS);
        let max = max.map(clamp).unwrap_or(DEFAULT_DELAY_MAX_SECONDS);
        if max < min {
            Self {
                min_seconds: max,
                max_seconds: min,
            }
        } else {
            Self {
                min_seconds: min,
                max_seconds: max,
            }
        }
    }
}

/// Running totals. `pending` is derived, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStats {
    pub total: u32,
    pub sent: u32,
    pub failed: u32,
}

impl CampaignStats {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            sent: 0,
            failed: 0,
        }
    }

    pub fn pending(&self) -> u32 {
        self.total.saturating_sub(self.sent + self.failed)
    }

    /// Applies a transition delta. Decrements never go below zero.
    pub fn apply(&mut self, delta: StatDelta) {
        self.sent = shift(self.sent, delta.sent);
        self.failed = shift(self.failed, delta.failed);
    }
}

fn shift(value: u32, by: i8) -> u32 {
    match by {
        0 => value,
        d if d > 0 => value.saturating_add(d as u32),
        d => value.saturating_sub(d.unsigned_abs() as u32),
    }
}

/// Change to the sent/failed buckets caused by one job status transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatDelta {
    pub sent: i8,
    pub failed: i8,
}

impl StatDelta {
    /// Computes the delta for `prev -> next`: the bucket of the previous status
    /// loses one, the bucket of the new status gains one. Identity transitions
    /// and transitions between unbucketed statuses produce no change.
    pub fn between(prev: JobStatus, next: JobStatus) -> Self {
        if prev == next {
            return Self::default();
        }
        let mut delta = Self::default();
        match prev {
            JobStatus::Sent => delta.sent -= 1,
            JobStatus::Failed => delta.failed -= 1,
            JobStatus::Pending | JobStatus::Processing => {}
        }
        match next {
            JobStatus::Sent => delta.sent += 1,
            JobStatus::Failed => delta.failed += 1,
            JobStatus::Pending | JobStatus::Processing => {}
        }
        delta
    }

    pub fn is_zero(&self) -> bool {
        self.sent == 0 && self.failed == 0
    }
}

/// Optional attachment sent alongside every message of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    pub url: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub message_template: String,
    pub message_variants: Vec<String>,
    pub turbo: bool,
    pub status: CampaignStatus,
    pub delay: DelayRange,
    pub stats: CampaignStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Campaign fields projected next to a reserved job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignProjection {
    pub id: String,
    pub name: String,
    pub delay: DelayRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
}

impl From<&Campaign> for CampaignProjection {
    fn from(campaign: &Campaign) -> Self {
        Self {
            id: campaign.id.clone(),
            name: campaign.name.clone(),
            delay: campaign.delay,
            media: campaign.media.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn delay_defaults_apply_when_missing() {
        assert_eq!(DelayRange::clamped(None, None), DelayRange::default());
    }

    #[test]
    fn delay_is_clamped_and_swapped() {
        let range = DelayRange::clamped(Some(5000), Some(-3));
        assert_eq!(range.min_seconds, 0);
        assert_eq!(range.max_seconds, 3600);

        let range = DelayRange::clamped(Some(30), Some(10));
        assert_eq!((range.min_seconds, range.max_seconds), (10, 30));
    }

    #[test]
    fn delta_between_statuses() {
        use JobStatus::*;
        assert_eq!(StatDelta::between(Processing, Sent), StatDelta { sent: 1, failed: 0 });
        assert_eq!(StatDelta::between(Sent, Pending), StatDelta { sent: -1, failed: 0 });
        assert_eq!(StatDelta::between(Failed, Sent), StatDelta { sent: 1, failed: -1 });
        assert!(StatDelta::between(Sent, Sent).is_zero());
        assert!(StatDelta::between(Pending, Processing).is_zero());
    }

    #[test]
    fn apply_never_underflows() {
        let mut stats = CampaignStats::new(3);
        stats.apply(StatDelta { sent: -1, failed: -1 });
        assert_eq!(stats, CampaignStats::new(3));
        assert_eq!(stats.pending(), 3);
    }

    fn any_status() -> impl Strategy<Value = JobStatus> {
        prop_oneof![
            Just(JobStatus::Pending),
            Just(JobStatus::Processing),
            Just(JobStatus::Sent),
            Just(JobStatus::Failed),
        ]
    }

    proptest! {
        #[test]
        fn counters_track_job_statuses(
            total in 1usize..20,
            moves in proptest::collection::vec((0usize..20, any_status()), 0..200),
        ) {
            let mut jobs = vec![JobStatus::Pending; total];
            let mut stats = CampaignStats::new(total as u32);
            for (idx, next) in moves {
                let idx = idx % total;
                let prev = jobs[idx];
                stats.apply(StatDelta::between(prev, next));
                jobs[idx] = next;

                prop_assert!(stats.sent + stats.failed <= stats.total);
            }
            let sent = jobs.iter().filter(|s| **s == JobStatus::Sent).count() as u32;
            let failed = jobs.iter().filter(|s| **s == JobStatus::Failed).count() as u32;
            prop_assert_eq!(stats.sent, sent);
            prop_assert_eq!(stats.failed, failed);
        }
    }
}
