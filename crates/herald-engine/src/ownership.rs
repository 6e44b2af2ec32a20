// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation ownership lock.
//!
//! At most one active [`OwnershipRecord`] exists per phone. Writes are
//! optimistic: every update is guarded on the `updated_at` value it was read
//! with, and a lost race is retried against the fresh record. Concurrent
//! first assignments collide on the store's uniqueness constraint and the
//! loser retries as a transfer.

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use herald_bus::events;
use herald_core::types::now;
use herald_core::{
    HeraldError, MessageJob, MessageOrder, MessageQuery, OwnershipInsert, OwnershipRecord,
    Timestamp,
};

use crate::{Shared, version_after};

const WRITE_ATTEMPTS: usize = 5;

/// Result of [`OwnershipLock::assign`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub record: OwnershipRecord,
    /// True when a new record was opened rather than an existing one transferred.
    pub created: bool,
}

#[derive(Clone)]
pub struct OwnershipLock {
    shared: Shared,
}

impl OwnershipLock {
    pub(crate) fn new(shared: Shared) -> Self {
        Self { shared }
    }

    /// Grants `operator` custody of the conversation with `phone`.
    ///
    /// Fails with a conflict naming the current owner when another operator
    /// holds it and `force` is false.
    pub async fn assign(
        &self,
        phone: &str,
        operator: &str,
        assigned_by: Option<&str>,
        campaign_id: Option<&str>,
        force: bool,
    ) -> Result<Assignment, HeraldError> {
        let phone = self.canonical(phone)?;
        let operator = required_operator(operator)?;
        let assigned_by = assigned_by
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(operator);
        let campaign_id = campaign_id
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        for attempt in 1..=WRITE_ATTEMPTS {
            let assignment = match self.shared.store.active_ownership(&phone).await? {
                Some(current) => {
                    if !current.is_owned_by(operator) && !force {
                        return Err(HeraldError::Conflict {
                            code: "CONVERSATION_ALREADY_ASSIGNED",
                            message: format!(
                                "conversation {phone} is already assigned to {}",
                                current.assigned_to
                            ),
                            owner: current.assigned_to.clone(),
                            record: Box::new(current),
                        });
                    }
                    let expected = current.updated_at;
                    let mut record = current;
                    record.reassign(operator, assigned_by, campaign_id.clone(), version_after(expected));
                    if !self.shared.store.update_ownership(&record, expected).await? {
                        debug!(phone = %phone, attempt, "ownership changed concurrently, retrying");
                        continue;
                    }
                    Assignment {
                        record,
                        created: false,
                    }
                }
                None => {
                    let record = OwnershipRecord::open(
                        phone.clone(),
                        operator,
                        assigned_by,
                        campaign_id.clone(),
                        now(),
                    );
                    match self.shared.store.insert_ownership(&record).await? {
                        OwnershipInsert::Inserted => Assignment {
                            record,
                            created: true,
                        },
                        OwnershipInsert::ActiveExists => {
                            debug!(phone = %phone, attempt, "concurrent first assignment, retrying as transfer");
                            continue;
                        }
                    }
                }
            };

            info!(
                phone = %phone,
                operator = %assignment.record.assigned_to,
                created = assignment.created,
                force,
                "conversation assigned"
            );
            self.shared.bus.emit(
                events::ASSIGNMENT_UPDATED,
                json!({ "phone": phone, "assignment": assignment.record }),
            );
            return Ok(assignment);
        }

        Err(contended(&phone))
    }

    /// Closes the active record for `phone`.
    pub async fn release(
        &self,
        phone: &str,
        operator: &str,
        force: bool,
    ) -> Result<OwnershipRecord, HeraldError> {
        let phone = self.canonical(phone)?;
        let operator = required_operator(operator)?;

        for attempt in 1..=WRITE_ATTEMPTS {
            let Some(current) = self.shared.store.active_ownership(&phone).await? else {
                return Err(HeraldError::not_found(
                    "ASSIGNMENT_NOT_FOUND",
                    format!("conversation {phone} has no active assignment"),
                ));
            };
            if !current.is_owned_by(operator) && !force {
                return Err(HeraldError::Conflict {
                    code: "CONVERSATION_ASSIGNED_TO_OTHER_OPERATOR",
                    message: format!(
                        "conversation {phone} is assigned to {}",
                        current.assigned_to
                    ),
                    owner: current.assigned_to.clone(),
                    record: Box::new(current),
                });
            }

            let expected = current.updated_at;
            let mut record = current;
            record.close(version_after(expected));
            if !self.shared.store.update_ownership(&record, expected).await? {
                debug!(phone = %phone, attempt, "ownership changed concurrently, retrying release");
                continue;
            }

            info!(phone = %phone, operator, force, "conversation released");
            self.shared.bus.emit(
                events::ASSIGNMENT_RELEASED,
                json!({ "phone": phone, "assignment": record, "releasedBy": operator }),
            );
            return Ok(record);
        }

        Err(contended(&phone))
    }

    /// Succeeds only when `operator` holds the active record for `phone`.
    pub async fn require_ownership(
        &self,
        phone: &str,
        operator: &str,
    ) -> Result<OwnershipRecord, HeraldError> {
        let phone = self.canonical(phone)?;
        let operator = required_operator(operator)?;

        match self.shared.store.active_ownership(&phone).await? {
            None => Err(HeraldError::forbidden(
                "CONVERSATION_NOT_ASSIGNED",
                format!("conversation {phone} must be assigned before it can be accessed"),
            )),
            Some(record) if !record.is_owned_by(operator) => Err(HeraldError::forbidden(
                "CONVERSATION_ASSIGNED_TO_OTHER_OPERATOR",
                format!("conversation {phone} is assigned to {}", record.assigned_to),
            )),
            Some(record) => Ok(record),
        }
    }

    /// Active record for `phone`, if any.
    pub async fn current(&self, phone: &str) -> Result<Option<OwnershipRecord>, HeraldError> {
        let phone = self.canonical(phone)?;
        self.shared.store.active_ownership(&phone).await
    }

    /// Conversation history for the owning operator, oldest first, keeping
    /// the most recent `limit` messages.
    pub async fn history(
        &self,
        phone: &str,
        operator: &str,
        limit: Option<usize>,
    ) -> Result<Vec<MessageJob>, HeraldError> {
        let record = self.require_ownership(phone, operator).await?;
        let settings = &self.shared.settings;
        let limit = limit
            .unwrap_or(settings.history_default_limit)
            .clamp(1, settings.history_max_limit.max(1));

        let mut messages = self
            .shared
            .store
            .query_messages(&MessageQuery {
                phone: Some(record.phone),
                order: MessageOrder::Oldest,
                ..Default::default()
            })
            .await?;
        messages.sort_by_key(MessageJob::occurred_at);
        if messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }
        Ok(messages)
    }

    /// Moves `lastInboundAt` of the active record forward. Best-effort:
    /// failures are logged and reported as `false`.
    pub async fn touch_inbound(&self, phone: &str, at: Timestamp) -> bool {
        match self.try_touch_inbound(phone, at).await {
            Ok(touched) => touched,
            Err(e) => {
                warn!(phone, error = %e, "failed to refresh conversation inbound timestamp");
                false
            }
        }
    }

    async fn try_touch_inbound(&self, phone: &str, at: Timestamp) -> Result<bool, HeraldError> {
        for _ in 0..WRITE_ATTEMPTS {
            let Some(current) = self.shared.store.active_ownership(phone).await? else {
                return Ok(false);
            };
            let expected = current.updated_at;
            let mut record = current;
            if !record.touch_inbound(at, version_after(expected)) {
                return Ok(false);
            }
            if self.shared.store.update_ownership(&record, expected).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn canonical(&self, phone: &str) -> Result<String, HeraldError> {
        let phone = self.shared.phones.canonical_or_digits(phone);
        if phone.is_empty() {
            return Err(HeraldError::validation("PHONE_REQUIRED", "phone is required"));
        }
        Ok(phone)
    }
}

fn required_operator(operator: &str) -> Result<&str, HeraldError> {
    let operator = operator.trim();
    if operator.is_empty() {
        return Err(HeraldError::validation(
            "OPERATOR_REQUIRED",
            "operator identity is required",
        ));
    }
    Ok(operator)
}

fn contended(phone: &str) -> HeraldError {
    HeraldError::Internal(format!(
        "ownership of {phone} kept changing concurrently, giving up"
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::testing::{drain_events, engine};

    const PHONE: &str = "(11) 98765-4321";
    const CANONICAL: &str = "5511987654321";

    #[tokio::test]
    async fn takeover_requires_force_and_keeps_one_record() {
        let t = engine().await;
        let lock = &t.engine.ownership;

        let first = lock.assign(PHONE, "Ana", None, None, false).await.unwrap();
        assert!(first.created);
        assert_eq!(first.record.phone, CANONICAL);

        let err = lock.assign(PHONE, "Beto", None, None, false).await.unwrap_err();
        assert_eq!(err.http_status(), 409);
        match &err {
            HeraldError::Conflict { owner, .. } => assert_eq!(owner, "Ana"),
            other => panic!("expected conflict, got {other:?}"),
        }

        let taken = lock.assign(PHONE, "Beto", Some("lead"), None, true).await.unwrap();
        assert!(!taken.created);
        assert_eq!(taken.record.id, first.record.id);
        assert_eq!(taken.record.assigned_to, "Beto");
        assert_eq!(taken.record.assigned_by, "lead");

        let active = t.store.list_active_ownerships().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].assigned_to, "Beto");
    }

    #[tokio::test]
    async fn reassigning_to_the_same_operator_needs_no_force() {
        let t = engine().await;
        let lock = &t.engine.ownership;
        lock.assign(PHONE, "Ana", None, Some("c1"), false).await.unwrap();
        let again = lock.assign(PHONE, "Ana", None, None, false).await.unwrap();
        assert_eq!(again.record.campaign_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn concurrent_first_assignments_leave_one_active_record() {
        let t = engine().await;
        let lock = Arc::new(t.engine.ownership.clone());

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let lock = Arc::clone(&lock);
                tokio::spawn(async move {
                    lock.assign(PHONE, &format!("op{i}"), None, None, true).await
                })
            })
            .collect();
        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().created {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(t.store.list_active_ownerships().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn release_rules() {
        let t = engine().await;
        let lock = &t.engine.ownership;

        let err = lock.release(PHONE, "Ana", false).await.unwrap_err();
        assert_eq!(err.code(), "ASSIGNMENT_NOT_FOUND");

        lock.assign(PHONE, "Ana", None, None, false).await.unwrap();
        let err = lock.release(PHONE, "Beto", false).await.unwrap_err();
        assert_eq!(err.code(), "CONVERSATION_ASSIGNED_TO_OTHER_OPERATOR");
        assert_eq!(err.http_status(), 409);

        let mut rx = t.bus.subscribe();
        let closed = lock.release(PHONE, "Beto", true).await.unwrap();
        assert!(!closed.is_active());
        assert!(closed.closed_at.is_some());
        assert_eq!(drain_events(&mut rx), vec![events::ASSIGNMENT_RELEASED]);
        assert!(lock.current(PHONE).await.unwrap().is_none());

        let reopened = lock.assign(PHONE, "Beto", None, None, false).await.unwrap();
        assert!(reopened.created);
    }

    #[tokio::test]
    async fn require_ownership_is_fail_closed() {
        let t = engine().await;
        let lock = &t.engine.ownership;

        let err = lock.require_ownership(PHONE, "Ana").await.unwrap_err();
        assert_eq!(err.code(), "CONVERSATION_NOT_ASSIGNED");
        assert_eq!(err.http_status(), 403);

        lock.assign(PHONE, "Ana", None, None, false).await.unwrap();
        let err = lock.require_ownership(PHONE, "Beto").await.unwrap_err();
        assert_eq!(err.code(), "CONVERSATION_ASSIGNED_TO_OTHER_OPERATOR");
        assert_eq!(err.http_status(), 403);

        assert!(lock.require_ownership("+55 11 98765-4321", "Ana").await.is_ok());

        let err = lock.require_ownership(PHONE, " ").await.unwrap_err();
        assert_eq!(err.code(), "OPERATOR_REQUIRED");
        let err = lock.assign("", "Ana", None, None, false).await.unwrap_err();
        assert_eq!(err.code(), "PHONE_REQUIRED");
    }

    #[tokio::test]
    async fn touch_inbound_moves_forward_only() {
        let t = engine().await;
        let lock = &t.engine.ownership;
        assert!(!lock.touch_inbound(CANONICAL, now()).await);

        lock.assign(PHONE, "Ana", None, None, false).await.unwrap();
        let at = now();
        assert!(lock.touch_inbound(CANONICAL, at).await);
        assert!(!lock.touch_inbound(CANONICAL, at - ChronoDuration::seconds(30)).await);
        let record = lock.current(PHONE).await.unwrap().unwrap();
        assert_eq!(record.last_inbound_at, Some(at));
    }
}
