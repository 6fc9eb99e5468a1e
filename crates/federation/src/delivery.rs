//! Per-inbox delivery batches.
//!
//! Every pending [`delivery_target`](weft_db::entities::delivery_target) of
//! one inbox is attempted oldest first. A server failure ends the batch; the
//! remaining rows wait for the next sweep untouched.

#![allow(missing_docs)]

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{debug, info, warn};
use weft_common::AppResult;
use weft_db::entities::{delivery_target, inbox_status};

use crate::client::{PostOutcome, SenderContext};
use crate::context::FederationContext;
use crate::store::OutgoingVerb;
use crate::tasks::{Priority, Task};
use crate::transmitter::Transmitter;

/// Classification of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Success,
    /// The node is unreachable or overloaded; the rest of the batch waits.
    ServerFailure,
    /// The node refused this particular activity.
    ClientFailure,
}

/// Status and timing table deciding how an attempt failed.
#[derive(Debug, Clone, Copy)]
pub struct FailurePolicy {
    pub network_timeout: Duration,
    pub signature_timeout: Duration,
}

impl FailurePolicy {
    #[must_use]
    pub const fn new(network_timeout: Duration, signature_timeout: Duration) -> Self {
        Self {
            network_timeout,
            signature_timeout,
        }
    }

    /// A 2xx is a success however long it took; timing only grades failures.
    #[must_use]
    pub fn classify(&self, outcome: &PostOutcome) -> FailureClass {
        if (200..=299).contains(&outcome.status) && !outcome.timed_out {
            return FailureClass::Success;
        }
        if outcome.timed_out
            || outcome.elapsed > self.network_timeout
            || outcome.elapsed > self.signature_timeout
        {
            return FailureClass::ServerFailure;
        }
        match outcome.status {
            0 | 404 | 408 | 429 | 500..=599 => FailureClass::ServerFailure,
            _ => FailureClass::ClientFailure,
        }
    }
}

/// Counters of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub dropped: usize,
    /// Attempted and kept for a later sweep.
    pub retrying: usize,
    /// Left untouched after a server failure.
    pub skipped: usize,
    /// The inbox was archived and every target discarded.
    pub archived: bool,
}

enum Attempt {
    Delivered,
    /// Nothing left to send; says nothing about the inbox.
    Discarded,
    Dropped,
    Retry,
    /// Server failure; `dropped` when the row also hit the failure ceiling.
    Abort { dropped: bool },
}

/// Delivers pending targets inbox by inbox.
#[derive(Clone)]
pub struct DeliveryWorker {
    ctx: FederationContext,
    policy: FailurePolicy,
}

impl DeliveryWorker {
    #[must_use]
    pub fn new(ctx: FederationContext) -> Self {
        let delivery = &ctx.settings.delivery;
        let policy = FailurePolicy::new(
            Duration::from_secs(delivery.network_timeout_secs),
            Duration::from_secs(delivery.signature_timeout_secs),
        );
        Self { ctx, policy }
    }

    /// Attempt every pending target of `inbox`.
    pub async fn deliver_inbox(&self, inbox: &str) -> AppResult<DeliveryReport> {
        let mut report = DeliveryReport::default();
        let status = self.ctx.status_store.find_status(inbox).await?;

        if status.as_ref().is_some_and(|s| s.archived) {
            let removed = self.ctx.delivery_store.remove_targets_for_inbox(inbox).await?;
            let receivers = receivers_of(&removed);
            self.ctx.contacts.mark_for_archival(&receivers).await?;
            report.dropped = removed.len();
            report.archived = true;
            info!(inbox = %inbox, dropped = report.dropped, "Inbox archived; targets dropped");
            return Ok(report);
        }

        let targets = self.ctx.delivery_store.find_targets_for_inbox(inbox).await?;
        if targets.is_empty() {
            debug!(inbox = %inbox, "Nothing to deliver");
            return Ok(report);
        }

        let mut status = status.unwrap_or_else(|| inbox_status::Model::unknown(inbox));
        let mut succeeded = false;
        let mut failed = false;
        let total = targets.len();

        for (attempted, target) in targets.iter().enumerate() {
            match self.attempt(inbox, target).await? {
                Attempt::Delivered => {
                    report.delivered += 1;
                    succeeded = true;
                }
                Attempt::Discarded => report.dropped += 1,
                Attempt::Dropped => {
                    report.dropped += 1;
                    failed = true;
                }
                Attempt::Retry => {
                    report.retrying += 1;
                    failed = true;
                }
                Attempt::Abort { dropped } => {
                    if dropped {
                        report.dropped += 1;
                    } else {
                        report.retrying += 1;
                    }
                    report.skipped = total - attempted - 1;
                    failed = true;
                    warn!(inbox = %inbox, skipped = report.skipped, "Server failure; batch aborted");
                    break;
                }
            }
        }

        if succeeded {
            record_success(&mut status);
        } else if failed {
            self.record_failure(&mut status);
            if status.archived {
                info!(inbox = %inbox, "Inbox archived after persistent failures");
            }
        }
        self.ctx.status_store.save_status(status).await?;

        self.refresh_receivers(&targets).await?;
        info!(inbox = %inbox, ?report, "Delivery batch finished");
        Ok(report)
    }

    async fn attempt(&self, inbox: &str, target: &delivery_target::Model) -> AppResult<Attempt> {
        let Some(item) = self.ctx.content.outgoing_item(target.uri_id).await? else {
            debug!(uri_id = target.uri_id, "Delivered item no longer exists");
            self.ctx.delivery_store.remove_target(target.id).await?;
            return Ok(Attempt::Discarded);
        };
        let Some(account) = self.ctx.contacts.account(item.uid).await? else {
            debug!(uri_id = target.uri_id, uid = item.uid, "Author no longer exists");
            self.ctx.delivery_store.remove_target(target.id).await?;
            return Ok(Attempt::Discarded);
        };

        let transmitter = Transmitter::new(self.ctx.clone());
        let perms = transmitter.permissions(&item, &account).await?;
        let document = transmitter.activity_document(&item, &account, &perms)?;
        let outcome = self
            .ctx
            .transport
            .post(&document, inbox, &SenderContext::from(&account))
            .await;

        match self.policy.classify(&outcome) {
            FailureClass::Success => {
                self.ctx.delivery_store.remove_target(target.id).await?;
                self.ctx
                    .contacts
                    .unmark_for_archival(&target.receiver_ids())
                    .await?;
                debug!(inbox = %inbox, uri_id = target.uri_id, "Delivered");
                Ok(Attempt::Delivered)
            }
            FailureClass::ServerFailure => {
                warn!(
                    inbox = %inbox,
                    uri_id = target.uri_id,
                    status = outcome.status,
                    timed_out = outcome.timed_out,
                    "Delivery failed on the remote server"
                );
                Ok(Attempt::Abort {
                    dropped: self.bump(target).await?,
                })
            }
            FailureClass::ClientFailure => {
                warn!(
                    inbox = %inbox,
                    uri_id = target.uri_id,
                    status = outcome.status,
                    "Delivery refused by the remote server"
                );
                if let Some(relay) = self.relay_for(inbox).await? {
                    if transmitter.send_relay_follow(&relay).await? {
                        info!(relay = %relay, "Relay resubscribed");
                        return Ok(if self.bump(target).await? {
                            Attempt::Dropped
                        } else {
                            Attempt::Retry
                        });
                    }
                    self.drop_target(target).await?;
                    return Ok(Attempt::Dropped);
                }
                if item.verb == OutgoingVerb::Delete {
                    self.drop_target(target).await?;
                    return Ok(Attempt::Dropped);
                }
                Ok(if self.bump(target).await? {
                    Attempt::Dropped
                } else {
                    Attempt::Retry
                })
            }
        }
    }

    /// Count a failed attempt; returns true when the row hit the ceiling and
    /// was dropped.
    async fn bump(&self, target: &delivery_target::Model) -> AppResult<bool> {
        let failed = self.ctx.delivery_store.increment_failed(target.id).await?;
        if failed >= self.ctx.settings.delivery.max_failures {
            info!(inbox = %target.inbox, uri_id = target.uri_id, failed, "Failure ceiling reached");
            self.drop_target(target).await?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn drop_target(&self, target: &delivery_target::Model) -> AppResult<()> {
        self.ctx.delivery_store.remove_target(target.id).await?;
        self.ctx
            .contacts
            .mark_for_archival(&target.receiver_ids())
            .await?;
        info!(inbox = %target.inbox, uri_id = target.uri_id, "Delivery dropped");
        Ok(())
    }

    /// The configured relay whose inbox this is.
    async fn relay_for(&self, inbox: &str) -> AppResult<Option<String>> {
        for relay in &self.ctx.settings.relays {
            if let Some(actor) = self.ctx.actors.get(relay).await? {
                if actor.inbox == inbox || actor.shared_inbox.as_deref() == Some(inbox) {
                    return Ok(Some(relay.clone()));
                }
            }
        }
        Ok(None)
    }

    fn record_failure(&self, status: &mut inbox_status::Model) {
        let now = Utc::now();
        status.failure_at = Some(now);
        let streak_started = match (status.first_failure_at, status.success_at) {
            (Some(first), Some(success)) if first < success => None,
            (first, _) => first,
        };
        let first = streak_started.unwrap_or(now);
        status.first_failure_at = Some(first);
        let limit = ChronoDuration::days(self.ctx.settings.delivery.archive_after_days);
        if now - first > limit {
            status.archived = true;
        }
    }

    /// Refresh the metadata of the first few receivers of a batch.
    async fn refresh_receivers(&self, targets: &[delivery_target::Model]) -> AppResult<()> {
        let limit = self.ctx.settings.delivery.refresh_receivers_limit;
        for id in receivers_of(targets).into_iter().take(limit) {
            if let Some(contact) = self.ctx.contacts.contact(id).await? {
                if let Err(e) = self.ctx.actors.refresh(&contact.url).await {
                    debug!(contact = %contact.url, error = %e, "Receiver refresh failed");
                }
            }
        }
        Ok(())
    }

    /// Schedule a batch for every inbox with pending targets.
    pub async fn sweep(&self) -> AppResult<usize> {
        let inboxes = self.ctx.delivery_store.pending_inboxes().await?;
        for inbox in &inboxes {
            self.ctx
                .runner
                .schedule(Priority::Low, Task::Deliver { inbox: inbox.clone() }, None)
                .await?;
        }
        debug!(inboxes = inboxes.len(), "Delivery sweep scheduled");
        Ok(inboxes.len())
    }
}

fn record_success(status: &mut inbox_status::Model) {
    status.success_at = Some(Utc::now());
    status.first_failure_at = None;
    status.archived = false;
}

fn receivers_of(targets: &[delivery_target::Model]) -> Vec<i64> {
    let mut ids: Vec<i64> = targets.iter().flat_map(delivery_target::Model::receiver_ids).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FailurePolicy {
        FailurePolicy::new(Duration::from_secs(30), Duration::from_secs(20))
    }

    #[test]
    fn test_classify_statuses() {
        let policy = policy();
        assert_eq!(policy.classify(&PostOutcome::with_status(202)), FailureClass::Success);
        for status in [0, 404, 408, 429, 500, 503] {
            assert_eq!(
                policy.classify(&PostOutcome::with_status(status)),
                FailureClass::ServerFailure,
                "status {status}"
            );
        }
        for status in [301, 400, 401, 403, 410, 422] {
            assert_eq!(
                policy.classify(&PostOutcome::with_status(status)),
                FailureClass::ClientFailure,
                "status {status}"
            );
        }
    }

    #[test]
    fn test_classify_slow_response_as_server_failure() {
        let policy = policy();
        let mut outcome = PostOutcome::with_status(400);
        outcome.elapsed = Duration::from_secs(25);
        assert_eq!(policy.classify(&outcome), FailureClass::ServerFailure);

        outcome.elapsed = Duration::ZERO;
        outcome.timed_out = true;
        assert_eq!(policy.classify(&outcome), FailureClass::ServerFailure);
    }

    #[test]
    fn test_classify_slow_success_as_success() {
        let policy = policy();
        let mut outcome = PostOutcome::with_status(202);
        outcome.elapsed = Duration::from_secs(25);
        assert_eq!(policy.classify(&outcome), FailureClass::Success);

        outcome.elapsed = Duration::from_secs(45);
        assert_eq!(policy.classify(&outcome), FailureClass::Success);
    }

    #[test]
    fn test_failure_streak_survives_until_success() {
        let mut status = inbox_status::Model::unknown("https://remote.example/inbox");
        let long_ago = Utc::now() - ChronoDuration::days(30);
        status.first_failure_at = Some(long_ago);
        record_success(&mut status);
        assert!(status.first_failure_at.is_none());
        assert!(!status.archived);
        assert!(status.success_at.is_some());
    }
}
