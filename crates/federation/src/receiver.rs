//! Admission of pushed and fetched activities.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use weft_common::{AppError, AppResult};

use crate::context::FederationContext;
use crate::document::{IncomingActivity, Verb};
use crate::fetch::{Completion, FetchQueue, FetchRequest};
use crate::queue::{InboundQueue, PUBLIC_RECEIVER};
use crate::settings::RelayScope;
use crate::tasks::{Priority, Task};
use crate::trust::evaluate_trust;

/// What happened to a pushed activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Stored; `scheduled` when processing was handed to a worker or done inline.
    Queued { entry_id: i64, scheduled: bool },
    /// Untrusted content stored pending a fetch from its origin.
    PendingFetch { entry_id: i64 },
    /// Already seen.
    Duplicate,
}

/// Short-lived memory of recently arrived activity ids.
pub struct ArrivedCache {
    window: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl ArrivedCache {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Record a key; returns false when it arrived within the window.
    pub async fn insert(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().await;
        seen.retain(|_, at| now.duration_since(*at) < self.window);
        if seen.contains_key(key) {
            return false;
        }
        seen.insert(key.to_string(), now);
        true
    }
}

/// Entry point for inbound activities.
#[derive(Clone)]
pub struct Receiver {
    ctx: FederationContext,
}

impl Receiver {
    #[must_use]
    pub const fn new(ctx: FederationContext) -> Self {
        Self { ctx }
    }

    /// Verify, admit and schedule one pushed activity.
    ///
    /// `uid` is the owner of a personal inbox, `None` for the shared inbox.
    pub async fn process_inbox(
        &self,
        body: &[u8],
        headers: &HeaderMap,
        path: &str,
        uid: Option<i64>,
    ) -> AppResult<Admission> {
        let document: Value = serde_json::from_slice(body)?;
        let activity = IncomingActivity::parse(document)?;

        let transport_signer = self.ctx.verifier.signer_of(body, headers, path).await;
        let document_signer = self
            .ctx
            .verifier
            .document_signer_of(&activity.document)
            .await;
        let verdict = evaluate_trust(
            transport_signer.as_deref(),
            document_signer.as_deref(),
            &activity.actor,
        );
        let trusted = verdict.covers(&activity);

        if !trusted && (!activity.verb.creates_content() || !self.ctx.settings.store_untrusted) {
            warn!(
                activity_id = %activity.id,
                actor = %activity.actor,
                activity_type = activity.verb.as_str(),
                "Rejecting untrusted activity"
            );
            return Err(AppError::Unauthorized(activity.id));
        }

        let arrival_key = format!("{}|{}", activity.id, uid.unwrap_or(PUBLIC_RECEIVER));
        if !self.ctx.arrived.insert(&arrival_key).await {
            debug!(activity_id = %activity.id, "Activity arrived recently; ignoring");
            return Ok(Admission::Duplicate);
        }

        let queue = InboundQueue::new(self.ctx.clone());
        let receivers = self.receivers_for(&activity, uid).await?;
        let mut admitted = None;
        for receiver in receivers {
            let result = queue
                .admit(&activity, receiver, verdict.signer(), true, trusted)
                .await?;
            admitted.get_or_insert(result);
        }
        let Some(admitted) = admitted else {
            return Ok(Admission::Duplicate);
        };
        if !admitted.created {
            return Ok(Admission::Duplicate);
        }

        if !trusted {
            let Some(object) = activity.object_id.clone() else {
                return Ok(Admission::PendingFetch {
                    entry_id: admitted.entry_id,
                });
            };
            let request = FetchRequest {
                uri: object,
                child_author: None,
                child_entry: Some(admitted.entry_id),
                relay_actor: None,
                completion: Completion::Async,
                refresh: activity.verb == Verb::Update,
            };
            FetchQueue::new(&self.ctx).schedule(request).await?;
            info!(
                activity_id = %activity.id,
                "Untrusted content queued; fetching from origin"
            );
            return Ok(Admission::PendingFetch {
                entry_id: admitted.entry_id,
            });
        }

        let scheduled = if self.ctx.settings.inbox.decoupled {
            if queue.is_processable(admitted.entry_id).await? {
                let delay = Duration::from_secs(self.ctx.settings.inbox.process_delay_secs);
                let handle = self
                    .ctx
                    .runner
                    .schedule(
                        Priority::High,
                        Task::ProcessEntry {
                            entry_id: admitted.entry_id,
                        },
                        Some(delay),
                    )
                    .await?;
                self.ctx
                    .queue_store
                    .set_entry_task(admitted.entry_id, Some(handle))
                    .await?;
                true
            } else {
                false
            }
        } else {
            queue.process_and_dispatch(admitted.entry_id).await?.routed
        };

        Ok(Admission::Queued {
            entry_id: admitted.entry_id,
            scheduled,
        })
    }

    /// Admit an activity the node fetched itself. Returns `None` when the
    /// relay policy turns it away.
    pub async fn process_fetched(
        &self,
        activity: &IncomingActivity,
        signers: &[String],
        request: &FetchRequest,
    ) -> AppResult<Option<i64>> {
        if request.completion == Completion::Relay && !self.relay_accepts(activity).await? {
            info!(
                object_id = ?activity.object_id,
                relay = ?request.relay_actor,
                "Relayed post outside relay scope"
            );
            return Ok(None);
        }

        let admitted = InboundQueue::new(self.ctx.clone())
            .admit(
                activity,
                PUBLIC_RECEIVER,
                signers.first().map(String::as_str),
                false,
                true,
            )
            .await?;
        Ok(Some(admitted.entry_id))
    }

    async fn relay_accepts(&self, activity: &IncomingActivity) -> AppResult<bool> {
        if let Some(parent) = &activity.in_reply_to {
            if self.ctx.content.exists(parent).await? {
                return Ok(true);
            }
        }
        Ok(match self.ctx.settings.relay_scope {
            RelayScope::All => true,
            RelayScope::Tags => activity
                .tags
                .iter()
                .any(|tag| self.ctx.settings.relay_tags.contains(tag)),
            RelayScope::None => false,
        })
    }

    /// Local accounts an activity is addressed to.
    async fn receivers_for(
        &self,
        activity: &IncomingActivity,
        uid: Option<i64>,
    ) -> AppResult<Vec<i64>> {
        let mut receivers: Vec<i64> = uid.into_iter().collect();
        let audience = &activity.audience;
        for url in audience
            .to
            .iter()
            .chain(&audience.cc)
            .chain(&audience.bto)
            .chain(&audience.bcc)
            .filter(|url| self.ctx.settings.is_local(url))
        {
            if let Some(account) = self.ctx.contacts.local_account(url).await? {
                if !receivers.contains(&account.uid) {
                    receivers.push(account.uid);
                }
            }
        }
        if receivers.is_empty() || audience.is_public() {
            if !receivers.contains(&PUBLIC_RECEIVER) {
                receivers.push(PUBLIC_RECEIVER);
            }
        }
        Ok(receivers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_arrived_cache_rejects_repeat_within_window() {
        let cache = ArrivedCache::new(Duration::from_secs(60));
        assert!(cache.insert("https://remote.example/activities/1").await);
        assert!(!cache.insert("https://remote.example/activities/1").await);
        assert!(cache.insert("https://remote.example/activities/2").await);
    }

    #[tokio::test]
    async fn test_arrived_cache_forgets_after_window() {
        let cache = ArrivedCache::new(Duration::ZERO);
        assert!(cache.insert("https://remote.example/activities/1").await);
        assert!(cache.insert("https://remote.example/activities/1").await);
    }
}
