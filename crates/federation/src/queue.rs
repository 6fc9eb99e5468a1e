//! Inbound queue and dependency resolution.
//!
//! Every inbound activity is staged as a queue entry keyed by its activity
//! id. An entry is routed only once the content it depends on (its parent
//! post, or the object it shares) is available locally; otherwise a fetch of
//! the missing object is scheduled and the entry waits.

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{debug, error, info, warn};
use weft_common::AppResult;
use weft_db::NewInboxEntry;
use weft_db::entities::inbox_entry;

use crate::context::FederationContext;
use crate::document::{IncomingActivity, ObjectKind, Verb, id_of};
use crate::fetch::{Completion, FetchQueue, FetchRequest};
use crate::processor::{Processor, QueuedActivity};
use crate::router::Route;
use crate::tasks::{Priority, Task, TaskHandle};

/// Pseudo-recipient standing for the public audience.
pub const PUBLIC_RECEIVER: i64 = 0;

/// Whether a queued entry can be routed now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processability {
    Ready,
    /// Waiting on another queued entry or an already running fetch.
    Deferred { waiting_on: Option<TaskHandle> },
    /// The given object must be fetched first.
    NeedsFetch(String),
}

/// Result of admitting an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admitted {
    pub entry_id: i64,
    /// False when the activity id was already queued.
    pub created: bool,
}

/// Result of processing one entry.
#[derive(Debug, Default)]
pub struct ProcessOutcome {
    pub route: Option<Route>,
    pub routed: bool,
    /// Fetches the processor asked for.
    pub follow_ups: Vec<FetchRequest>,
    /// Entries made processable by this one.
    pub unblocked: Vec<i64>,
}

/// Durable staging area for inbound activities.
#[derive(Clone)]
pub struct InboundQueue {
    ctx: FederationContext,
}

impl InboundQueue {
    #[must_use]
    pub const fn new(ctx: FederationContext) -> Self {
        Self { ctx }
    }

    /// Insert-or-ignore an entry and link the receiver to it.
    pub async fn admit(
        &self,
        activity: &IncomingActivity,
        uid: i64,
        signer: Option<&str>,
        push: bool,
        trusted: bool,
    ) -> AppResult<Admitted> {
        let object_type = match activity.object_kind {
            ObjectKind::Reference => None,
            ref kind => Some(kind.as_str().to_string()),
        };
        let (entry_id, created) = self
            .ctx
            .queue_store
            .insert_entry(NewInboxEntry {
                activity_id: activity.id.clone(),
                object_id: activity.object_id.clone(),
                object_type,
                activity_type: activity.verb.as_str().to_string(),
                in_reply_to_id: activity.in_reply_to.clone(),
                conversation: activity.conversation.clone(),
                activity: activity.document.clone(),
                signer: signer.map(String::from),
                push,
                trusted,
            })
            .await?;
        self.ctx.queue_store.add_receiver(entry_id, uid).await?;

        if created {
            info!(
                activity_id = %activity.id,
                activity_type = activity.verb.as_str(),
                entry_id,
                trusted,
                "Activity admitted"
            );
        } else {
            debug!(activity_id = %activity.id, entry_id, uid, "Duplicate activity absorbed");
        }

        Ok(Admitted { entry_id, created })
    }

    /// Decide whether an entry's prerequisites are available. Has no side effects.
    pub async fn check(&self, entry: &inbox_entry::Model) -> AppResult<Processability> {
        let verb = Verb::parse(&entry.activity_type);
        let kind = ObjectKind::parse(entry.object_type.as_deref().unwrap_or_default());

        if verb == Verb::Follow && kind.is_content() {
            return Ok(Processability::Ready);
        }
        if let Some(object) = &entry.object_id {
            if self.ctx.content.exists(object).await? {
                return Ok(Processability::Ready);
            }
        }
        if let Some(conversation) = &entry.conversation {
            if self.ctx.content.conversation_known(conversation).await? {
                return Ok(Processability::Ready);
            }
        }

        let dependency = if verb == Verb::Announce {
            entry.object_id.as_deref()
        } else {
            entry
                .in_reply_to_id
                .as_deref()
                .filter(|parent| Some(*parent) != entry.object_id.as_deref())
        };
        let Some(dependency) = dependency else {
            return Ok(Processability::Ready);
        };

        if self.ctx.content.exists(dependency).await? {
            return Ok(Processability::Ready);
        }
        if self.carried_by_trusted_entry(dependency, entry.id).await? {
            debug!(entry_id = entry.id, dependency = %dependency, "Waiting on queued parent");
            return Ok(Processability::Deferred { waiting_on: None });
        }

        let fetches = FetchQueue::new(&self.ctx);
        if fetches.has_worker(dependency).await? {
            debug!(entry_id = entry.id, dependency = %dependency, "Waiting on running fetch");
            return Ok(Processability::Deferred {
                waiting_on: fetches.worker(dependency).await?,
            });
        }

        Ok(Processability::NeedsFetch(dependency.to_string()))
    }

    /// Whether a trusted entry other than `except` will materialize `uri`.
    pub async fn carried_by_trusted_entry(&self, uri: &str, except: i64) -> AppResult<bool> {
        Ok(self
            .ctx
            .queue_store
            .find_entries_by_object_id(uri)
            .await?
            .iter()
            .any(|e| e.id != except && e.trusted && carries_content(&e.activity_type)))
    }

    /// Check an entry and, when a parent is missing, claim and schedule its fetch.
    pub async fn is_processable(&self, id: i64) -> AppResult<bool> {
        let Some(entry) = self.ctx.queue_store.find_entry(id).await? else {
            return Ok(false);
        };

        match self.check(&entry).await? {
            Processability::Ready => Ok(true),
            Processability::Deferred { waiting_on } => {
                if entry.task_id != waiting_on {
                    self.ctx.queue_store.set_entry_task(id, waiting_on).await?;
                }
                Ok(false)
            }
            Processability::NeedsFetch(uri) => {
                let request = self.fetch_request_for(&entry, uri);
                let handle = FetchQueue::new(&self.ctx).schedule(request).await?;
                self.ctx.queue_store.set_entry_task(id, handle).await?;
                Ok(false)
            }
        }
    }

    fn fetch_request_for(&self, entry: &inbox_entry::Model, uri: String) -> FetchRequest {
        let actor = id_of(entry.activity.get("actor"));
        let relay_actor = actor.clone().filter(|a| self.ctx.settings.is_relay(a));
        let completion = match (entry.activity_type.as_str(), &relay_actor) {
            ("Announce", Some(_)) => Completion::Relay,
            ("Announce", None) => Completion::Announce,
            _ => Completion::Auto,
        };

        FetchRequest {
            uri,
            child_author: entry.signer.clone().or(actor),
            child_entry: Some(entry.id),
            relay_actor,
            completion,
            refresh: false,
        }
    }

    /// Process an entry received through the regular queue path.
    pub async fn process(&self, id: i64) -> AppResult<ProcessOutcome> {
        self.process_with(id, Completion::Auto).await
    }

    /// Re-check, merge receivers, route and delete an entry.
    pub async fn process_with(&self, id: i64, completion: Completion) -> AppResult<ProcessOutcome> {
        let Some(entry) = self.ctx.queue_store.find_entry(id).await? else {
            debug!(entry_id = id, "Queue entry already gone");
            return Ok(ProcessOutcome::default());
        };
        if !entry.trusted {
            debug!(entry_id = id, activity_id = %entry.activity_id, "Untrusted entry awaits fetch");
            return Ok(ProcessOutcome::default());
        }
        if !self.is_processable(id).await? {
            debug!(entry_id = id, activity_id = %entry.activity_id, "Entry deferred");
            return Ok(ProcessOutcome::default());
        }

        let activity = match IncomingActivity::parse(entry.activity.clone()) {
            Ok(activity) => activity,
            Err(e) => {
                warn!(entry_id = id, error = %e, "Dropping unparsable queue entry");
                self.ctx.queue_store.delete_entry(id).await?;
                return Ok(ProcessOutcome::default());
            }
        };

        let mut receivers = self.ctx.queue_store.find_receivers(id).await?;
        if !receivers.contains(&PUBLIC_RECEIVER) && activity.audience.is_public() {
            receivers.push(PUBLIC_RECEIVER);
        }

        let queued = QueuedActivity {
            entry_id: id,
            activity,
            receivers,
            signer: entry.signer.clone(),
            push: entry.push,
            completion,
        };

        let routed = match Processor::new(self.ctx.clone()).route(&queued).await {
            Ok(routed) => routed,
            Err(e) => {
                error!(entry_id = id, activity_id = %entry.activity_id, error = %e, "Routing failed");
                self.ctx.queue_store.set_entry_task(id, None).await?;
                return Err(e);
            }
        };

        if routed.retain {
            self.ctx.queue_store.set_entry_task(id, None).await?;
        } else {
            self.ctx.queue_store.delete_entry(id).await?;
            if matches!(routed.route, Route::CreateContent | Route::UpdateContent) {
                if let Some(object) = &entry.object_id {
                    self.remove_superseded(object).await?;
                }
            }
        }

        let unblocked = match &routed.materialized {
            Some(uri) => self.process_reply_by_uri(uri).await?,
            None => Vec::new(),
        };

        Ok(ProcessOutcome {
            route: Some(routed.route),
            routed: !routed.retain,
            follow_ups: routed.follow_ups,
            unblocked,
        })
    }

    /// Process an entry and schedule whatever it asked for or unblocked.
    pub async fn process_and_dispatch(&self, id: i64) -> AppResult<ProcessOutcome> {
        let outcome = self.process(id).await?;
        self.dispatch(&outcome).await?;
        Ok(outcome)
    }

    async fn dispatch(&self, outcome: &ProcessOutcome) -> AppResult<()> {
        let fetches = FetchQueue::new(&self.ctx);
        for request in &outcome.follow_ups {
            fetches.schedule(request.clone()).await?;
        }
        for &entry_id in &outcome.unblocked {
            let handle = self
                .ctx
                .runner
                .schedule(Priority::High, Task::ProcessEntry { entry_id }, None)
                .await?;
            self.ctx
                .queue_store
                .set_entry_task(entry_id, Some(handle))
                .await?;
        }
        Ok(())
    }

    /// Remove untrusted entries for an object that has been materialized.
    async fn remove_superseded(&self, object_id: &str) -> AppResult<()> {
        for stale in self
            .ctx
            .queue_store
            .find_entries_by_object_id(object_id)
            .await?
            .into_iter()
            .filter(|e| !e.trusted)
        {
            debug!(entry_id = stale.id, object_id = %object_id, "Removing superseded entry");
            self.ctx.queue_store.delete_entry(stale.id).await?;
        }
        Ok(())
    }

    /// Retry every idle trusted entry, newest first.
    ///
    /// Entries replying to an object another entry carries are left for the
    /// cascade that follows the parent.
    pub async fn process_all(&self) -> AppResult<usize> {
        self.release_stale_tasks().await?;
        let entries = self.ctx.queue_store.find_idle_trusted_entries().await?;
        let mut processed = 0;

        for entry in entries {
            if let Some(parent) = &entry.in_reply_to_id {
                if self.carried_by_trusted_entry(parent, entry.id).await? {
                    continue;
                }
            }
            match self.process_and_dispatch(entry.id).await {
                Ok(outcome) if outcome.routed => processed += 1,
                Ok(_) => {}
                Err(e) => warn!(entry_id = entry.id, error = %e, "Sweep failed to process entry"),
            }
        }

        if processed > 0 {
            info!(processed, "Queue sweep routed entries");
        }
        Ok(processed)
    }

    /// Detach entries from tasks the runner no longer runs.
    ///
    /// Handles outlive the process that issued them; an entry still pointing
    /// at a finished or forgotten task would otherwise never be retried.
    pub async fn release_stale_tasks(&self) -> AppResult<u64> {
        let mut released = 0;
        for handle in self.ctx.queue_store.find_task_handles().await? {
            if !self.ctx.runner.is_alive(handle).await {
                released += self.ctx.queue_store.release_task(handle).await?;
            }
        }
        if released > 0 {
            info!(released, "Released entries of finished tasks");
        }
        Ok(released)
    }

    /// Delete idle entries older than the retention window.
    pub async fn clear(&self) -> AppResult<u64> {
        self.release_stale_tasks().await?;
        let cutoff =
            Utc::now() - ChronoDuration::days(i64::from(self.ctx.settings.inbox.retention_days));
        let removed = self
            .ctx
            .queue_store
            .delete_entries_received_before(cutoff)
            .await?;
        if removed > 0 {
            info!(removed, "Expired queue entries removed");
        }
        Ok(removed)
    }

    /// Re-evaluate entries waiting on `uri`; returns those now processable.
    pub async fn process_reply_by_uri(&self, uri: &str) -> AppResult<Vec<i64>> {
        let mut waiting = self.ctx.queue_store.find_entries_replying_to(uri).await?;
        waiting.extend(
            self.ctx
                .queue_store
                .find_entries_by_object_id(uri)
                .await?
                .into_iter()
                .filter(|e| e.activity_type == "Announce"),
        );

        let mut ready = Vec::new();
        for entry in waiting.into_iter().filter(|e| e.trusted) {
            if self.is_processable(entry.id).await? {
                ready.push(entry.id);
            }
        }
        if !ready.is_empty() {
            debug!(uri = %uri, unblocked = ready.len(), "Parent materialized");
        }
        Ok(ready)
    }

    /// Remove an entry and, transitively, every entry replying to its object.
    pub async fn delete_by_id(&self, id: i64) -> AppResult<usize> {
        let mut pending = vec![id];
        let mut removed = 0;

        while let Some(current) = pending.pop() {
            let Some(entry) = self.ctx.queue_store.find_entry(current).await? else {
                continue;
            };
            if let Some(object) = &entry.object_id {
                pending.extend(
                    self.ctx
                        .queue_store
                        .find_entries_replying_to(object)
                        .await?
                        .into_iter()
                        .map(|child| child.id),
                );
            }
            self.ctx.queue_store.delete_entry(current).await?;
            removed += 1;
        }

        if removed > 0 {
            info!(entry_id = id, removed, "Purged queue entry chain");
        }
        Ok(removed)
    }

    /// Purge every chain attached to a task handle.
    pub async fn delete_by_task(&self, handle: TaskHandle) -> AppResult<usize> {
        let mut removed = 0;
        for entry in self.ctx.queue_store.find_entries_by_task(handle).await? {
            removed += self.delete_by_id(entry.id).await?;
        }
        Ok(removed)
    }
}

fn carries_content(activity_type: &str) -> bool {
    matches!(activity_type, "Create" | "Update")
}
