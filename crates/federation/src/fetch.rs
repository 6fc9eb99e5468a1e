//! Fetching of missing remote objects.
//!
//! [`FetchQueue`] keeps at most one scheduled fetch per URI. [`Fetcher`]
//! drains one fetch request together with every ancestor it uncovers, using
//! an explicit work-list so that long reply chains never deepen the stack.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use weft_common::AppResult;
use weft_db::FetchTaskStore;

use crate::context::FederationContext;
use crate::document::{IncomingActivity, Verb, id_of};
use crate::queue::{InboundQueue, Processability};
use crate::receiver::Receiver;
use crate::tasks::{Priority, Task, TaskHandle, TaskRunner};

/// A claimed fetch row without a task is considered abandoned after this long.
const UNCLAIMED_FETCH_TTL_MINUTES: i64 = 5;

/// How a fetched activity came to be processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Completion {
    /// Parent of a queued reply.
    #[default]
    Auto,
    /// Requested by a local user.
    Manual,
    /// Shared by a relay.
    Relay,
    /// Fetched by a background worker.
    Async,
    /// Shared by an ordinary actor.
    Announce,
}

/// One pending fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub uri: String,
    /// Author of the entry that needs this object.
    pub child_author: Option<String>,
    /// Queue entry that needs this object.
    pub child_entry: Option<i64>,
    pub relay_actor: Option<String>,
    pub completion: Completion,
    /// Fetch even if the object is stored, and apply it as an update.
    #[serde(default)]
    pub refresh: bool,
}

impl FetchRequest {
    #[must_use]
    pub fn new(uri: impl Into<String>, completion: Completion) -> Self {
        Self {
            uri: uri.into(),
            child_author: None,
            child_entry: None,
            relay_actor: None,
            completion,
            refresh: false,
        }
    }
}

/// Counters of one trampoline run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchReport {
    pub fetched: usize,
    pub processed: usize,
    pub gone: usize,
    pub failed: usize,
}

/// Claims on outstanding fetches, one per URI.
#[derive(Clone)]
pub struct FetchQueue {
    store: Arc<dyn FetchTaskStore>,
    runner: Arc<dyn TaskRunner>,
}

impl FetchQueue {
    #[must_use]
    pub fn new(ctx: &FederationContext) -> Self {
        Self {
            store: ctx.fetch_store.clone(),
            runner: ctx.runner.clone(),
        }
    }

    /// Claim a URI; returns false when a claim already exists.
    pub async fn add(&self, uri: &str) -> AppResult<bool> {
        self.store.add_fetch(uri).await
    }

    /// Whether a live worker holds the claim on `uri`.
    pub async fn has_worker(&self, uri: &str) -> AppResult<bool> {
        let Some(row) = self.store.find_fetch(uri).await? else {
            return Ok(false);
        };
        Ok(match row.task_id {
            Some(handle) => self.runner.is_alive(handle).await,
            None => {
                row.created_at > Utc::now() - ChronoDuration::minutes(UNCLAIMED_FETCH_TTL_MINUTES)
            }
        })
    }

    /// Task currently attached to the claim on `uri`.
    pub async fn worker(&self, uri: &str) -> AppResult<Option<TaskHandle>> {
        Ok(self.store.find_fetch(uri).await?.and_then(|row| row.task_id))
    }

    pub async fn attach(&self, uri: &str, handle: TaskHandle) -> AppResult<()> {
        self.store.set_fetch_task(uri, handle).await
    }

    pub async fn remove(&self, uri: &str) -> AppResult<()> {
        self.store.remove_fetch(uri).await
    }

    /// Claim the URI and schedule a fetch task unless a live one exists.
    ///
    /// Returns the task responsible for the URI, or `None` while another
    /// caller is between claiming and scheduling.
    pub async fn schedule(&self, request: FetchRequest) -> AppResult<Option<TaskHandle>> {
        let uri = request.uri.clone();
        if !self.add(&uri).await? && self.has_worker(&uri).await? {
            let existing = self.worker(&uri).await?;
            debug!(uri = %uri, ?existing, "Fetch already claimed");
            return Ok(existing);
        }

        let handle = self
            .runner
            .schedule(Priority::Medium, Task::Fetch(request), None)
            .await?;
        self.attach(&uri, handle).await?;
        info!(uri = %uri, handle, "Scheduled fetch of missing object");
        Ok(Some(handle))
    }
}

enum Step {
    Fetch(FetchRequest),
    Process { entry_id: i64, completion: Completion },
}

/// Fetch trampoline.
#[derive(Clone)]
pub struct Fetcher {
    ctx: FederationContext,
}

impl Fetcher {
    #[must_use]
    pub const fn new(ctx: FederationContext) -> Self {
        Self { ctx }
    }

    /// Fetch `request.uri` and drain every ancestor fetch and unblocked entry
    /// it leads to.
    pub async fn run(
        &self,
        request: FetchRequest,
        handle: Option<TaskHandle>,
    ) -> AppResult<FetchReport> {
        let queue = InboundQueue::new(self.ctx.clone());
        let fetches = FetchQueue::new(&self.ctx);
        let mut work = VecDeque::from([Step::Fetch(request)]);
        let mut visited = HashSet::new();
        let mut report = FetchReport::default();

        while let Some(step) = work.pop_front() {
            match step {
                Step::Fetch(request) => {
                    if !visited.insert(request.uri.clone()) {
                        continue;
                    }
                    self.fetch_step(&queue, &fetches, request, handle, &mut work, &mut report)
                        .await?;
                }
                Step::Process {
                    entry_id,
                    completion,
                } => match queue.process_with(entry_id, completion).await {
                    Ok(outcome) => {
                        if outcome.routed {
                            report.processed += 1;
                        }
                        for id in outcome.unblocked.into_iter().rev() {
                            work.push_front(Step::Process {
                                entry_id: id,
                                completion: Completion::Auto,
                            });
                        }
                        for follow_up in outcome.follow_ups {
                            if fetches.add(&follow_up.uri).await? {
                                if let Some(h) = handle {
                                    fetches.attach(&follow_up.uri, h).await?;
                                }
                                work.push_back(Step::Fetch(follow_up));
                            }
                        }
                    }
                    Err(e) => {
                        warn!(entry_id, error = %e, "Processing fetched entry failed");
                        report.failed += 1;
                    }
                },
            }
        }

        if let Some(h) = handle {
            for entry in self.ctx.queue_store.find_entries_by_task(h).await? {
                self.ctx.queue_store.set_entry_task(entry.id, None).await?;
            }
        }

        debug!(?report, "Fetch run finished");
        Ok(report)
    }

    async fn fetch_step(
        &self,
        queue: &InboundQueue,
        fetches: &FetchQueue,
        request: FetchRequest,
        handle: Option<TaskHandle>,
        work: &mut VecDeque<Step>,
        report: &mut FetchReport,
    ) -> AppResult<()> {
        let uri = request.uri.clone();

        if !request.refresh {
            if self.ctx.content.exists(&uri).await? {
                debug!(uri = %uri, "Object already stored");
                fetches.remove(&uri).await?;
                for id in queue.process_reply_by_uri(&uri).await?.into_iter().rev() {
                    work.push_front(Step::Process {
                        entry_id: id,
                        completion: Completion::Auto,
                    });
                }
                return Ok(());
            }
            if queue.carried_by_trusted_entry(&uri, 0).await? {
                debug!(uri = %uri, "Object already queued");
                fetches.remove(&uri).await?;
                return Ok(());
            }
        }

        let document = match self.ctx.transport.fetch(&uri).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                report.gone += 1;
                info!(uri = %uri, "Missing object is gone; purging dependents");
                self.purge_dependents(queue, &request).await?;
                fetches.remove(&uri).await?;
                return Ok(());
            }
            Err(e) => {
                report.failed += 1;
                warn!(uri = %uri, error = %e, "Fetching missing object failed");
                fetches.remove(&uri).await?;
                return Ok(());
            }
        };
        report.fetched += 1;

        let Some((activity, signers)) = wrap_fetched(document, &request) else {
            warn!(uri = %uri, "Fetched document is not an activity or object");
            fetches.remove(&uri).await?;
            return Ok(());
        };
        let author = activity.actor.clone();

        let admitted = Receiver::new(self.ctx.clone())
            .process_fetched(&activity, &signers, &request)
            .await?;
        fetches.remove(&uri).await?;
        let Some(entry_id) = admitted else {
            return Ok(());
        };

        let Some(entry) = self.ctx.queue_store.find_entry(entry_id).await? else {
            return Ok(());
        };
        match queue.check(&entry).await? {
            Processability::Ready => work.push_front(Step::Process {
                entry_id,
                completion: request.completion,
            }),
            Processability::Deferred { waiting_on } => {
                self.ctx
                    .queue_store
                    .set_entry_task(entry_id, waiting_on)
                    .await?;
            }
            Processability::NeedsFetch(parent) => {
                self.ctx.queue_store.set_entry_task(entry_id, handle).await?;
                if fetches.add(&parent).await? {
                    if let Some(h) = handle {
                        fetches.attach(&parent, h).await?;
                    }
                    debug!(uri = %uri, parent = %parent, "Fetched object has a missing parent");
                    work.push_front(Step::Fetch(FetchRequest {
                        uri: parent,
                        child_author: Some(author),
                        child_entry: Some(entry_id),
                        relay_actor: None,
                        completion: Completion::Auto,
                        refresh: false,
                    }));
                }
            }
        }
        Ok(())
    }

    async fn purge_dependents(&self, queue: &InboundQueue, request: &FetchRequest) -> AppResult<()> {
        if let Some(child) = request.child_entry {
            queue.delete_by_id(child).await?;
        }
        for entry in self
            .ctx
            .queue_store
            .find_entries_replying_to(&request.uri)
            .await?
        {
            queue.delete_by_id(entry.id).await?;
        }
        for entry in self
            .ctx
            .queue_store
            .find_entries_by_object_id(&request.uri)
            .await?
            .into_iter()
            .filter(|e| e.activity_type == "Announce")
        {
            queue.delete_by_id(entry.id).await?;
        }
        Ok(())
    }
}

/// Turn a fetched document into an activity.
///
/// Bare objects are wrapped in a Create (Update when refreshing) whose id
/// is the object id and whose actor is the object's author. The author and
/// the child's author are the signers, since the node fetched the object
/// from its origin itself.
fn wrap_fetched(document: Value, request: &FetchRequest) -> Option<(IncomingActivity, Vec<String>)> {
    let kind = document.get("type").and_then(Value::as_str).unwrap_or_default();
    let is_activity = document.get("actor").is_some()
        && document.get("object").is_some()
        && !matches!(Verb::parse(kind), Verb::Other(_));

    let activity = if is_activity {
        IncomingActivity::parse(document).ok()?
    } else {
        let id = id_of(document.get("id"))?;
        let author = id_of(document.get("attributedTo"))?;
        let verb = if request.refresh { "Update" } else { "Create" };
        IncomingActivity::parse(json!({
            "id": id,
            "type": verb,
            "actor": author,
            "object": document,
        }))
        .ok()?
    };

    let mut signers = vec![activity.actor.clone()];
    if let Some(author) = &activity.attributed_to {
        if !signers.contains(author) {
            signers.push(author.clone());
        }
    }
    if let Some(child) = &request.child_author {
        if !signers.contains(child) {
            signers.push(child.clone());
        }
    }
    Some((activity, signers))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_wrap_bare_object_in_create() {
        let mut request = FetchRequest::new("https://remote.example/notes/1", Completion::Auto);
        request.child_author = Some("https://other.example/users/bob".to_string());

        let (activity, signers) = wrap_fetched(
            json!({
                "id": "https://remote.example/notes/1",
                "type": "Note",
                "attributedTo": "https://remote.example/users/alice",
                "content": "parent"
            }),
            &request,
        )
        .unwrap();

        assert_eq!(activity.verb, Verb::Create);
        assert_eq!(activity.id, "https://remote.example/notes/1");
        assert_eq!(activity.actor, "https://remote.example/users/alice");
        assert_eq!(
            signers,
            vec![
                "https://remote.example/users/alice",
                "https://other.example/users/bob"
            ]
        );
    }

    #[test]
    fn test_wrap_refresh_uses_update() {
        let mut request = FetchRequest::new("https://remote.example/notes/1", Completion::Auto);
        request.refresh = true;
        let (activity, _) = wrap_fetched(
            json!({
                "id": "https://remote.example/notes/1",
                "type": "Note",
                "attributedTo": "https://remote.example/users/alice"
            }),
            &request,
        )
        .unwrap();
        assert_eq!(activity.verb, Verb::Update);
    }

    #[test]
    fn test_wrap_keeps_fetched_activity() {
        let request = FetchRequest::new("https://remote.example/activities/9", Completion::Async);
        let (activity, signers) = wrap_fetched(
            json!({
                "id": "https://remote.example/activities/9",
                "type": "Announce",
                "actor": "https://remote.example/users/alice",
                "object": "https://third.example/notes/3"
            }),
            &request,
        )
        .unwrap();
        assert_eq!(activity.verb, Verb::Announce);
        assert_eq!(signers, vec!["https://remote.example/users/alice"]);
    }

    #[test]
    fn test_wrap_rejects_anonymous_object() {
        let request = FetchRequest::new("https://remote.example/notes/1", Completion::Auto);
        assert!(wrap_fetched(json!({"id": "https://remote.example/notes/1", "type": "Note"}), &request).is_none());
    }
}
