//! In-process implementation of the pipeline stores.
//!
//! Used by tests and by single-node setups that do not need the queue to
//! survive a restart.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use weft_common::AppResult;

use crate::entities::{delivery_target, fetch_task, inbox_entry, inbox_status};
use crate::store::{
    DeliveryTargetStore, FetchTaskStore, InboxQueueStore, InboxStatusStore, NewInboxEntry,
};

#[derive(Default)]
struct State {
    next_entry_id: i64,
    entries: BTreeMap<i64, inbox_entry::Model>,
    receivers: BTreeSet<(i64, i64)>,
    fetches: BTreeMap<String, fetch_task::Model>,
    next_target_id: i64,
    targets: BTreeMap<i64, delivery_target::Model>,
    statuses: HashMap<String, inbox_status::Model>,
}

/// Pipeline stores kept in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All queued entries, by id.
    pub async fn entries(&self) -> Vec<inbox_entry::Model> {
        self.state.lock().await.entries.values().cloned().collect()
    }

    /// URLs with a pending fetch.
    pub async fn fetch_urls(&self) -> Vec<String> {
        self.state.lock().await.fetches.keys().cloned().collect()
    }

    /// All pending delivery targets, by id.
    pub async fn targets(&self) -> Vec<delivery_target::Model> {
        self.state.lock().await.targets.values().cloned().collect()
    }
}

#[async_trait]
impl InboxQueueStore for MemoryStore {
    async fn insert_entry(&self, entry: NewInboxEntry) -> AppResult<(i64, bool)> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .entries
            .values()
            .find(|e| e.activity_id == entry.activity_id)
        {
            return Ok((existing.id, false));
        }

        state.next_entry_id += 1;
        let id = state.next_entry_id;
        state.entries.insert(
            id,
            inbox_entry::Model {
                id,
                activity_id: entry.activity_id,
                object_id: entry.object_id,
                object_type: entry.object_type,
                activity_type: entry.activity_type,
                in_reply_to_id: entry.in_reply_to_id,
                conversation: entry.conversation,
                activity: entry.activity,
                signer: entry.signer,
                push: entry.push,
                trusted: entry.trusted,
                received_at: Utc::now(),
                task_id: None,
            },
        );
        Ok((id, true))
    }

    async fn find_entry(&self, id: i64) -> AppResult<Option<inbox_entry::Model>> {
        Ok(self.state.lock().await.entries.get(&id).cloned())
    }

    async fn find_entry_by_activity_id(
        &self,
        activity_id: &str,
    ) -> AppResult<Option<inbox_entry::Model>> {
        Ok(self
            .state
            .lock()
            .await
            .entries
            .values()
            .find(|e| e.activity_id == activity_id)
            .cloned())
    }

    async fn find_entries_by_object_id(
        &self,
        object_id: &str,
    ) -> AppResult<Vec<inbox_entry::Model>> {
        Ok(self
            .state
            .lock()
            .await
            .entries
            .values()
            .filter(|e| e.object_id.as_deref() == Some(object_id))
            .cloned()
            .collect())
    }

    async fn find_entries_replying_to(&self, uri: &str) -> AppResult<Vec<inbox_entry::Model>> {
        Ok(self
            .state
            .lock()
            .await
            .entries
            .values()
            .filter(|e| {
                e.in_reply_to_id.as_deref() == Some(uri) && e.object_id.as_deref() != Some(uri)
            })
            .cloned()
            .collect())
    }

    async fn find_entries_by_task(&self, task_id: i64) -> AppResult<Vec<inbox_entry::Model>> {
        Ok(self
            .state
            .lock()
            .await
            .entries
            .values()
            .filter(|e| e.task_id == Some(task_id))
            .cloned()
            .collect())
    }

    async fn find_idle_trusted_entries(&self) -> AppResult<Vec<inbox_entry::Model>> {
        Ok(self
            .state
            .lock()
            .await
            .entries
            .values()
            .rev()
            .filter(|e| e.trusted && e.task_id.is_none())
            .cloned()
            .collect())
    }

    async fn has_entry_for_object(&self, object_id: &str) -> AppResult<bool> {
        Ok(self
            .state
            .lock()
            .await
            .entries
            .values()
            .any(|e| e.object_id.as_deref() == Some(object_id)))
    }

    async fn set_entry_task(&self, id: i64, task_id: Option<i64>) -> AppResult<()> {
        if let Some(entry) = self.state.lock().await.entries.get_mut(&id) {
            entry.task_id = task_id;
        }
        Ok(())
    }

    async fn find_task_handles(&self) -> AppResult<Vec<i64>> {
        let handles: BTreeSet<i64> = self
            .state
            .lock()
            .await
            .entries
            .values()
            .filter_map(|e| e.task_id)
            .collect();
        Ok(handles.into_iter().collect())
    }

    async fn release_task(&self, task_id: i64) -> AppResult<u64> {
        let mut released = 0;
        for entry in self.state.lock().await.entries.values_mut() {
            if entry.task_id == Some(task_id) {
                entry.task_id = None;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn delete_entry(&self, id: i64) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.entries.remove(&id);
        state.receivers.retain(|(queue_id, _)| *queue_id != id);
        Ok(())
    }

    async fn delete_entries_received_before(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let expired: Vec<i64> = state
            .entries
            .values()
            .filter(|e| e.task_id.is_none() && e.received_at < before)
            .map(|e| e.id)
            .collect();
        for id in &expired {
            state.entries.remove(id);
        }
        state
            .receivers
            .retain(|(queue_id, _)| !expired.contains(queue_id));
        Ok(expired.len() as u64)
    }

    async fn add_receiver(&self, queue_id: i64, uid: i64) -> AppResult<()> {
        self.state.lock().await.receivers.insert((queue_id, uid));
        Ok(())
    }

    async fn find_receivers(&self, queue_id: i64) -> AppResult<Vec<i64>> {
        Ok(self
            .state
            .lock()
            .await
            .receivers
            .iter()
            .filter(|(q, _)| *q == queue_id)
            .map(|(_, uid)| *uid)
            .collect())
    }
}

#[async_trait]
impl FetchTaskStore for MemoryStore {
    async fn add_fetch(&self, url: &str) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        if state.fetches.contains_key(url) {
            return Ok(false);
        }
        state.fetches.insert(
            url.to_string(),
            fetch_task::Model {
                url: url.to_string(),
                task_id: None,
                created_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn find_fetch(&self, url: &str) -> AppResult<Option<fetch_task::Model>> {
        Ok(self.state.lock().await.fetches.get(url).cloned())
    }

    async fn set_fetch_task(&self, url: &str, task_id: i64) -> AppResult<()> {
        if let Some(fetch) = self.state.lock().await.fetches.get_mut(url) {
            fetch.task_id = Some(task_id);
        }
        Ok(())
    }

    async fn remove_fetch(&self, url: &str) -> AppResult<()> {
        self.state.lock().await.fetches.remove(url);
        Ok(())
    }
}

#[async_trait]
impl DeliveryTargetStore for MemoryStore {
    async fn add_target(&self, uri_id: i64, inbox: &str, receivers: &[i64]) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .targets
            .values_mut()
            .find(|t| t.uri_id == uri_id && t.inbox == inbox)
        {
            let mut merged = existing.receiver_ids();
            merged.extend_from_slice(receivers);
            merged.sort_unstable();
            merged.dedup();
            existing.receivers = serde_json::json!(merged);
            return Ok(());
        }

        state.next_target_id += 1;
        let id = state.next_target_id;
        state.targets.insert(
            id,
            delivery_target::Model {
                id,
                uri_id,
                inbox: inbox.to_string(),
                failed: 0,
                receivers: serde_json::json!(receivers),
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn find_targets_for_inbox(
        &self,
        inbox: &str,
    ) -> AppResult<Vec<delivery_target::Model>> {
        Ok(self
            .state
            .lock()
            .await
            .targets
            .values()
            .filter(|t| t.inbox == inbox)
            .cloned()
            .collect())
    }

    async fn increment_failed(&self, id: i64) -> AppResult<i32> {
        let mut state = self.state.lock().await;
        Ok(state.targets.get_mut(&id).map_or(0, |target| {
            target.failed += 1;
            target.failed
        }))
    }

    async fn remove_target(&self, id: i64) -> AppResult<()> {
        self.state.lock().await.targets.remove(&id);
        Ok(())
    }

    async fn remove_targets_for_inbox(
        &self,
        inbox: &str,
    ) -> AppResult<Vec<delivery_target::Model>> {
        let mut state = self.state.lock().await;
        let ids: Vec<i64> = state
            .targets
            .values()
            .filter(|t| t.inbox == inbox)
            .map(|t| t.id)
            .collect();
        Ok(ids
            .iter()
            .filter_map(|id| state.targets.remove(id))
            .collect())
    }

    async fn pending_inboxes(&self) -> AppResult<Vec<String>> {
        let state = self.state.lock().await;
        let inboxes: BTreeSet<String> = state.targets.values().map(|t| t.inbox.clone()).collect();
        Ok(inboxes.into_iter().collect())
    }
}

#[async_trait]
impl InboxStatusStore for MemoryStore {
    async fn find_status(&self, url: &str) -> AppResult<Option<inbox_status::Model>> {
        Ok(self.state.lock().await.statuses.get(url).cloned())
    }

    async fn save_status(&self, status: inbox_status::Model) -> AppResult<()> {
        self.state
            .lock()
            .await
            .statuses
            .insert(status.url.clone(), status);
        Ok(())
    }
}
