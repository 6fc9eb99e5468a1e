//! Store traits for the federation pipeline tables.
//!
//! The inbound pipeline owns [`InboxQueueStore`] and [`FetchTaskStore`]; the
//! outbound pipeline owns [`DeliveryTargetStore`] and [`InboxStatusStore`].
//! Repositories implement them on top of `PostgreSQL`, and
//! [`MemoryStore`](crate::memory::MemoryStore) implements them in process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use weft_common::AppResult;

use crate::entities::{delivery_target, fetch_task, inbox_entry, inbox_status};

/// Values of a queue entry about to be admitted.
#[derive(Debug, Clone)]
pub struct NewInboxEntry {
    pub activity_id: String,
    pub object_id: Option<String>,
    pub object_type: Option<String>,
    pub activity_type: String,
    pub in_reply_to_id: Option<String>,
    pub conversation: Option<String>,
    pub activity: serde_json::Value,
    pub signer: Option<String>,
    pub push: bool,
    pub trusted: bool,
}

/// Durable staging area for inbound activities.
#[async_trait]
pub trait InboxQueueStore: Send + Sync {
    /// Insert an entry unless one with the same activity id exists.
    ///
    /// Returns the id of the stored row and whether this call created it.
    async fn insert_entry(&self, entry: NewInboxEntry) -> AppResult<(i64, bool)>;

    async fn find_entry(&self, id: i64) -> AppResult<Option<inbox_entry::Model>>;

    async fn find_entry_by_activity_id(
        &self,
        activity_id: &str,
    ) -> AppResult<Option<inbox_entry::Model>>;

    /// Entries carrying the given object.
    async fn find_entries_by_object_id(&self, object_id: &str)
    -> AppResult<Vec<inbox_entry::Model>>;

    /// Entries replying to the given URI, excluding self-replies, oldest first.
    async fn find_entries_replying_to(&self, uri: &str) -> AppResult<Vec<inbox_entry::Model>>;

    /// Entries attached to a background task.
    async fn find_entries_by_task(&self, task_id: i64) -> AppResult<Vec<inbox_entry::Model>>;

    /// Trusted entries without a task handle, newest first.
    async fn find_idle_trusted_entries(&self) -> AppResult<Vec<inbox_entry::Model>>;

    /// Whether any queued entry carries the given object.
    async fn has_entry_for_object(&self, object_id: &str) -> AppResult<bool>;

    async fn set_entry_task(&self, id: i64, task_id: Option<i64>) -> AppResult<()>;

    /// Distinct task handles attached to queued entries.
    async fn find_task_handles(&self) -> AppResult<Vec<i64>>;

    /// Detach every entry from a task; returns how many were detached.
    async fn release_task(&self, task_id: i64) -> AppResult<u64>;

    /// Delete an entry together with its receivers.
    async fn delete_entry(&self, id: i64) -> AppResult<()>;

    /// Delete entries without a task handle received before `before`.
    async fn delete_entries_received_before(&self, before: DateTime<Utc>) -> AppResult<u64>;

    /// Insert a receiver link unless it exists.
    async fn add_receiver(&self, queue_id: i64, uid: i64) -> AppResult<()>;

    async fn find_receivers(&self, queue_id: i64) -> AppResult<Vec<i64>>;
}

/// Pending fetches of missing remote objects.
#[async_trait]
pub trait FetchTaskStore: Send + Sync {
    /// Insert a fetch row unless one exists; returns whether it was created.
    async fn add_fetch(&self, url: &str) -> AppResult<bool>;

    async fn find_fetch(&self, url: &str) -> AppResult<Option<fetch_task::Model>>;

    async fn set_fetch_task(&self, url: &str, task_id: i64) -> AppResult<()>;

    async fn remove_fetch(&self, url: &str) -> AppResult<()>;
}

/// Outstanding per-inbox delivery obligations.
#[async_trait]
pub trait DeliveryTargetStore: Send + Sync {
    /// Record that `uri_id` must reach `inbox`, merging receivers into an existing row.
    async fn add_target(&self, uri_id: i64, inbox: &str, receivers: &[i64]) -> AppResult<()>;

    /// Pending targets of an inbox, oldest first.
    async fn find_targets_for_inbox(&self, inbox: &str)
    -> AppResult<Vec<delivery_target::Model>>;

    /// Increment the failure counter and return the new value.
    async fn increment_failed(&self, id: i64) -> AppResult<i32>;

    async fn remove_target(&self, id: i64) -> AppResult<()>;

    /// Remove every target of an inbox, returning the removed rows.
    async fn remove_targets_for_inbox(
        &self,
        inbox: &str,
    ) -> AppResult<Vec<delivery_target::Model>>;

    /// Distinct inboxes with pending targets.
    async fn pending_inboxes(&self) -> AppResult<Vec<String>>;
}

/// Reachability state of remote inboxes.
#[async_trait]
pub trait InboxStatusStore: Send + Sync {
    async fn find_status(&self, url: &str) -> AppResult<Option<inbox_status::Model>>;

    async fn save_status(&self, status: inbox_status::Model) -> AppResult<()>;
}
