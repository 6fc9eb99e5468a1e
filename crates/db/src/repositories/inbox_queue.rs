//! Inbound queue repository.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use weft_common::{AppError, AppResult};

use crate::entities::{InboxEntry, InboxEntryReceiver, inbox_entry, inbox_entry_receiver};
use crate::store::{InboxQueueStore, NewInboxEntry};

/// Inbound queue repository for database operations.
#[derive(Clone)]
pub struct InboxQueueRepository {
    db: Arc<DatabaseConnection>,
}

impl InboxQueueRepository {
    /// Create a new inbound queue repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Count queued entries.
    pub async fn count(&self) -> AppResult<u64> {
        InboxEntry::find()
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[async_trait]
impl InboxQueueStore for InboxQueueRepository {
    async fn insert_entry(&self, entry: NewInboxEntry) -> AppResult<(i64, bool)> {
        let activity_id = entry.activity_id.clone();
        let model = inbox_entry::ActiveModel {
            activity_id: Set(entry.activity_id),
            object_id: Set(entry.object_id),
            object_type: Set(entry.object_type),
            activity_type: Set(entry.activity_type),
            in_reply_to_id: Set(entry.in_reply_to_id),
            conversation: Set(entry.conversation),
            activity: Set(entry.activity),
            signer: Set(entry.signer),
            push: Set(entry.push),
            trusted: Set(entry.trusted),
            received_at: Set(Utc::now()),
            task_id: Set(None),
            ..Default::default()
        };

        let inserted = InboxEntry::insert(model)
            .on_conflict(
                OnConflict::column(inbox_entry::Column::ActivityId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let stored = self
            .find_entry_by_activity_id(&activity_id)
            .await?
            .ok_or_else(|| AppError::Database(format!("Queue entry vanished: {activity_id}")))?;

        Ok((stored.id, inserted > 0))
    }

    async fn find_entry(&self, id: i64) -> AppResult<Option<inbox_entry::Model>> {
        InboxEntry::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_entry_by_activity_id(
        &self,
        activity_id: &str,
    ) -> AppResult<Option<inbox_entry::Model>> {
        InboxEntry::find()
            .filter(inbox_entry::Column::ActivityId.eq(activity_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_entries_by_object_id(
        &self,
        object_id: &str,
    ) -> AppResult<Vec<inbox_entry::Model>> {
        InboxEntry::find()
            .filter(inbox_entry::Column::ObjectId.eq(object_id))
            .order_by_asc(inbox_entry::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_entries_replying_to(&self, uri: &str) -> AppResult<Vec<inbox_entry::Model>> {
        InboxEntry::find()
            .filter(inbox_entry::Column::InReplyToId.eq(uri))
            .filter(inbox_entry::Column::ObjectId.ne(uri))
            .order_by_asc(inbox_entry::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_entries_by_task(&self, task_id: i64) -> AppResult<Vec<inbox_entry::Model>> {
        InboxEntry::find()
            .filter(inbox_entry::Column::TaskId.eq(task_id))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_idle_trusted_entries(&self) -> AppResult<Vec<inbox_entry::Model>> {
        InboxEntry::find()
            .filter(inbox_entry::Column::Trusted.eq(true))
            .filter(inbox_entry::Column::TaskId.is_null())
            .order_by_desc(inbox_entry::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn has_entry_for_object(&self, object_id: &str) -> AppResult<bool> {
        let found = InboxEntry::find()
            .select_only()
            .column(inbox_entry::Column::Id)
            .filter(inbox_entry::Column::ObjectId.eq(object_id))
            .into_tuple::<i64>()
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(found.is_some())
    }

    async fn set_entry_task(&self, id: i64, task_id: Option<i64>) -> AppResult<()> {
        InboxEntry::update_many()
            .col_expr(
                inbox_entry::Column::TaskId,
                sea_orm::sea_query::Expr::value(task_id),
            )
            .filter(inbox_entry::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn find_task_handles(&self) -> AppResult<Vec<i64>> {
        InboxEntry::find()
            .select_only()
            .column(inbox_entry::Column::TaskId)
            .filter(inbox_entry::Column::TaskId.is_not_null())
            .distinct()
            .into_tuple::<i64>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn release_task(&self, task_id: i64) -> AppResult<u64> {
        let result = InboxEntry::update_many()
            .col_expr(
                inbox_entry::Column::TaskId,
                sea_orm::sea_query::Expr::value(Option::<i64>::None),
            )
            .filter(inbox_entry::Column::TaskId.eq(task_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }

    async fn delete_entry(&self, id: i64) -> AppResult<()> {
        InboxEntryReceiver::delete_many()
            .filter(inbox_entry_receiver::Column::QueueId.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        InboxEntry::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_entries_received_before(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let result = InboxEntry::delete_many()
            .filter(inbox_entry::Column::TaskId.is_null())
            .filter(inbox_entry::Column::ReceivedAt.lt(before))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected)
    }

    async fn add_receiver(&self, queue_id: i64, uid: i64) -> AppResult<()> {
        let model = inbox_entry_receiver::ActiveModel {
            queue_id: Set(queue_id),
            uid: Set(uid),
        };

        InboxEntryReceiver::insert(model)
            .on_conflict(
                OnConflict::columns([
                    inbox_entry_receiver::Column::QueueId,
                    inbox_entry_receiver::Column::Uid,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn find_receivers(&self, queue_id: i64) -> AppResult<Vec<i64>> {
        let receivers = InboxEntryReceiver::find()
            .filter(inbox_entry_receiver::Column::QueueId.eq(queue_id))
            .order_by_asc(inbox_entry_receiver::Column::Uid)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(receivers.into_iter().map(|r| r.uid).collect())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_entry(id: i64, activity_id: &str) -> inbox_entry::Model {
        inbox_entry::Model {
            id,
            activity_id: activity_id.to_string(),
            object_id: Some(format!("{activity_id}/object")),
            object_type: Some("Note".to_string()),
            activity_type: "Create".to_string(),
            in_reply_to_id: None,
            conversation: None,
            activity: serde_json::json!({"type": "Create"}),
            signer: Some("https://remote.example/users/alice".to_string()),
            push: true,
            trusted: true,
            received_at: Utc::now(),
            task_id: None,
        }
    }

    fn new_entry(activity_id: &str) -> NewInboxEntry {
        NewInboxEntry {
            activity_id: activity_id.to_string(),
            object_id: None,
            object_type: None,
            activity_type: "Create".to_string(),
            in_reply_to_id: None,
            conversation: None,
            activity: serde_json::json!({}),
            signer: None,
            push: true,
            trusted: true,
        }
    }

    #[tokio::test]
    async fn test_insert_entry_new_row() {
        let entry = create_test_entry(42, "https://remote.example/activities/1");
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 42,
                    rows_affected: 1,
                }])
                .append_query_results([[entry]])
                .into_connection(),
        );

        let repo = InboxQueueRepository::new(db);
        let (id, created) = repo
            .insert_entry(new_entry("https://remote.example/activities/1"))
            .await
            .unwrap();

        assert_eq!(id, 42);
        assert!(created);
    }

    #[tokio::test]
    async fn test_insert_entry_duplicate_is_absorbed() {
        let entry = create_test_entry(7, "https://remote.example/activities/1");
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .append_query_results([[entry]])
                .into_connection(),
        );

        let repo = InboxQueueRepository::new(db);
        let (id, created) = repo
            .insert_entry(new_entry("https://remote.example/activities/1"))
            .await
            .unwrap();

        assert_eq!(id, 7);
        assert!(!created);
    }

    #[tokio::test]
    async fn test_find_entry_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<inbox_entry::Model>::new()])
                .into_connection(),
        );

        let repo = InboxQueueRepository::new(db);
        assert!(repo.find_entry(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_receivers_returns_uids() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![
                    inbox_entry_receiver::Model { queue_id: 3, uid: 0 },
                    inbox_entry_receiver::Model { queue_id: 3, uid: 12 },
                ]])
                .into_connection(),
        );

        let repo = InboxQueueRepository::new(db);
        assert_eq!(repo.find_receivers(3).await.unwrap(), vec![0, 12]);
    }

    #[tokio::test]
    async fn test_release_task_reports_detached_rows() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 3,
                }])
                .into_connection(),
        );

        let repo = InboxQueueRepository::new(db);
        assert_eq!(repo.release_task(17).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_delete_entries_received_before_reports_count() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 5,
                }])
                .into_connection(),
        );

        let repo = InboxQueueRepository::new(db);
        let removed = repo
            .delete_entries_received_before(Utc::now())
            .await
            .unwrap();
        assert_eq!(removed, 5);
    }
}
