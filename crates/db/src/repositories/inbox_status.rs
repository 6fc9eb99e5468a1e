//! Inbox status repository.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, IntoActiveModel};
use weft_common::{AppError, AppResult};

use crate::entities::{InboxStatus, inbox_status};
use crate::store::InboxStatusStore;

/// Inbox status repository for database operations.
#[derive(Clone)]
pub struct InboxStatusRepository {
    db: Arc<DatabaseConnection>,
}

impl InboxStatusRepository {
    /// Create a new inbox status repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl InboxStatusStore for InboxStatusRepository {
    async fn find_status(&self, url: &str) -> AppResult<Option<inbox_status::Model>> {
        InboxStatus::find_by_id(url.to_string())
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn save_status(&self, status: inbox_status::Model) -> AppResult<()> {
        let model = status.into_active_model();
        InboxStatus::insert(model)
            .on_conflict(
                OnConflict::column(inbox_status::Column::Url)
                    .update_columns([
                        inbox_status::Column::SuccessAt,
                        inbox_status::Column::FailureAt,
                        inbox_status::Column::FirstFailureAt,
                        inbox_status::Column::Archived,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[tokio::test]
    async fn test_find_status_archived() {
        let status = inbox_status::Model {
            url: "https://down.example/inbox".to_string(),
            success_at: None,
            failure_at: Some(Utc::now()),
            first_failure_at: Some(Utc::now()),
            archived: true,
        };
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[status]])
                .into_connection(),
        );

        let repo = InboxStatusRepository::new(db);
        let found = repo
            .find_status("https://down.example/inbox")
            .await
            .unwrap()
            .unwrap();
        assert!(found.archived);
    }

    #[tokio::test]
    async fn test_save_status_upserts() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );

        let repo = InboxStatusRepository::new(db);
        repo.save_status(inbox_status::Model::unknown("https://up.example/inbox"))
            .await
            .unwrap();
    }
}
