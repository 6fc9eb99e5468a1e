//! Fetch task repository.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use weft_common::{AppError, AppResult};

use crate::entities::{FetchTask, fetch_task};
use crate::store::FetchTaskStore;

/// Fetch task repository for database operations.
#[derive(Clone)]
pub struct FetchTaskRepository {
    db: Arc<DatabaseConnection>,
}

impl FetchTaskRepository {
    /// Create a new fetch task repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FetchTaskStore for FetchTaskRepository {
    async fn add_fetch(&self, url: &str) -> AppResult<bool> {
        let model = fetch_task::ActiveModel {
            url: Set(url.to_string()),
            task_id: Set(None),
            created_at: Set(Utc::now()),
        };

        let inserted = FetchTask::insert(model)
            .on_conflict(
                OnConflict::column(fetch_task::Column::Url)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(inserted > 0)
    }

    async fn find_fetch(&self, url: &str) -> AppResult<Option<fetch_task::Model>> {
        FetchTask::find_by_id(url.to_string())
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn set_fetch_task(&self, url: &str, task_id: i64) -> AppResult<()> {
        FetchTask::update_many()
            .col_expr(fetch_task::Column::TaskId, Expr::value(task_id))
            .filter(fetch_task::Column::Url.eq(url))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn remove_fetch(&self, url: &str) -> AppResult<()> {
        FetchTask::delete_by_id(url.to_string())
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[tokio::test]
    async fn test_add_fetch_reports_conflict() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 1,
                    },
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 0,
                    },
                ])
                .into_connection(),
        );

        let repo = FetchTaskRepository::new(db);
        assert!(repo.add_fetch("https://remote.example/notes/1").await.unwrap());
        assert!(!repo.add_fetch("https://remote.example/notes/1").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_fetch_returns_task_handle() {
        let row = fetch_task::Model {
            url: "https://remote.example/notes/1".to_string(),
            task_id: Some(9),
            created_at: Utc::now(),
        };
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[row]])
                .into_connection(),
        );

        let repo = FetchTaskRepository::new(db);
        let found = repo
            .find_fetch("https://remote.example/notes/1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.task_id, Some(9));
    }
}
