//! Delivery target repository.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use weft_common::{AppError, AppResult};

use crate::entities::{DeliveryTarget, delivery_target};
use crate::store::DeliveryTargetStore;

/// Delivery target repository for database operations.
#[derive(Clone)]
pub struct DeliveryTargetRepository {
    db: Arc<DatabaseConnection>,
}

impl DeliveryTargetRepository {
    /// Create a new delivery target repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn find_target(
        &self,
        uri_id: i64,
        inbox: &str,
    ) -> AppResult<Option<delivery_target::Model>> {
        DeliveryTarget::find()
            .filter(delivery_target::Column::UriId.eq(uri_id))
            .filter(delivery_target::Column::Inbox.eq(inbox))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[async_trait]
impl DeliveryTargetStore for DeliveryTargetRepository {
    async fn add_target(&self, uri_id: i64, inbox: &str, receivers: &[i64]) -> AppResult<()> {
        if let Some(existing) = self.find_target(uri_id, inbox).await? {
            let merged: BTreeSet<i64> = existing
                .receiver_ids()
                .into_iter()
                .chain(receivers.iter().copied())
                .collect();
            let mut model: delivery_target::ActiveModel = existing.into();
            model.receivers = Set(serde_json::json!(merged));
            model
                .update(self.db.as_ref())
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            return Ok(());
        }

        let model = delivery_target::ActiveModel {
            uri_id: Set(uri_id),
            inbox: Set(inbox.to_string()),
            failed: Set(0),
            receivers: Set(serde_json::json!(receivers)),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn find_targets_for_inbox(
        &self,
        inbox: &str,
    ) -> AppResult<Vec<delivery_target::Model>> {
        DeliveryTarget::find()
            .filter(delivery_target::Column::Inbox.eq(inbox))
            .order_by_asc(delivery_target::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn increment_failed(&self, id: i64) -> AppResult<i32> {
        let target = DeliveryTarget::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::NotFound(format!("Delivery target: {id}")))?;

        let failed = target.failed + 1;
        let mut model: delivery_target::ActiveModel = target.into();
        model.failed = Set(failed);
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(failed)
    }

    async fn remove_target(&self, id: i64) -> AppResult<()> {
        DeliveryTarget::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn remove_targets_for_inbox(
        &self,
        inbox: &str,
    ) -> AppResult<Vec<delivery_target::Model>> {
        let targets = self.find_targets_for_inbox(inbox).await?;
        DeliveryTarget::delete_many()
            .filter(delivery_target::Column::Inbox.eq(inbox))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(targets)
    }

    async fn pending_inboxes(&self) -> AppResult<Vec<String>> {
        DeliveryTarget::find()
            .select_only()
            .column(delivery_target::Column::Inbox)
            .distinct()
            .order_by_asc(delivery_target::Column::Inbox)
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
