//! Outstanding delivery of one object to one inbox.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "delivery_target")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Local object being delivered.
    pub uri_id: i64,

    pub inbox: String,

    /// Consecutive failed attempts.
    #[sea_orm(default_value = 0)]
    pub failed: i32,

    /// Contact ids this delivery is meant for, as a JSON array.
    #[sea_orm(column_type = "JsonBinary")]
    pub receivers: Json,

    pub created_at: DateTime<Utc>,
}

impl Model {
    /// Receiver contact ids.
    #[must_use]
    pub fn receiver_ids(&self) -> Vec<i64> {
        self.receivers
            .as_array()
            .map(|ids| ids.iter().filter_map(serde_json::Value::as_i64).collect())
            .unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
