//! Pending fetch of a missing remote object.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "fetch_task")]
pub struct Model {
    /// URI of the object to fetch. At most one row per URI.
    #[sea_orm(primary_key, auto_increment = false)]
    pub url: String,

    #[sea_orm(nullable)]
    pub task_id: Option<i64>,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
