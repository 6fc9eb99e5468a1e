//! Inbound queue entry entity.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One inbound activity awaiting or undergoing processing.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inbox_entry")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Activity URI. Re-delivery of the same URI is absorbed.
    #[sea_orm(unique)]
    pub activity_id: String,

    #[sea_orm(nullable)]
    pub object_id: Option<String>,

    #[sea_orm(nullable)]
    pub object_type: Option<String>,

    pub activity_type: String,

    #[sea_orm(nullable)]
    pub in_reply_to_id: Option<String>,

    #[sea_orm(nullable)]
    pub conversation: Option<String>,

    /// Raw activity document as received or fetched.
    #[sea_orm(column_type = "JsonBinary")]
    pub activity: Json,

    /// Transport signer of the request that delivered the activity.
    #[sea_orm(nullable)]
    pub signer: Option<String>,

    /// Whether the activity was pushed to us rather than fetched.
    pub push: bool,

    pub trusted: bool,

    pub received_at: DateTime<Utc>,

    /// Background task currently responsible for this entry.
    #[sea_orm(nullable)]
    pub task_id: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::inbox_entry_receiver::Entity")]
    Receivers,
}

impl Related<super::inbox_entry_receiver::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Receivers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
