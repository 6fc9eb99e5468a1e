//! Local recipient of a queued inbound activity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Links a queue entry to a local account, or to `0` for the public pseudo-recipient.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inbox_entry_receiver")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub queue_id: i64,

    #[sea_orm(primary_key, auto_increment = false)]
    pub uid: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::inbox_entry::Entity",
        from = "Column::QueueId",
        to = "super::inbox_entry::Column::Id",
        on_delete = "Cascade"
    )]
    Entry,
}

impl Related<super::inbox_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Entry.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
