//! Reachability bookkeeping for a remote inbox.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inbox_status")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub url: String,

    #[sea_orm(nullable)]
    pub success_at: Option<DateTime<Utc>>,

    #[sea_orm(nullable)]
    pub failure_at: Option<DateTime<Utc>>,

    /// Start of the current run of failures; cleared by a success.
    #[sea_orm(nullable)]
    pub first_failure_at: Option<DateTime<Utc>>,

    /// Inbox is considered unreachable and skipped by fan-out.
    #[sea_orm(default_value = false)]
    pub archived: bool,
}

impl Model {
    /// Status for an inbox we have never talked to.
    #[must_use]
    pub fn unknown(url: &str) -> Self {
        Self {
            url: url.to_string(),
            success_at: None,
            failure_at: None,
            first_failure_at: None,
            archived: false,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
