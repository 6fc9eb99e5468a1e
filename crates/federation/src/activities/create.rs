//! Create and Update activities carrying a post.

use activitypub_federation::kinds::activity::{CreateType, UpdateType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::objects::ApNote;

/// `ActivityPub` Create activity.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateActivity {
    #[serde(rename = "type")]
    pub kind: CreateType,
    pub id: Url,
    pub actor: Url,
    pub object: ApNote,
    pub published: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<Url>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<Url>,
}

impl CreateActivity {
    /// Wrap a note, copying its addressing onto the activity.
    #[must_use]
    pub fn new(id: Url, actor: Url, object: ApNote) -> Self {
        Self {
            kind: CreateType::Create,
            id,
            actor,
            published: object.published,
            to: object.to.clone(),
            cc: object.cc.clone(),
            object,
        }
    }
}

/// `ActivityPub` Update activity for an edited post.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateActivity {
    #[serde(rename = "type")]
    pub kind: UpdateType,
    pub id: Url,
    pub actor: Url,
    pub object: ApNote,
    pub published: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<Url>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<Url>,
}

impl UpdateActivity {
    #[must_use]
    pub fn new(id: Url, actor: Url, object: ApNote) -> Self {
        Self {
            kind: UpdateType::Update,
            id,
            actor,
            published: object.updated.unwrap_or(object.published),
            to: object.to.clone(),
            cc: object.cc.clone(),
            object,
        }
    }
}
