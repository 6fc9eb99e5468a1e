//! Reject activity.

use activitypub_federation::kinds::activity::RejectType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// `ActivityPub` Reject activity, refusing a Follow request.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectActivity {
    #[serde(rename = "type")]
    pub kind: RejectType,
    pub id: Url,
    pub actor: Url,
    pub object: Value,
    pub to: Vec<Url>,
}

impl RejectActivity {
    #[must_use]
    pub fn new(id: Url, actor: Url, follow: Value, follower: Url) -> Self {
        Self {
            kind: RejectType::Reject,
            id,
            actor,
            object: follow,
            to: vec![follower],
        }
    }
}
