//! Accept activity.

use activitypub_federation::kinds::activity::AcceptType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// `ActivityPub` Accept activity, answering a Follow request.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptActivity {
    #[serde(rename = "type")]
    pub kind: AcceptType,
    pub id: Url,
    pub actor: Url,
    /// The Follow being accepted, embedded as received.
    pub object: Value,
    pub to: Vec<Url>,
}

impl AcceptActivity {
    #[must_use]
    pub fn new(id: Url, actor: Url, follow: Value, follower: Url) -> Self {
        Self {
            kind: AcceptType::Accept,
            id,
            actor,
            object: follow,
            to: vec![follower],
        }
    }
}
