//! Like and Dislike activities.

use serde::{Deserialize, Serialize};
use url::Url;

/// Verb of a reaction activity.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum ReactionType {
    Like,
    Dislike,
}

/// `ActivityPub` Like or Dislike activity.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeActivity {
    #[serde(rename = "type")]
    pub kind: ReactionType,
    pub id: Url,
    pub actor: Url,
    pub object: Url,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<Url>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<Url>,
}

impl LikeActivity {
    #[must_use]
    pub const fn new(kind: ReactionType, id: Url, actor: Url, object: Url) -> Self {
        Self {
            kind,
            id,
            actor,
            object,
            to: Vec::new(),
            cc: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_dislike_serializes_verb() {
        let like = LikeActivity::new(
            ReactionType::Dislike,
            Url::parse("https://weft.example/reactions/1").unwrap(),
            Url::parse("https://weft.example/users/alice").unwrap(),
            Url::parse("https://remote.example/notes/1").unwrap(),
        );
        let json = serde_json::to_value(&like).unwrap();
        assert_eq!(json["type"], "Dislike");
        assert!(json.get("to").is_none());
    }
}
