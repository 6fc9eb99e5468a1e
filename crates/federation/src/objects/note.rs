//! Outgoing post objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Object type of an outgoing post.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum ApObjectType {
    Note,
    Article,
}

/// `ActivityPub` Note object.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApNote {
    #[serde(rename = "type")]
    pub kind: ApObjectType,
    pub id: Url,
    pub attributed_to: Url,
    pub content: String,
    pub published: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<Url>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<Url>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<Url>,

    /// Thread the post belongs to; mirrored in `context`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<Url>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Url>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default)]
    pub sensitive: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag: Vec<ApTag>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachment: Vec<ApAttachment>,
}

/// Media attached to a post.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApAttachment {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: Url,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ApAttachment {
    #[must_use]
    pub fn document(url: Url, media_type: Option<String>, name: Option<String>) -> Self {
        Self {
            kind: "Document".to_string(),
            url,
            media_type,
            name,
        }
    }
}

/// `ActivityPub` tag (mention or hashtag).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApTag {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ApTag {
    #[must_use]
    pub fn mention(actor: Url) -> Self {
        Self {
            kind: "Mention".to_string(),
            href: Some(actor),
            name: None,
        }
    }

    #[must_use]
    pub fn hashtag(base_url: &Url, name: &str) -> Self {
        let name = name.trim_start_matches('#');
        Self {
            kind: "Hashtag".to_string(),
            href: base_url.join(&format!("tags/{name}")).ok(),
            name: Some(format!("#{name}")),
        }
    }
}

impl ApNote {
    #[must_use]
    pub const fn new(id: Url, attributed_to: Url, content: String, published: DateTime<Utc>) -> Self {
        Self {
            kind: ApObjectType::Note,
            id,
            attributed_to,
            content,
            published,
            updated: None,
            to: Vec::new(),
            cc: Vec::new(),
            in_reply_to: None,
            conversation: None,
            context: None,
            summary: None,
            sensitive: false,
            tag: Vec::new(),
            attachment: Vec::new(),
        }
    }

    /// Set the thread of the post.
    #[must_use]
    pub fn in_conversation(mut self, conversation: Url) -> Self {
        self.context = Some(conversation.clone());
        self.conversation = Some(conversation);
        self
    }
}
