//! Parsed view of an inbound activity document.
//!
//! Inbound documents are kept as raw JSON for storage and re-processing; this
//! module extracts the fields the pipeline routes and schedules on.

use serde_json::Value;
use weft_common::{AppError, AppResult};

/// The distinguished public-audience pseudo-URI.
pub const PUBLIC_COLLECTION: &str = "https://www.w3.org/ns/activitystreams#Public";

/// Activity verbs the router knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Create,
    Update,
    Delete,
    Follow,
    Accept,
    Reject,
    Undo,
    Like,
    Dislike,
    Announce,
    View,
    Read,
    /// Emoji reaction (`EmojiReact`), carrying the emoji as `content`.
    EmojiReact,
    TentativeAccept,
    Invite,
    Block,
    Move,
    Flag,
    Add,
    Remove,
    Other(String),
}

impl Verb {
    #[must_use]
    pub fn parse(kind: &str) -> Self {
        match kind {
            "Create" => Self::Create,
            "Update" => Self::Update,
            "Delete" => Self::Delete,
            "Follow" => Self::Follow,
            "Accept" => Self::Accept,
            "Reject" => Self::Reject,
            "Undo" => Self::Undo,
            "Like" => Self::Like,
            "Dislike" => Self::Dislike,
            "Announce" => Self::Announce,
            "View" => Self::View,
            "Read" => Self::Read,
            "EmojiReact" => Self::EmojiReact,
            "TentativeAccept" => Self::TentativeAccept,
            "Invite" => Self::Invite,
            "Block" => Self::Block,
            "Move" => Self::Move,
            "Flag" => Self::Flag,
            "Add" => Self::Add,
            "Remove" => Self::Remove,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Follow => "Follow",
            Self::Accept => "Accept",
            Self::Reject => "Reject",
            Self::Undo => "Undo",
            Self::Like => "Like",
            Self::Dislike => "Dislike",
            Self::Announce => "Announce",
            Self::View => "View",
            Self::Read => "Read",
            Self::EmojiReact => "EmojiReact",
            Self::TentativeAccept => "TentativeAccept",
            Self::Invite => "Invite",
            Self::Block => "Block",
            Self::Move => "Move",
            Self::Flag => "Flag",
            Self::Add => "Add",
            Self::Remove => "Remove",
            Self::Other(kind) => kind,
        }
    }

    /// Verbs that introduce content and may be queued before they are trusted.
    #[must_use]
    pub const fn creates_content(&self) -> bool {
        matches!(
            self,
            Self::Create | Self::Update | Self::Announce | Self::Invite
        )
    }
}

/// Kind of the object an activity acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectKind {
    /// Note, Article, Question and other postable objects.
    Content(String),
    /// Person, Service, Group and other actors.
    Actor(String),
    /// An embedded activity (Follow, Like, Announce ...).
    Activity(Verb),
    Tombstone,
    /// Object given only by reference; its type is not known yet.
    Reference,
    /// Object present with an empty type.
    Empty,
    Unknown(String),
}

const CONTENT_TYPES: &[&str] = &[
    "Note", "Article", "Question", "Event", "Page", "Video", "Audio", "Image", "Document",
];

const ACTOR_TYPES: &[&str] = &["Person", "Service", "Group", "Organization", "Application"];

impl ObjectKind {
    #[must_use]
    pub fn parse(kind: &str) -> Self {
        if kind.is_empty() {
            return Self::Empty;
        }
        if kind == "Tombstone" {
            return Self::Tombstone;
        }
        if CONTENT_TYPES.contains(&kind) {
            return Self::Content(kind.to_string());
        }
        if ACTOR_TYPES.contains(&kind) {
            return Self::Actor(kind.to_string());
        }
        match Verb::parse(kind) {
            Verb::Other(other) => Self::Unknown(other),
            verb => Self::Activity(verb),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Content(kind) | Self::Actor(kind) | Self::Unknown(kind) => kind,
            Self::Activity(verb) => verb.as_str(),
            Self::Tombstone => "Tombstone",
            Self::Reference | Self::Empty => "",
        }
    }

    #[must_use]
    pub const fn is_content(&self) -> bool {
        matches!(self, Self::Content(_))
    }
}

/// Audience fields of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudienceFields {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bto: Vec<String>,
    pub bcc: Vec<String>,
}

impl AudienceFields {
    fn from_value(value: &Value) -> Self {
        Self {
            to: id_list(value.get("to")),
            cc: id_list(value.get("cc")),
            bto: id_list(value.get("bto")),
            bcc: id_list(value.get("bcc")),
        }
    }

    fn merge(&mut self, other: Self) {
        for (mine, theirs) in [
            (&mut self.to, other.to),
            (&mut self.cc, other.cc),
            (&mut self.bto, other.bto),
            (&mut self.bcc, other.bcc),
        ] {
            for id in theirs {
                if !mine.contains(&id) {
                    mine.push(id);
                }
            }
        }
    }

    /// Whether the public collection appears in any field.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.to
            .iter()
            .chain(&self.cc)
            .any(|id| id == PUBLIC_COLLECTION || id == "as:Public" || id == "Public")
    }
}

/// An inbound activity with its routing fields extracted.
#[derive(Debug, Clone)]
pub struct IncomingActivity {
    pub id: String,
    pub verb: Verb,
    pub actor: String,
    pub object_id: Option<String>,
    pub object_kind: ObjectKind,
    /// Inline object, absent when the object was given by reference.
    pub object: Option<Value>,
    pub attributed_to: Option<String>,
    pub in_reply_to: Option<String>,
    pub conversation: Option<String>,
    pub audience: AudienceFields,
    /// Hashtag names (without `#`) found on the object.
    pub tags: Vec<String>,
    pub document: Value,
}

impl IncomingActivity {
    /// Parse a raw activity document.
    ///
    /// Documents without an id, type, actor or object are rejected as malformed.
    pub fn parse(document: Value) -> AppResult<Self> {
        let id = id_of(document.get("id"))
            .ok_or_else(|| AppError::BadRequest("activity without id".to_string()))?;
        let kind = document
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::BadRequest(format!("activity without type: {id}")))?;
        let actor = id_of(document.get("actor"))
            .ok_or_else(|| AppError::BadRequest(format!("activity without actor: {id}")))?;
        let raw_object = document
            .get("object")
            .ok_or_else(|| AppError::BadRequest(format!("activity without object: {id}")))?;

        let verb = Verb::parse(kind);
        let object = raw_object.is_object().then(|| raw_object.clone());
        let object_id = id_of(Some(raw_object));

        let object_kind = match &object {
            Some(inline) => {
                ObjectKind::parse(inline.get("type").and_then(Value::as_str).unwrap_or(""))
            }
            None => ObjectKind::Reference,
        };

        let mut audience = AudienceFields::from_value(&document);
        if let Some(inline) = &object {
            audience.merge(AudienceFields::from_value(inline));
        }

        let attributed_to = object
            .as_ref()
            .and_then(|o| id_of(o.get("attributedTo")));
        let in_reply_to = object.as_ref().and_then(|o| id_of(o.get("inReplyTo")));
        let conversation = object.as_ref().and_then(|o| {
            id_of(o.get("conversation")).or_else(|| id_of(o.get("context")))
        });
        let tags = object
            .as_ref()
            .and_then(|o| o.get("tag"))
            .map(hashtags)
            .unwrap_or_default();

        Ok(Self {
            id,
            verb,
            actor,
            object_id,
            object_kind,
            object,
            attributed_to,
            in_reply_to,
            conversation,
            audience,
            tags,
            document,
        })
    }

    /// URI this activity must wait for before it can be routed.
    ///
    /// Replies wait for their parent; shares of unknown content wait for the
    /// shared object.
    #[must_use]
    pub fn dependency(&self) -> Option<&str> {
        if self.verb == Verb::Announce {
            return self.object_id.as_deref();
        }
        match (&self.in_reply_to, &self.object_id) {
            (Some(parent), Some(object)) if parent == object => None,
            (Some(parent), _) => Some(parent),
            (None, _) => None,
        }
    }
}

/// Extract an identifier from a string, an object with `id`, or a one-element array.
#[must_use]
pub fn id_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map.get("id").and_then(|v| id_of(Some(v))),
        Value::Array(items) => items.first().and_then(|v| id_of(Some(v))),
        _ => None,
    }
}

pub(crate) fn id_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(|v| id_of(Some(v))).collect(),
        Some(single) => id_of(Some(single)).into_iter().collect(),
        None => Vec::new(),
    }
}

fn hashtags(tags: &Value) -> Vec<String> {
    let items = match tags {
        Value::Array(items) => items.iter().collect::<Vec<_>>(),
        single => vec![single],
    };
    items
        .into_iter()
        .filter(|t| t.get("type").and_then(Value::as_str) == Some("Hashtag"))
        .filter_map(|t| t.get("name").and_then(Value::as_str))
        .map(|name| name.trim_start_matches('#').to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_create_with_inline_note() {
        let activity = IncomingActivity::parse(json!({
            "id": "https://remote.example/activities/1",
            "type": "Create",
            "actor": "https://remote.example/users/alice",
            "to": [PUBLIC_COLLECTION],
            "object": {
                "id": "https://remote.example/notes/1",
                "type": "Note",
                "attributedTo": "https://remote.example/users/alice",
                "inReplyTo": "https://other.example/notes/9",
                "cc": ["https://remote.example/users/alice/followers"],
                "tag": [{"type": "Hashtag", "name": "#Rust"}],
                "content": "<p>hi</p>"
            }
        }))
        .unwrap();

        assert_eq!(activity.verb, Verb::Create);
        assert_eq!(activity.object_kind, ObjectKind::Content("Note".to_string()));
        assert_eq!(activity.dependency(), Some("https://other.example/notes/9"));
        assert!(activity.audience.is_public());
        assert_eq!(activity.audience.cc.len(), 1);
        assert_eq!(activity.tags, vec!["rust"]);
    }

    #[test]
    fn test_parse_rejects_missing_actor() {
        let result = IncomingActivity::parse(json!({
            "id": "https://remote.example/activities/1",
            "type": "Like",
            "object": "https://local.example/notes/1"
        }));
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_reference_object_and_actor_object() {
        let activity = IncomingActivity::parse(json!({
            "id": "https://remote.example/activities/2",
            "type": "Like",
            "actor": {"id": "https://remote.example/users/bob", "type": "Person"},
            "object": "https://local.example/notes/1"
        }))
        .unwrap();

        assert_eq!(activity.actor, "https://remote.example/users/bob");
        assert_eq!(activity.object_kind, ObjectKind::Reference);
        assert_eq!(activity.object_id.as_deref(), Some("https://local.example/notes/1"));
        assert_eq!(activity.dependency(), None);
    }

    #[test]
    fn test_announce_depends_on_shared_object() {
        let activity = IncomingActivity::parse(json!({
            "id": "https://relay.example/activities/3",
            "type": "Announce",
            "actor": "https://relay.example/actor",
            "object": "https://remote.example/notes/5"
        }))
        .unwrap();
        assert_eq!(activity.dependency(), Some("https://remote.example/notes/5"));
    }

    #[test]
    fn test_object_kind_table() {
        assert_eq!(ObjectKind::parse("Person"), ObjectKind::Actor("Person".to_string()));
        assert_eq!(ObjectKind::parse("Follow"), ObjectKind::Activity(Verb::Follow));
        assert_eq!(ObjectKind::parse(""), ObjectKind::Empty);
        assert_eq!(ObjectKind::parse("Tombstone"), ObjectKind::Tombstone);
        assert_eq!(ObjectKind::parse("Block"), ObjectKind::Activity(Verb::Block));
        assert_eq!(ObjectKind::parse("Hashtag"), ObjectKind::Unknown("Hashtag".to_string()));
    }

    #[test]
    fn test_verb_names() {
        for name in ["EmojiReact", "TentativeAccept", "Invite", "Move", "Flag", "Add", "Remove"] {
            let verb = Verb::parse(name);
            assert!(!matches!(verb, Verb::Other(_)), "{name}");
            assert_eq!(verb.as_str(), name);
        }
        assert!(Verb::Invite.creates_content());
        assert!(!Verb::Block.creates_content());
        assert_eq!(Verb::parse("Arrive"), Verb::Other("Arrive".to_string()));
    }
}
