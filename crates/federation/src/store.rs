//! Collaborator interfaces to the content and contact stores.
//!
//! Posts, accounts and contacts live outside the federation pipeline. The
//! pipeline reads and mutates them only through [`ContentStore`] and
//! [`ContactStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_common::AppResult;

use crate::fetch::Completion;

/// Kind of a reaction recorded against content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReactionKind {
    Like,
    Dislike,
    Announce,
    View,
    Read,
    EmojiReact,
    /// Event attendance answers.
    Attend,
    AttendNo,
    AttendMaybe,
}

/// Content already materialized locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    pub id: i64,
    pub uri: String,
    pub author: String,
    pub conversation: Option<String>,
}

/// Audience of a stored post, used when a reply inherits its thread audience.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredAudience {
    pub author: String,
    /// Followers collection of the post author, if known.
    pub author_followers: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
}

/// Remote content about to be materialized.
#[derive(Debug, Clone)]
pub struct IncomingPost {
    pub uri: String,
    pub author: String,
    pub object_type: String,
    pub in_reply_to: Option<String>,
    pub conversation: Option<String>,
    pub object: Value,
    /// Local accounts the post was addressed to; `0` stands for the public.
    pub receivers: Vec<i64>,
    pub completion: Completion,
}

/// A reaction against stored content.
#[derive(Debug, Clone)]
pub struct Reaction {
    pub activity_id: String,
    pub kind: ReactionKind,
    pub actor: String,
    pub target: String,
    /// Emoji of an `EmojiReact`.
    pub content: Option<String>,
    pub receivers: Vec<i64>,
}

/// A moderation report filed by a remote actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub activity_id: String,
    pub reporter: String,
    /// Reported actors.
    pub accounts: Vec<String>,
    /// Reported posts that are stored locally.
    pub posts: Vec<String>,
    pub comment: Option<String>,
}

/// Outcome of an inbound follow request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowDecision {
    Accept,
    Pending,
    Reject,
}

/// A remote contact of a local account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: i64,
    pub url: String,
    /// The contact asked to stay hidden from other recipients.
    pub hidden: bool,
}

/// A local account able to sign outgoing activities.
#[derive(Debug, Clone)]
pub struct LocalAccount {
    pub uid: i64,
    pub actor_url: String,
    pub followers_url: String,
    pub key_id: String,
    pub private_key_pem: String,
    /// Address every non-public recipient by blind copy.
    pub always_bcc: bool,
}

/// Visibility of a locally authored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
}

/// Internal access-control lists of a private item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessControl {
    /// Addressed to the author's followers.
    pub followers: bool,
    pub allow_contacts: Vec<i64>,
    pub allow_circles: Vec<i64>,
    pub deny_contacts: Vec<i64>,
    pub deny_circles: Vec<i64>,
}

/// Verb of an outgoing activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutgoingVerb {
    Create,
    Update,
    Delete,
    Announce,
    Like,
    Dislike,
}

/// Media stored with a local item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub url: String,
    pub media_type: Option<String>,
    pub description: Option<String>,
}

/// A locally authored item awaiting delivery.
#[derive(Debug, Clone)]
pub struct OutgoingItem {
    pub uri_id: i64,
    /// URI of the object, or of the reaction activity for Announce/Like/Dislike.
    pub uri: String,
    pub uid: i64,
    pub verb: OutgoingVerb,
    pub visibility: Visibility,
    pub acl: AccessControl,
    /// Reacted-to object for Announce/Like/Dislike.
    pub target: Option<String>,
    pub thread_parent: Option<String>,
    pub conversation: Option<String>,
    pub mentions: Vec<String>,
    pub content: String,
    pub summary: Option<String>,
    pub sensitive: bool,
    pub hashtags: Vec<String>,
    pub attachments: Vec<Attachment>,
    pub published: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
}

/// Local post storage.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn exists(&self, uri: &str) -> AppResult<bool>;

    async fn conversation_known(&self, conversation: &str) -> AppResult<bool>;

    async fn select_by_uri(&self, uri: &str) -> AppResult<Option<StoredContent>>;

    /// Materialize a post. Inserting a known URI returns the existing id.
    async fn insert(&self, post: IncomingPost) -> AppResult<i64>;

    /// Replace the stored copy of a post; returns whether it existed.
    async fn update(&self, post: IncomingPost) -> AppResult<bool>;

    /// Tombstone a post authored by `actor`; returns whether it existed.
    async fn tombstone(&self, uri: &str, actor: &str) -> AppResult<bool>;

    async fn add_reaction(&self, reaction: Reaction) -> AppResult<()>;

    /// Remove the reaction created by `activity_id`; returns whether it existed.
    async fn remove_reaction(&self, activity_id: &str, actor: &str) -> AppResult<bool>;

    /// Record a thread subscription of `actor` on `uri`.
    async fn add_participation(&self, uri: &str, actor: &str) -> AppResult<()>;

    /// Drop a thread subscription; returns whether it existed.
    async fn remove_participation(&self, uri: &str, actor: &str) -> AppResult<bool>;

    /// Pin or unpin a post on its author's profile.
    ///
    /// Returns whether a post of `actor` was stored under `uri`.
    async fn set_featured(&self, uri: &str, actor: &str, featured: bool) -> AppResult<bool>;

    /// Attach a hashtag to a post of `actor`; returns whether the post was found.
    async fn add_tag(&self, uri: &str, actor: &str, tag: &str) -> AppResult<bool>;

    async fn stored_audience(&self, uri: &str) -> AppResult<Option<StoredAudience>>;

    async fn outgoing_item(&self, uri_id: i64) -> AppResult<Option<OutgoingItem>>;
}

/// Local accounts and their remote contacts.
#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn local_account(&self, actor_url: &str) -> AppResult<Option<LocalAccount>>;

    async fn account(&self, uid: i64) -> AppResult<Option<LocalAccount>>;

    /// The account that signs relay subscriptions.
    async fn instance_account(&self) -> AppResult<LocalAccount>;

    /// Record an inbound follow of `uid` by `follower`.
    async fn follow_request(
        &self,
        uid: i64,
        follower: &str,
        follow_id: &str,
    ) -> AppResult<FollowDecision>;

    /// Local account that issued the follow with the given activity id.
    async fn account_for_follow(&self, follow_id: &str) -> AppResult<Option<LocalAccount>>;

    async fn follow_accepted(&self, uid: i64, followee: &str) -> AppResult<()>;

    /// The remote side rejected or revoked a follow of `uid`.
    async fn follow_rejected(&self, uid: i64, followee: &str) -> AppResult<()>;

    async fn unfollow(&self, uid: i64, follower: &str) -> AppResult<()>;

    /// `actor` started or stopped blocking the local account `uid`.
    async fn set_blocked(&self, uid: i64, actor: &str, blocked: bool) -> AppResult<()>;

    /// Point every contact of `from` at `to` after an account move; returns how many.
    async fn move_contacts(&self, from: &str, to: &str) -> AppResult<u64>;

    async fn file_report(&self, report: Report) -> AppResult<()>;

    /// Remove every contact record of a deleted actor; returns how many.
    async fn remove_actor(&self, actor_url: &str) -> AppResult<u64>;

    async fn followers(&self, uid: i64) -> AppResult<Vec<Contact>>;

    /// Contacts admitted by an access-control list, denials applied.
    async fn contacts_for_acl(&self, uid: i64, acl: &AccessControl) -> AppResult<Vec<Contact>>;

    async fn contact(&self, id: i64) -> AppResult<Option<Contact>>;

    async fn contact_by_url(&self, uid: i64, url: &str) -> AppResult<Option<Contact>>;

    async fn mark_for_archival(&self, contact_ids: &[i64]) -> AppResult<()>;

    async fn unmark_for_archival(&self, contact_ids: &[i64]) -> AppResult<()>;
}
