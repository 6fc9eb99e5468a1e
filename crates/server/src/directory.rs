//! In-process content and contact stores of a standalone node.
//!
//! A node running without a host application owns a single account, the
//! instance actor. Remote posts, reactions and contacts are kept in memory
//! and lost on restart; the federation queues themselves live in the
//! database.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use weft_common::AppResult;
use weft_federation::{
    AccessControl, Contact, ContactStore, ContentStore, FollowDecision, IncomingPost,
    LocalAccount, OutgoingItem, Reaction, Report, StoredAudience, StoredContent,
};

#[derive(Default)]
struct Posts {
    by_uri: HashMap<String, (StoredContent, StoredAudience)>,
    reactions: Vec<Reaction>,
    participations: HashSet<(String, String)>,
    featured: HashSet<String>,
    tags: HashMap<String, Vec<String>>,
    items: HashMap<i64, OutgoingItem>,
}

impl Posts {
    fn authored_by(&self, uri: &str, actor: &str) -> bool {
        self.by_uri
            .get(uri)
            .is_some_and(|(post, _)| post.author == actor)
    }
}

#[derive(Default)]
struct Contacts {
    by_id: HashMap<i64, Contact>,
    followers: HashSet<i64>,
    following: HashSet<String>,
    archival: HashSet<i64>,
    blocked_by: HashSet<String>,
    reports: Vec<Report>,
    next_id: i64,
}

impl Contacts {
    fn find_or_insert(&mut self, url: &str) -> i64 {
        if let Some(contact) = self.by_id.values().find(|c| c.url == url) {
            return contact.id;
        }
        self.next_id += 1;
        let id = self.next_id;
        self.by_id.insert(
            id,
            Contact {
                id,
                url: url.to_string(),
                hidden: false,
            },
        );
        id
    }
}

/// Memory-backed [`ContentStore`] and [`ContactStore`].
pub struct MemoryDirectory {
    instance: LocalAccount,
    posts: RwLock<Posts>,
    contacts: RwLock<Contacts>,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new(instance: LocalAccount) -> Self {
        Self {
            instance,
            posts: RwLock::new(Posts::default()),
            contacts: RwLock::new(Contacts::default()),
        }
    }

    /// Register an item authored by the instance actor for fan-out.
    pub async fn publish(&self, item: OutgoingItem) {
        self.posts.write().await.items.insert(item.uri_id, item);
    }

    fn is_instance(&self, uid: i64) -> bool {
        uid == self.instance.uid
    }
}

fn audience_of(post: &IncomingPost) -> StoredAudience {
    let urls = |key: &str| -> Vec<String> {
        match post.object.get(key) {
            Some(Value::String(url)) => vec![url.clone()],
            Some(Value::Array(urls)) => urls
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        }
    };
    StoredAudience {
        author: post.author.clone(),
        author_followers: None,
        to: urls("to"),
        cc: urls("cc"),
    }
}

#[async_trait]
impl ContentStore for MemoryDirectory {
    async fn exists(&self, uri: &str) -> AppResult<bool> {
        Ok(self.posts.read().await.by_uri.contains_key(uri))
    }

    async fn conversation_known(&self, conversation: &str) -> AppResult<bool> {
        Ok(self
            .posts
            .read()
            .await
            .by_uri
            .values()
            .any(|(post, _)| post.conversation.as_deref() == Some(conversation)))
    }

    async fn select_by_uri(&self, uri: &str) -> AppResult<Option<StoredContent>> {
        Ok(self
            .posts
            .read()
            .await
            .by_uri
            .get(uri)
            .map(|(post, _)| post.clone()))
    }

    async fn insert(&self, post: IncomingPost) -> AppResult<i64> {
        let mut posts = self.posts.write().await;
        if let Some((existing, _)) = posts.by_uri.get(&post.uri) {
            return Ok(existing.id);
        }
        let id = posts.by_uri.len() as i64 + 1;
        let audience = audience_of(&post);
        debug!(uri = %post.uri, author = %post.author, "Storing remote post");
        posts.by_uri.insert(
            post.uri.clone(),
            (
                StoredContent {
                    id,
                    uri: post.uri,
                    author: post.author,
                    conversation: post.conversation,
                },
                audience,
            ),
        );
        Ok(id)
    }

    async fn update(&self, post: IncomingPost) -> AppResult<bool> {
        let mut posts = self.posts.write().await;
        let audience = audience_of(&post);
        let Some((stored, stored_audience)) = posts.by_uri.get_mut(&post.uri) else {
            return Ok(false);
        };
        if stored.author != post.author {
            return Ok(false);
        }
        stored.conversation = post.conversation;
        *stored_audience = audience;
        Ok(true)
    }

    async fn tombstone(&self, uri: &str, actor: &str) -> AppResult<bool> {
        let mut posts = self.posts.write().await;
        let owned = posts.authored_by(uri, actor);
        if owned {
            posts.by_uri.remove(uri);
            posts.reactions.retain(|r| r.target != uri);
            posts.featured.remove(uri);
            posts.tags.remove(uri);
        }
        Ok(owned)
    }

    async fn add_reaction(&self, reaction: Reaction) -> AppResult<()> {
        let mut posts = self.posts.write().await;
        if !posts
            .reactions
            .iter()
            .any(|r| r.activity_id == reaction.activity_id)
        {
            posts.reactions.push(reaction);
        }
        Ok(())
    }

    async fn remove_reaction(&self, activity_id: &str, actor: &str) -> AppResult<bool> {
        let mut posts = self.posts.write().await;
        let before = posts.reactions.len();
        posts
            .reactions
            .retain(|r| !(r.activity_id == activity_id && r.actor == actor));
        Ok(posts.reactions.len() != before)
    }

    async fn add_participation(&self, uri: &str, actor: &str) -> AppResult<()> {
        self.posts
            .write()
            .await
            .participations
            .insert((uri.to_string(), actor.to_string()));
        Ok(())
    }

    async fn remove_participation(&self, uri: &str, actor: &str) -> AppResult<bool> {
        Ok(self
            .posts
            .write()
            .await
            .participations
            .remove(&(uri.to_string(), actor.to_string())))
    }

    async fn set_featured(&self, uri: &str, actor: &str, featured: bool) -> AppResult<bool> {
        let mut posts = self.posts.write().await;
        if !posts.authored_by(uri, actor) {
            return Ok(false);
        }
        if featured {
            posts.featured.insert(uri.to_string());
        } else {
            posts.featured.remove(uri);
        }
        Ok(true)
    }

    async fn add_tag(&self, uri: &str, actor: &str, tag: &str) -> AppResult<bool> {
        let mut posts = self.posts.write().await;
        if !posts.authored_by(uri, actor) {
            return Ok(false);
        }
        let tags = posts.tags.entry(uri.to_string()).or_default();
        let tag = tag.to_lowercase();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
        Ok(true)
    }

    async fn stored_audience(&self, uri: &str) -> AppResult<Option<StoredAudience>> {
        Ok(self
            .posts
            .read()
            .await
            .by_uri
            .get(uri)
            .map(|(_, audience)| audience.clone()))
    }

    async fn outgoing_item(&self, uri_id: i64) -> AppResult<Option<OutgoingItem>> {
        Ok(self.posts.read().await.items.get(&uri_id).cloned())
    }
}

#[async_trait]
impl ContactStore for MemoryDirectory {
    async fn local_account(&self, actor_url: &str) -> AppResult<Option<LocalAccount>> {
        Ok((self.instance.actor_url == actor_url).then(|| self.instance.clone()))
    }

    async fn account(&self, uid: i64) -> AppResult<Option<LocalAccount>> {
        Ok(self.is_instance(uid).then(|| self.instance.clone()))
    }

    async fn instance_account(&self) -> AppResult<LocalAccount> {
        Ok(self.instance.clone())
    }

    async fn follow_request(
        &self,
        uid: i64,
        follower: &str,
        _follow_id: &str,
    ) -> AppResult<FollowDecision> {
        if !self.is_instance(uid) {
            return Ok(FollowDecision::Reject);
        }
        let mut contacts = self.contacts.write().await;
        let id = contacts.find_or_insert(follower);
        contacts.followers.insert(id);
        info!(follower = %follower, "New follower");
        Ok(FollowDecision::Accept)
    }

    async fn account_for_follow(&self, follow_id: &str) -> AppResult<Option<LocalAccount>> {
        let issued = follow_id.starts_with(&format!("{}#follow/", self.instance.actor_url));
        Ok(issued.then(|| self.instance.clone()))
    }

    async fn follow_accepted(&self, uid: i64, followee: &str) -> AppResult<()> {
        if self.is_instance(uid) {
            let mut contacts = self.contacts.write().await;
            contacts.find_or_insert(followee);
            contacts.following.insert(followee.to_string());
            info!(followee = %followee, "Follow accepted");
        }
        Ok(())
    }

    async fn follow_rejected(&self, uid: i64, followee: &str) -> AppResult<()> {
        if self.is_instance(uid) {
            self.contacts.write().await.following.remove(followee);
            info!(followee = %followee, "Follow rejected");
        }
        Ok(())
    }

    async fn unfollow(&self, uid: i64, follower: &str) -> AppResult<()> {
        if self.is_instance(uid) {
            let mut contacts = self.contacts.write().await;
            let ids: Vec<i64> = contacts
                .by_id
                .values()
                .filter(|c| c.url == follower)
                .map(|c| c.id)
                .collect();
            for id in ids {
                contacts.followers.remove(&id);
            }
        }
        Ok(())
    }

    async fn set_blocked(&self, uid: i64, actor: &str, blocked: bool) -> AppResult<()> {
        if !self.is_instance(uid) {
            return Ok(());
        }
        let mut contacts = self.contacts.write().await;
        if blocked {
            contacts.blocked_by.insert(actor.to_string());
            warn!(actor = %actor, "Blocked by remote actor");
        } else {
            contacts.blocked_by.remove(actor);
        }
        Ok(())
    }

    async fn move_contacts(&self, from: &str, to: &str) -> AppResult<u64> {
        let mut contacts = self.contacts.write().await;
        let mut moved = 0;
        for contact in contacts.by_id.values_mut() {
            if contact.url == from {
                contact.url = to.to_string();
                moved += 1;
            }
        }
        if contacts.following.remove(from) {
            contacts.following.insert(to.to_string());
        }
        Ok(moved)
    }

    async fn file_report(&self, report: Report) -> AppResult<()> {
        warn!(
            reporter = %report.reporter,
            accounts = ?report.accounts,
            "Moderation report received"
        );
        self.contacts.write().await.reports.push(report);
        Ok(())
    }

    async fn remove_actor(&self, actor_url: &str) -> AppResult<u64> {
        let mut contacts = self.contacts.write().await;
        let ids: Vec<i64> = contacts
            .by_id
            .values()
            .filter(|c| c.url == actor_url)
            .map(|c| c.id)
            .collect();
        for id in &ids {
            contacts.by_id.remove(id);
            contacts.followers.remove(id);
            contacts.archival.remove(id);
        }
        contacts.following.remove(actor_url);
        Ok(ids.len() as u64)
    }

    async fn followers(&self, uid: i64) -> AppResult<Vec<Contact>> {
        if !self.is_instance(uid) {
            return Ok(Vec::new());
        }
        let contacts = self.contacts.read().await;
        let mut followers: Vec<Contact> = contacts
            .followers
            .iter()
            .filter_map(|id| contacts.by_id.get(id).cloned())
            .collect();
        followers.sort_by_key(|c| c.id);
        Ok(followers)
    }

    async fn contacts_for_acl(&self, uid: i64, acl: &AccessControl) -> AppResult<Vec<Contact>> {
        if !self.is_instance(uid) {
            return Ok(Vec::new());
        }
        let contacts = self.contacts.read().await;
        Ok(acl
            .allow_contacts
            .iter()
            .filter(|id| !acl.deny_contacts.contains(id))
            .filter_map(|id| contacts.by_id.get(id).cloned())
            .collect())
    }

    async fn contact(&self, id: i64) -> AppResult<Option<Contact>> {
        Ok(self.contacts.read().await.by_id.get(&id).cloned())
    }

    async fn contact_by_url(&self, uid: i64, url: &str) -> AppResult<Option<Contact>> {
        if !self.is_instance(uid) {
            return Ok(None);
        }
        Ok(self
            .contacts
            .read()
            .await
            .by_id
            .values()
            .find(|c| c.url == url)
            .cloned())
    }

    async fn mark_for_archival(&self, contact_ids: &[i64]) -> AppResult<()> {
        self.contacts
            .write()
            .await
            .archival
            .extend(contact_ids.iter().copied());
        Ok(())
    }

    async fn unmark_for_archival(&self, contact_ids: &[i64]) -> AppResult<()> {
        let mut contacts = self.contacts.write().await;
        for id in contact_ids {
            contacts.archival.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;
    use weft_federation::Completion;

    const ALICE: &str = "https://remote.example/users/alice";

    fn instance() -> LocalAccount {
        LocalAccount {
            uid: 0,
            actor_url: "https://weft.example/actor".to_string(),
            followers_url: "https://weft.example/actor/followers".to_string(),
            key_id: "https://weft.example/actor#main-key".to_string(),
            private_key_pem: String::new(),
            always_bcc: false,
        }
    }

    fn post(uri: &str, author: &str) -> IncomingPost {
        IncomingPost {
            uri: uri.to_string(),
            author: author.to_string(),
            object_type: "Note".to_string(),
            in_reply_to: None,
            conversation: None,
            object: json!({
                "id": uri,
                "to": "https://www.w3.org/ns/activitystreams#Public",
                "cc": [format!("{author}/followers")],
            }),
            receivers: vec![0],
            completion: Completion::Auto,
        }
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_and_keeps_audience() {
        let directory = MemoryDirectory::new(instance());
        let uri = "https://remote.example/notes/1";
        let first = directory.insert(post(uri, ALICE)).await.unwrap();
        let second = directory.insert(post(uri, ALICE)).await.unwrap();
        assert_eq!(first, second);

        let audience = directory.stored_audience(uri).await.unwrap().unwrap();
        assert_eq!(audience.author, ALICE);
        assert_eq!(
            audience.to,
            vec!["https://www.w3.org/ns/activitystreams#Public"]
        );
        assert_eq!(audience.cc, vec![format!("{ALICE}/followers")]);
    }

    #[tokio::test]
    async fn test_only_the_author_tombstones() {
        let directory = MemoryDirectory::new(instance());
        let uri = "https://remote.example/notes/2";
        directory.insert(post(uri, ALICE)).await.unwrap();

        assert!(!directory.tombstone(uri, "https://evil.example/users/m").await.unwrap());
        assert!(directory.tombstone(uri, ALICE).await.unwrap());
        assert!(!directory.exists(uri).await.unwrap());
    }

    #[tokio::test]
    async fn test_followers_of_the_instance_actor() {
        let directory = MemoryDirectory::new(instance());
        let decision = directory
            .follow_request(0, ALICE, "https://remote.example/follows/1")
            .await
            .unwrap();
        assert_eq!(decision, FollowDecision::Accept);
        assert_eq!(
            directory
                .follow_request(5, ALICE, "https://remote.example/follows/2")
                .await
                .unwrap(),
            FollowDecision::Reject
        );

        let followers = directory.followers(0).await.unwrap();
        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].url, ALICE);

        directory.unfollow(0, ALICE).await.unwrap();
        assert!(directory.followers(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_only_the_author_features_and_tags() {
        let directory = MemoryDirectory::new(instance());
        let uri = "https://remote.example/notes/3";
        directory.insert(post(uri, ALICE)).await.unwrap();

        assert!(!directory.set_featured(uri, "https://evil.example/users/m", true).await.unwrap());
        assert!(directory.set_featured(uri, ALICE, true).await.unwrap());
        assert!(directory.posts.read().await.featured.contains(uri));
        assert!(directory.set_featured(uri, ALICE, false).await.unwrap());
        assert!(directory.posts.read().await.featured.is_empty());

        assert!(directory.add_tag(uri, ALICE, "Rust").await.unwrap());
        assert!(directory.add_tag(uri, ALICE, "rust").await.unwrap());
        assert_eq!(directory.posts.read().await.tags[uri], vec!["rust"]);
    }

    #[tokio::test]
    async fn test_moved_followers_keep_following() {
        let directory = MemoryDirectory::new(instance());
        let moved_to = "https://new.example/users/alice";
        directory
            .follow_request(0, ALICE, "https://remote.example/follows/1")
            .await
            .unwrap();

        assert_eq!(directory.move_contacts(ALICE, moved_to).await.unwrap(), 1);
        let followers = directory.followers(0).await.unwrap();
        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].url, moved_to);
    }

    #[tokio::test]
    async fn test_relay_follow_ids_map_to_the_instance() {
        let directory = MemoryDirectory::new(instance());
        let issued = directory
            .account_for_follow("https://weft.example/actor#follow/abc")
            .await
            .unwrap();
        assert_eq!(issued.unwrap().uid, 0);
        assert!(
            directory
                .account_for_follow("https://remote.example/follows/1")
                .await
                .unwrap()
                .is_none()
        );
    }
}
