//! Recording fakes and a manually drained task runner for pipeline tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue};
use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use weft_common::{AppResult, CacheConfig};
use weft_db::MemoryStore;
use weft_federation::{
    AccessControl, ActorCache, Admission, ArrivedCache, Contact, ContactStore, ContentStore,
    Federation, FederationContext, FederationSettings, FollowDecision, HttpTransport,
    IncomingPost, LocalAccount, MemoryCacheBackend, OutgoingItem, OutgoingVerb, PostOutcome,
    Priority, Reaction, Report, SenderContext, SignatureVerifier, StoredAudience, StoredContent,
    Task, TaskExecutor, TaskHandle, TaskRunner, Visibility,
};

pub const BASE: &str = "https://weft.example";
pub const SIGNER_HEADER: &str = "x-test-signer";

// ---------------------------------------------------------------------------
// Content store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ContentState {
    pub posts: Vec<StoredContent>,
    pub reactions: Vec<Reaction>,
    pub participations: Vec<(String, String)>,
    pub featured: HashSet<String>,
    pub tags: Vec<(String, String)>,
    pub tombstoned: Vec<String>,
    pub audiences: HashMap<String, StoredAudience>,
    pub items: HashMap<i64, OutgoingItem>,
    pub updates: usize,
}

#[derive(Default)]
pub struct FakeContent {
    pub state: Mutex<ContentState>,
}

impl FakeContent {
    /// URIs in the order they were materialized.
    pub async fn order(&self) -> Vec<String> {
        self.state.lock().await.posts.iter().map(|p| p.uri.clone()).collect()
    }

    pub async fn seed(&self, uri: &str, author: &str) {
        let mut state = self.state.lock().await;
        let id = state.posts.len() as i64 + 1;
        state.posts.push(StoredContent {
            id,
            uri: uri.to_string(),
            author: author.to_string(),
            conversation: None,
        });
    }

    pub async fn add_item(&self, item: OutgoingItem) {
        self.state.lock().await.items.insert(item.uri_id, item);
    }
}

#[async_trait]
impl ContentStore for FakeContent {
    async fn exists(&self, uri: &str) -> AppResult<bool> {
        Ok(self.state.lock().await.posts.iter().any(|p| p.uri == uri))
    }

    async fn conversation_known(&self, conversation: &str) -> AppResult<bool> {
        Ok(self
            .state
            .lock()
            .await
            .posts
            .iter()
            .any(|p| p.conversation.as_deref() == Some(conversation)))
    }

    async fn select_by_uri(&self, uri: &str) -> AppResult<Option<StoredContent>> {
        Ok(self.state.lock().await.posts.iter().find(|p| p.uri == uri).cloned())
    }

    async fn insert(&self, post: IncomingPost) -> AppResult<i64> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.posts.iter().find(|p| p.uri == post.uri) {
            return Ok(existing.id);
        }
        let id = state.posts.len() as i64 + 1;
        state.posts.push(StoredContent {
            id,
            uri: post.uri,
            author: post.author,
            conversation: post.conversation,
        });
        Ok(id)
    }

    async fn update(&self, post: IncomingPost) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let known = state.posts.iter().any(|p| p.uri == post.uri);
        if known {
            state.updates += 1;
        }
        Ok(known)
    }

    async fn tombstone(&self, uri: &str, actor: &str) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.posts.len();
        state.posts.retain(|p| !(p.uri == uri && p.author == actor));
        let removed = state.posts.len() != before;
        if removed {
            state.tombstoned.push(uri.to_string());
        }
        Ok(removed)
    }

    async fn add_reaction(&self, reaction: Reaction) -> AppResult<()> {
        self.state.lock().await.reactions.push(reaction);
        Ok(())
    }

    async fn remove_reaction(&self, activity_id: &str, actor: &str) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.reactions.len();
        state
            .reactions
            .retain(|r| !(r.activity_id == activity_id && r.actor == actor));
        Ok(state.reactions.len() != before)
    }

    async fn add_participation(&self, uri: &str, actor: &str) -> AppResult<()> {
        self.state
            .lock()
            .await
            .participations
            .push((uri.to_string(), actor.to_string()));
        Ok(())
    }

    async fn remove_participation(&self, uri: &str, actor: &str) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.participations.len();
        state
            .participations
            .retain(|(u, a)| !(u == uri && a == actor));
        Ok(state.participations.len() != before)
    }

    async fn set_featured(&self, uri: &str, actor: &str, featured: bool) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        if !state.posts.iter().any(|p| p.uri == uri && p.author == actor) {
            return Ok(false);
        }
        if featured {
            state.featured.insert(uri.to_string());
        } else {
            state.featured.remove(uri);
        }
        Ok(true)
    }

    async fn add_tag(&self, uri: &str, actor: &str, tag: &str) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        if !state.posts.iter().any(|p| p.uri == uri && p.author == actor) {
            return Ok(false);
        }
        state.tags.push((uri.to_string(), tag.to_string()));
        Ok(true)
    }

    async fn stored_audience(&self, uri: &str) -> AppResult<Option<StoredAudience>> {
        Ok(self.state.lock().await.audiences.get(uri).cloned())
    }

    async fn outgoing_item(&self, uri_id: i64) -> AppResult<Option<OutgoingItem>> {
        Ok(self.state.lock().await.items.get(&uri_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// Contact store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ContactState {
    pub accounts: Vec<LocalAccount>,
    pub contacts: HashMap<i64, Vec<Contact>>,
    pub followers: HashMap<i64, Vec<i64>>,
    pub decision: Option<FollowDecision>,
    pub follow_requests: Vec<(i64, String)>,
    pub accepted: Vec<(i64, String)>,
    pub rejected: Vec<(i64, String)>,
    pub unfollowed: Vec<(i64, String)>,
    pub removed_actors: Vec<String>,
    pub blocks: HashSet<(i64, String)>,
    pub reports: Vec<Report>,
    pub archival: HashSet<i64>,
    pub outgoing_follows: HashMap<String, i64>,
    pub instance_key: Option<String>,
}

#[derive(Default)]
pub struct FakeContacts {
    pub state: Mutex<ContactState>,
}

impl FakeContacts {
    pub async fn add_account(&self, account: LocalAccount) {
        self.state.lock().await.accounts.push(account);
    }

    /// Register a contact of `uid`, optionally as a follower.
    pub async fn add_contact(&self, uid: i64, contact: Contact, follower: bool) {
        let mut state = self.state.lock().await;
        if follower {
            state.followers.entry(uid).or_default().push(contact.id);
        }
        state.contacts.entry(uid).or_default().push(contact);
    }

    fn all(state: &ContactState) -> impl Iterator<Item = &Contact> {
        state.contacts.values().flatten()
    }
}

#[async_trait]
impl ContactStore for FakeContacts {
    async fn local_account(&self, actor_url: &str) -> AppResult<Option<LocalAccount>> {
        Ok(self
            .state
            .lock()
            .await
            .accounts
            .iter()
            .find(|a| a.actor_url == actor_url)
            .cloned())
    }

    async fn account(&self, uid: i64) -> AppResult<Option<LocalAccount>> {
        Ok(self
            .state
            .lock()
            .await
            .accounts
            .iter()
            .find(|a| a.uid == uid)
            .cloned())
    }

    async fn instance_account(&self) -> AppResult<LocalAccount> {
        let mut instance = account(0, "actor");
        if let Some(key) = &self.state.lock().await.instance_key {
            instance.private_key_pem = key.clone();
        }
        Ok(instance)
    }

    async fn follow_request(
        &self,
        uid: i64,
        follower: &str,
        _follow_id: &str,
    ) -> AppResult<FollowDecision> {
        let mut state = self.state.lock().await;
        state.follow_requests.push((uid, follower.to_string()));
        Ok(state.decision.unwrap_or(FollowDecision::Accept))
    }

    async fn account_for_follow(&self, follow_id: &str) -> AppResult<Option<LocalAccount>> {
        let state = self.state.lock().await;
        let Some(uid) = state.outgoing_follows.get(follow_id) else {
            return Ok(None);
        };
        Ok(state.accounts.iter().find(|a| a.uid == *uid).cloned())
    }

    async fn follow_accepted(&self, uid: i64, followee: &str) -> AppResult<()> {
        self.state
            .lock()
            .await
            .accepted
            .push((uid, followee.to_string()));
        Ok(())
    }

    async fn follow_rejected(&self, uid: i64, followee: &str) -> AppResult<()> {
        self.state
            .lock()
            .await
            .rejected
            .push((uid, followee.to_string()));
        Ok(())
    }

    async fn unfollow(&self, uid: i64, follower: &str) -> AppResult<()> {
        self.state
            .lock()
            .await
            .unfollowed
            .push((uid, follower.to_string()));
        Ok(())
    }

    async fn set_blocked(&self, uid: i64, actor: &str, blocked: bool) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let key = (uid, actor.to_string());
        if blocked {
            state.blocks.insert(key);
        } else {
            state.blocks.remove(&key);
        }
        Ok(())
    }

    async fn move_contacts(&self, from: &str, to: &str) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let mut moved = 0;
        for contact in state.contacts.values_mut().flatten() {
            if contact.url == from {
                contact.url = to.to_string();
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn file_report(&self, report: Report) -> AppResult<()> {
        self.state.lock().await.reports.push(report);
        Ok(())
    }

    async fn remove_actor(&self, actor_url: &str) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        state.removed_actors.push(actor_url.to_string());
        let mut removed = 0;
        for contacts in state.contacts.values_mut() {
            let before = contacts.len();
            contacts.retain(|c| c.url != actor_url);
            removed += (before - contacts.len()) as u64;
        }
        Ok(removed)
    }

    async fn followers(&self, uid: i64) -> AppResult<Vec<Contact>> {
        let state = self.state.lock().await;
        let ids = state.followers.get(&uid).cloned().unwrap_or_default();
        Ok(Self::all(&state)
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn contacts_for_acl(&self, uid: i64, acl: &AccessControl) -> AppResult<Vec<Contact>> {
        let state = self.state.lock().await;
        Ok(state
            .contacts
            .get(&uid)
            .into_iter()
            .flatten()
            .filter(|c| acl.allow_contacts.contains(&c.id) && !acl.deny_contacts.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn contact(&self, id: i64) -> AppResult<Option<Contact>> {
        let state = self.state.lock().await;
        Ok(Self::all(&state).find(|c| c.id == id).cloned())
    }

    async fn contact_by_url(&self, uid: i64, url: &str) -> AppResult<Option<Contact>> {
        let state = self.state.lock().await;
        Ok(state
            .contacts
            .get(&uid)
            .into_iter()
            .flatten()
            .find(|c| c.url == url)
            .cloned())
    }

    async fn mark_for_archival(&self, contact_ids: &[i64]) -> AppResult<()> {
        self.state.lock().await.archival.extend(contact_ids);
        Ok(())
    }

    async fn unmark_for_archival(&self, contact_ids: &[i64]) -> AppResult<()> {
        let mut state = self.state.lock().await;
        for id in contact_ids {
            state.archival.remove(id);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transport and verifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeTransport {
    pub documents: Mutex<HashMap<String, Value>>,
    pub statuses: Mutex<VecDeque<u16>>,
    pub posts: Mutex<Vec<(String, Value)>>,
    pub fetched: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub async fn serve(&self, document: Value) {
        let id = document["id"].as_str().unwrap().to_string();
        self.documents.lock().await.insert(id, document);
    }

    /// Register a remote actor with a personal inbox and optional shared inbox.
    pub async fn serve_actor(&self, url: &str, shared_inbox: Option<&str>) {
        let mut actor = json!({
            "id": url,
            "type": "Person",
            "inbox": format!("{url}/inbox"),
            "followers": format!("{url}/followers"),
        });
        if let Some(shared) = shared_inbox {
            actor["endpoints"] = json!({ "sharedInbox": shared });
        }
        self.serve(actor).await;
    }

    /// Statuses returned by the next posts, in order; 202 afterwards.
    pub async fn script(&self, statuses: &[u16]) {
        self.statuses.lock().await.extend(statuses);
    }

    pub async fn posted_inboxes(&self) -> Vec<String> {
        self.posts.lock().await.iter().map(|(i, _)| i.clone()).collect()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn post(&self, document: &Value, inbox: &str, _sender: &SenderContext) -> PostOutcome {
        self.posts
            .lock()
            .await
            .push((inbox.to_string(), document.clone()));
        let status = self.statuses.lock().await.pop_front().unwrap_or(202);
        PostOutcome::with_status(status)
    }

    async fn fetch(&self, url: &str) -> AppResult<Option<Value>> {
        self.fetched.lock().await.push(url.to_string());
        Ok(self.documents.lock().await.get(url).cloned())
    }
}

/// Trusts whatever actor the test names in a request header.
pub struct HeaderVerifier;

#[async_trait]
impl SignatureVerifier for HeaderVerifier {
    async fn signer_of(&self, _body: &[u8], headers: &HeaderMap, _path: &str) -> Option<String> {
        headers
            .get(SIGNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    }

    async fn document_signer_of(&self, _document: &Value) -> Option<String> {
        None
    }
}

// ---------------------------------------------------------------------------
// Task runner
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ManualRunner {
    next: AtomicI64,
    pub queue: Mutex<VecDeque<(TaskHandle, Priority, Task)>>,
    finished: Mutex<HashSet<TaskHandle>>,
}

impl ManualRunner {
    pub async fn pending(&self) -> Vec<Task> {
        self.queue.lock().await.iter().map(|(_, _, t)| t.clone()).collect()
    }

    /// Drop every queued task without running it, as a restart would.
    pub async fn forget(&self) {
        let lost: Vec<TaskHandle> = self.queue.lock().await.drain(..).map(|(h, _, _)| h).collect();
        self.finished.lock().await.extend(lost);
    }

    /// Run queued tasks until none are left. Returns how many ran.
    pub async fn drain(&self, executor: &Federation) -> usize {
        let mut ran = 0;
        loop {
            let next = self.queue.lock().await.pop_front();
            let Some((handle, _, task)) = next else {
                return ran;
            };
            if let Err(e) = executor.execute(task.clone(), handle).await {
                executor.abandon(&task, handle).await.unwrap();
                eprintln!("task {handle} failed: {e}");
            }
            self.finished.lock().await.insert(handle);
            ran += 1;
            assert!(ran < 1000, "task queue does not drain");
        }
    }
}

#[async_trait]
impl TaskRunner for ManualRunner {
    async fn schedule(
        &self,
        priority: Priority,
        task: Task,
        _delay: Option<Duration>,
    ) -> AppResult<TaskHandle> {
        let handle = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        self.queue.lock().await.push_back((handle, priority, task));
        Ok(handle)
    }

    async fn is_alive(&self, handle: TaskHandle) -> bool {
        !self.finished.lock().await.contains(&handle)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub fn account(uid: i64, name: &str) -> LocalAccount {
    let actor_url = if uid == 0 {
        format!("{BASE}/actor")
    } else {
        format!("{BASE}/users/{name}")
    };
    LocalAccount {
        uid,
        followers_url: format!("{actor_url}/followers"),
        key_id: format!("{actor_url}#main-key"),
        actor_url,
        private_key_pem: String::new(),
        always_bcc: false,
    }
}

pub fn item(uri_id: i64, uid: i64, verb: OutgoingVerb, visibility: Visibility) -> OutgoingItem {
    OutgoingItem {
        uri_id,
        uri: format!("{BASE}/objects/{uri_id}"),
        uid,
        verb,
        visibility,
        acl: AccessControl::default(),
        target: None,
        thread_parent: None,
        conversation: None,
        mentions: Vec::new(),
        content: format!("item {uri_id}"),
        summary: None,
        sensitive: false,
        hashtags: Vec::new(),
        attachments: Vec::new(),
        published: Utc::now(),
        updated: None,
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub content: Arc<FakeContent>,
    pub contacts: Arc<FakeContacts>,
    pub transport: Arc<FakeTransport>,
    pub runner: Arc<ManualRunner>,
    pub federation: Federation,
}

impl Harness {
    /// Inline processing, no relays.
    pub fn new() -> Self {
        Self::with_settings(|settings| settings.inbox.decoupled = false)
    }

    pub fn with_settings(configure: impl FnOnce(&mut FederationSettings)) -> Self {
        let mut settings = FederationSettings::with_base_url(BASE).unwrap();
        configure(&mut settings);

        let store = Arc::new(MemoryStore::new());
        let content = Arc::new(FakeContent::default());
        let contacts = Arc::new(FakeContacts::default());
        let transport = Arc::new(FakeTransport::default());
        let runner = Arc::new(ManualRunner::default());
        let actors = ActorCache::new(
            Arc::new(MemoryCacheBackend::new()),
            transport.clone(),
            &CacheConfig::default(),
        );

        let ctx = FederationContext {
            settings: Arc::new(settings),
            queue_store: store.clone(),
            fetch_store: store.clone(),
            delivery_store: store.clone(),
            status_store: store.clone(),
            content: content.clone(),
            contacts: contacts.clone(),
            verifier: Arc::new(HeaderVerifier),
            transport: transport.clone(),
            runner: runner.clone(),
            actors,
            arrived: Arc::new(ArrivedCache::new(Duration::from_secs(60))),
        };

        Self {
            store,
            content,
            contacts,
            transport,
            runner,
            federation: Federation::new(ctx),
        }
    }

    /// POST a document to the shared inbox, signed by `signer` if given.
    pub async fn push(&self, document: &Value, signer: Option<&str>) -> AppResult<Admission> {
        self.push_to(document, signer, None).await
    }

    pub async fn push_to(
        &self,
        document: &Value,
        signer: Option<&str>,
        uid: Option<i64>,
    ) -> AppResult<Admission> {
        let mut headers = HeaderMap::new();
        if let Some(signer) = signer {
            headers.insert(SIGNER_HEADER, HeaderValue::from_str(signer).unwrap());
        }
        let body = serde_json::to_vec(document).unwrap();
        let path = uid.map_or_else(|| "/inbox".to_string(), |uid| format!("/users/{uid}/inbox"));
        self.federation
            .receiver()
            .process_inbox(&body, &headers, &path, uid)
            .await
    }

    pub async fn drain(&self) -> usize {
        self.runner.drain(&self.federation).await
    }
}

/// A public Create of a note, optionally replying to `parent`.
pub fn create_note(actor: &str, note: &str, parent: Option<&str>) -> Value {
    json!({
        "id": format!("{note}/activity"),
        "type": "Create",
        "actor": actor,
        "to": ["https://www.w3.org/ns/activitystreams#Public"],
        "object": bare_note(actor, note, parent),
    })
}

pub fn bare_note(author: &str, note: &str, parent: Option<&str>) -> Value {
    let mut object = json!({
        "id": note,
        "type": "Note",
        "attributedTo": author,
        "content": "hello",
        "to": ["https://www.w3.org/ns/activitystreams#Public"],
    });
    if let Some(parent) = parent {
        object["inReplyTo"] = json!(parent);
    }
    object
}
