//! Outbound side: audience, inbox resolution and fan-out of local items.

#![allow(missing_docs)]

mod audience;
mod inboxes;

pub use audience::{AudienceTranslator, Permissions};
pub use inboxes::{InboxMap, InboxResolver};

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;
use weft_common::{AppError, AppResult};

use crate::activities::{
    AcceptActivity, AnnounceActivity, CreateActivity, DeleteActivity, FollowActivity,
    LikeActivity, ReactionType, RejectActivity, UpdateActivity, parse_url, parse_urls,
};
use crate::client::SenderContext;
use crate::context::FederationContext;
use crate::objects::{ApAttachment, ApNote, ApTag};
use crate::store::{LocalAccount, OutgoingItem, OutgoingVerb};
use crate::tasks::{Priority, Task};

const ACTIVITY_STREAMS: &str = "https://www.w3.org/ns/activitystreams";

impl From<&LocalAccount> for SenderContext {
    fn from(account: &LocalAccount) -> Self {
        Self {
            key_id: account.key_id.clone(),
            private_key_pem: account.private_key_pem.clone(),
        }
    }
}

/// Builds and hands out activities of local accounts.
#[derive(Clone)]
pub struct Transmitter {
    ctx: FederationContext,
}

impl Transmitter {
    #[must_use]
    pub const fn new(ctx: FederationContext) -> Self {
        Self { ctx }
    }

    /// Recipients of an item.
    pub async fn permissions(
        &self,
        item: &OutgoingItem,
        account: &LocalAccount,
    ) -> AppResult<Permissions> {
        AudienceTranslator::new(self.ctx.clone())
            .translate(item, account)
            .await
    }

    /// Inboxes an item must reach.
    pub async fn resolve_inboxes(
        &self,
        item: &OutgoingItem,
        account: &LocalAccount,
        perms: &Permissions,
    ) -> AppResult<InboxMap> {
        let relayed = perms.is_public()
            && matches!(
                item.verb,
                OutgoingVerb::Create
                    | OutgoingVerb::Update
                    | OutgoingVerb::Delete
                    | OutgoingVerb::Announce
            );
        InboxResolver::new(self.ctx.clone())
            .resolve(account, perms, relayed)
            .await
    }

    /// Record one delivery obligation per inbox and schedule the batches.
    /// Returns the number of inboxes.
    pub async fn fan_out(&self, uri_id: i64) -> AppResult<usize> {
        let item = self
            .ctx
            .content
            .outgoing_item(uri_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("outgoing item {uri_id}")))?;
        let account = self
            .ctx
            .contacts
            .account(item.uid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("account {}", item.uid)))?;

        let perms = self.permissions(&item, &account).await?;
        let inboxes = self.resolve_inboxes(&item, &account, &perms).await?;

        for (inbox, receivers) in &inboxes {
            self.ctx
                .delivery_store
                .add_target(uri_id, inbox, receivers)
                .await?;
            self.ctx
                .runner
                .schedule(Priority::Low, Task::Deliver { inbox: inbox.clone() }, None)
                .await?;
        }
        info!(uri_id, uri = %item.uri, inboxes = inboxes.len(), "Item fanned out");
        Ok(inboxes.len())
    }

    /// Serialize an item as the activity sent to its audience.
    ///
    /// Only `to` and `cc` are written; blind recipients stay off the wire.
    pub fn activity_document(
        &self,
        item: &OutgoingItem,
        account: &LocalAccount,
        perms: &Permissions,
    ) -> AppResult<Value> {
        let actor = parse_url(&account.actor_url)?;
        let object = parse_url(&item.uri)?;
        let to = parse_urls(&perms.to)?;
        let cc = parse_urls(&perms.cc)?;

        let document = match item.verb {
            OutgoingVerb::Create => {
                let note = self.note(item, actor.clone(), to, cc)?;
                let id = parse_url(&format!("{}#create", item.uri))?;
                to_document(&CreateActivity::new(id, actor, note))?
            }
            OutgoingVerb::Update => {
                let note = self.note(item, actor.clone(), to, cc)?;
                let stamp = item.updated.unwrap_or(item.published).timestamp();
                let id = parse_url(&format!("{}#update-{stamp}", item.uri))?;
                to_document(&UpdateActivity::new(id, actor, note))?
            }
            OutgoingVerb::Delete => {
                let id = parse_url(&format!("{}#delete", item.uri))?;
                let mut delete = DeleteActivity::new(id, actor, object);
                delete.to = to;
                delete.cc = cc;
                to_document(&delete)?
            }
            OutgoingVerb::Announce => {
                let target = parse_url(target_of(item)?)?;
                let mut announce = AnnounceActivity::new(object, actor, target, item.published);
                announce.to = to;
                announce.cc = cc;
                to_document(&announce)?
            }
            OutgoingVerb::Like | OutgoingVerb::Dislike => {
                let kind = if item.verb == OutgoingVerb::Like {
                    ReactionType::Like
                } else {
                    ReactionType::Dislike
                };
                let target = parse_url(target_of(item)?)?;
                let mut like = LikeActivity::new(kind, object, actor, target);
                like.to = to;
                like.cc = cc;
                to_document(&like)?
            }
        };
        Ok(document)
    }

    fn note(
        &self,
        item: &OutgoingItem,
        actor: url::Url,
        to: Vec<url::Url>,
        cc: Vec<url::Url>,
    ) -> AppResult<ApNote> {
        let mut note = ApNote::new(parse_url(&item.uri)?, actor, item.content.clone(), item.published);
        note.updated = item.updated;
        note.to = to;
        note.cc = cc;
        note.summary = item.summary.clone();
        note.sensitive = item.sensitive;
        if let Some(parent) = &item.thread_parent {
            note.in_reply_to = Some(parse_url(parent)?);
        }
        if let Some(conversation) = &item.conversation {
            note = note.in_conversation(parse_url(conversation)?);
        }
        for mention in &item.mentions {
            note.tag.push(ApTag::mention(parse_url(mention)?));
        }
        for tag in &item.hashtags {
            note.tag.push(ApTag::hashtag(&self.ctx.settings.base_url, tag));
        }
        for attachment in &item.attachments {
            let url = parse_url(&attachment.url)?;
            if note.attachment.iter().any(|a| a.url == url) {
                continue;
            }
            note.attachment.push(ApAttachment::document(
                url,
                attachment.media_type.clone(),
                attachment.description.clone(),
            ));
        }
        Ok(note)
    }

    /// Answer an inbound Follow directly, outside the delivery queue.
    pub async fn send_follow_response(
        &self,
        account: &LocalAccount,
        follow: &Value,
        follower: &str,
        accept: bool,
    ) -> AppResult<()> {
        let Some(remote) = self.ctx.actors.get(follower).await? else {
            warn!(follower = %follower, "Cannot answer follow; follower unresolvable");
            return Ok(());
        };

        let verb = if accept { "accept" } else { "reject" };
        let id = parse_url(&format!("{}#{verb}/{}", account.actor_url, Uuid::new_v4()))?;
        let actor = parse_url(&account.actor_url)?;
        let follower_url = parse_url(follower)?;
        let document = if accept {
            to_document(&AcceptActivity::new(id, actor, follow.clone(), follower_url))?
        } else {
            to_document(&RejectActivity::new(id, actor, follow.clone(), follower_url))?
        };

        let outcome = self
            .ctx
            .transport
            .post(&document, &remote.inbox, &SenderContext::from(account))
            .await;
        if outcome.success {
            info!(follower = %follower, accept, "Follow answered");
        } else {
            warn!(follower = %follower, status = outcome.status, "Follow answer not delivered");
        }
        Ok(())
    }

    /// Subscribe the instance actor to a relay. Returns whether the relay
    /// took the request.
    pub async fn send_relay_follow(&self, relay: &str) -> AppResult<bool> {
        let account = self.ctx.contacts.instance_account().await?;
        let Some(remote) = self.ctx.actors.get(relay).await? else {
            warn!(relay = %relay, "Relay actor unresolvable");
            return Ok(false);
        };

        let id = parse_url(&format!("{}#follow/{}", account.actor_url, Uuid::new_v4()))?;
        let follow = FollowActivity::new(id, parse_url(&account.actor_url)?, parse_url(&remote.id)?);
        let document = to_document(&follow)?;
        let inbox = remote.shared_inbox.as_deref().unwrap_or(&remote.inbox);

        let outcome = self
            .ctx
            .transport
            .post(&document, inbox, &SenderContext::from(&account))
            .await;
        debug!(relay = %relay, status = outcome.status, "Relay follow sent");
        Ok(outcome.success)
    }
}

fn target_of(item: &OutgoingItem) -> AppResult<&str> {
    item.target
        .as_deref()
        .ok_or_else(|| AppError::Federation(format!("reaction {} has no target", item.uri)))
}

fn to_document<T: Serialize>(activity: &T) -> AppResult<Value> {
    let mut document = serde_json::to_value(activity)?;
    if let Value::Object(map) = &mut document {
        map.insert("@context".to_string(), json!(ACTIVITY_STREAMS));
    }
    Ok(document)
}
