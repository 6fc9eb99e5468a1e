//! Mapping recipients to inboxes.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;
use weft_common::AppResult;

use super::Permissions;
use crate::cache::CachedRemoteActor;
use crate::context::FederationContext;
use crate::document::PUBLIC_COLLECTION;
use crate::store::LocalAccount;

/// Inbox URL mapped to the contact ids reached through it.
pub type InboxMap = BTreeMap<String, Vec<i64>>;

struct Recipient {
    actor: CachedRemoteActor,
    contact: Option<i64>,
}

/// Resolves the inboxes that must receive an item.
#[derive(Clone)]
pub struct InboxResolver {
    ctx: FederationContext,
}

impl InboxResolver {
    #[must_use]
    pub const fn new(ctx: FederationContext) -> Self {
        Self { ctx }
    }

    /// Expand the followers collection, map actors to inboxes and drop
    /// archived destinations. `include_relays` adds the configured relays.
    pub async fn resolve(
        &self,
        account: &LocalAccount,
        perms: &Permissions,
        include_relays: bool,
    ) -> AppResult<InboxMap> {
        let mut open_urls = Vec::new();
        for url in perms.to.iter().chain(&perms.cc) {
            if url == PUBLIC_COLLECTION {
                continue;
            }
            if *url == account.followers_url {
                open_urls.extend(
                    self.ctx
                        .contacts
                        .followers(account.uid)
                        .await?
                        .into_iter()
                        .map(|c| c.url),
                );
            } else {
                open_urls.push(url.clone());
            }
        }

        let open = self.recipients(account.uid, open_urls).await?;
        let blind = self.recipients(account.uid, perms.bcc.clone()).await?;

        let mut per_host: HashMap<&str, usize> = HashMap::new();
        for recipient in &open {
            *per_host.entry(recipient.actor.host.as_str()).or_default() += 1;
        }

        let mut inboxes = InboxMap::new();
        for recipient in &open {
            let shared = per_host
                .get(recipient.actor.host.as_str())
                .is_some_and(|&n| n > 1);
            let inbox = match (&recipient.actor.shared_inbox, shared) {
                (Some(shared_inbox), true) => shared_inbox.clone(),
                _ => recipient.actor.inbox.clone(),
            };
            add(&mut inboxes, inbox, recipient.contact);
        }
        // Blind recipients always get their personal inbox.
        for recipient in &blind {
            add(&mut inboxes, recipient.actor.inbox.clone(), recipient.contact);
        }

        if include_relays {
            for relay in &self.ctx.settings.relays {
                if let Some(actor) = self.ctx.actors.get(relay).await? {
                    let inbox = actor.shared_inbox.unwrap_or(actor.inbox);
                    inboxes.entry(inbox).or_default();
                }
            }
        }

        let mut reachable = InboxMap::new();
        for (inbox, contacts) in inboxes {
            let archived = self
                .ctx
                .status_store
                .find_status(&inbox)
                .await?
                .is_some_and(|s| s.archived);
            if archived {
                debug!(inbox = %inbox, "Skipping archived inbox");
                continue;
            }
            reachable.insert(inbox, contacts);
        }
        Ok(reachable)
    }

    async fn recipients(&self, uid: i64, urls: Vec<String>) -> AppResult<Vec<Recipient>> {
        let mut recipients: Vec<Recipient> = Vec::new();
        for url in urls {
            if self.ctx.settings.is_local(&url) || recipients.iter().any(|r| r.actor.id == url) {
                continue;
            }
            let Some(actor) = self.ctx.actors.get(&url).await? else {
                debug!(recipient = %url, "Recipient has no resolvable inbox");
                continue;
            };
            let contact = self
                .ctx
                .contacts
                .contact_by_url(uid, &url)
                .await?
                .map(|c| c.id);
            recipients.push(Recipient { actor, contact });
        }
        Ok(recipients)
    }
}

fn add(inboxes: &mut InboxMap, inbox: String, contact: Option<i64>) {
    let contacts = inboxes.entry(inbox).or_default();
    if let Some(id) = contact {
        if !contacts.contains(&id) {
            contacts.push(id);
        }
    }
}
