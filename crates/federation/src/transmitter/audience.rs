//! Translation of internal access control into `to`/`cc`/`bcc`.

use tracing::debug;
use weft_common::AppResult;

use crate::context::FederationContext;
use crate::document::PUBLIC_COLLECTION;
use crate::store::{LocalAccount, OutgoingItem, Visibility};

/// Recipients of an outgoing activity.
///
/// `bcc` never appears in a serialized document; it only selects inboxes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
}

impl Permissions {
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.to.iter().chain(&self.cc).any(|u| u == PUBLIC_COLLECTION)
    }

    /// Drop the author and keep each recipient only in its strongest set.
    #[must_use]
    pub fn finish(self, author: &str) -> Self {
        let mut seen: Vec<String> = Vec::new();
        let mut keep = |list: Vec<String>| -> Vec<String> {
            let mut kept = Vec::new();
            for url in list {
                if url == author || seen.contains(&url) {
                    continue;
                }
                seen.push(url.clone());
                kept.push(url);
            }
            kept
        };
        let to = keep(self.to);
        let cc = keep(self.cc);
        let bcc = keep(self.bcc);
        Self { to, cc, bcc }
    }
}

/// Computes the recipients of locally authored items.
#[derive(Clone)]
pub struct AudienceTranslator {
    ctx: FederationContext,
}

impl AudienceTranslator {
    #[must_use]
    pub const fn new(ctx: FederationContext) -> Self {
        Self { ctx }
    }

    pub async fn translate(
        &self,
        item: &OutgoingItem,
        account: &LocalAccount,
    ) -> AppResult<Permissions> {
        let mut perms = Permissions::default();
        let followers = account.followers_url.clone();
        let always_bcc = account.always_bcc || self.ctx.settings.delivery.always_bcc;
        let private = item.visibility == Visibility::Private;

        match item.visibility {
            Visibility::Public => {
                perms.to.push(PUBLIC_COLLECTION.to_string());
                perms.cc.push(followers.clone());
            }
            Visibility::Unlisted => {
                perms.cc.push(PUBLIC_COLLECTION.to_string());
                perms.cc.push(followers.clone());
            }
            Visibility::Private => {
                if item.acl.followers {
                    perms.cc.push(followers.clone());
                }
                for contact in self.ctx.contacts.contacts_for_acl(item.uid, &item.acl).await? {
                    if contact.hidden || always_bcc {
                        perms.bcc.push(contact.url);
                    } else {
                        perms.cc.push(contact.url);
                    }
                }
            }
        }

        let mut mentions = item.mentions.clone();

        if let Some(parent) = &item.thread_parent {
            if let Some(thread) = self.ctx.content.stored_audience(parent).await? {
                debug!(parent = %parent, "Inheriting thread audience");
                mentions.push(thread.author.clone());
                let inherit = |url: &String| -> Option<String> {
                    if thread.author_followers.as_deref() == Some(url.as_str()) {
                        return (!private || item.acl.followers).then(|| followers.clone());
                    }
                    if private && url == PUBLIC_COLLECTION {
                        return None;
                    }
                    Some(url.clone())
                };
                perms.to.extend(thread.to.iter().filter_map(inherit));
                perms.cc.extend(thread.cc.iter().filter_map(inherit));
            }
        }

        let visible_followers = if private && item.acl.followers {
            self.ctx
                .contacts
                .followers(item.uid)
                .await?
                .into_iter()
                .filter(|c| !c.hidden)
                .map(|c| c.url)
                .collect()
        } else {
            Vec::new()
        };
        for mention in mentions {
            // A private item may only name recipients that can already see it.
            if private && !perms.cc.contains(&mention) && !visible_followers.contains(&mention) {
                continue;
            }
            perms.to.push(mention);
        }

        Ok(perms.finish(&account.actor_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_scrubs_author_and_prefers_to() {
        let perms = Permissions {
            to: vec!["https://a.example/users/1".to_string()],
            cc: vec![
                "https://a.example/users/1".to_string(),
                "https://weft.example/users/me".to_string(),
                "https://b.example/users/2".to_string(),
            ],
            bcc: vec![
                "https://b.example/users/2".to_string(),
                "https://c.example/users/3".to_string(),
            ],
        }
        .finish("https://weft.example/users/me");

        assert_eq!(perms.to, vec!["https://a.example/users/1"]);
        assert_eq!(perms.cc, vec!["https://b.example/users/2"]);
        assert_eq!(perms.bcc, vec!["https://c.example/users/3"]);
    }

    #[test]
    fn test_is_public() {
        let mut perms = Permissions::default();
        assert!(!perms.is_public());
        perms.cc.push(PUBLIC_COLLECTION.to_string());
        assert!(perms.is_public());
    }
}
