//! Follow relationships: requests, answers and retractions.

use serde_json::Value;
use tracing::{debug, info};
use weft_common::AppResult;

use crate::context::FederationContext;
use crate::document::{IncomingActivity, id_of};
use crate::router::Route;
use crate::store::{FollowDecision, LocalAccount};
use crate::transmitter::Transmitter;

#[derive(Clone)]
pub struct FollowProcessor {
    ctx: FederationContext,
}

impl FollowProcessor {
    #[must_use]
    pub const fn new(ctx: FederationContext) -> Self {
        Self { ctx }
    }

    pub async fn process(&self, activity: &IncomingActivity, route: Route) -> AppResult<()> {
        info!(
            actor = %activity.actor,
            object = ?activity.object_id,
            activity_type = activity.verb.as_str(),
            "Processing Follow activity"
        );

        match route {
            Route::FollowActor => self.follow(activity).await,
            Route::FollowContent => {
                if let Some(uri) = &activity.object_id {
                    self.ctx
                        .content
                        .add_participation(uri, &activity.actor)
                        .await?;
                }
                Ok(())
            }
            Route::AcceptFollow => {
                let follow = activity.object.as_ref();
                let follow_id = activity.object_id.as_deref();
                if let Some(account) = self.follower_account(follow, follow_id).await? {
                    self.ctx
                        .contacts
                        .follow_accepted(account.uid, &activity.actor)
                        .await?;
                    info!(uid = account.uid, followee = %activity.actor, "Follow accepted");
                }
                Ok(())
            }
            Route::RejectFollow => {
                let follow = activity.object.as_ref();
                let follow_id = activity.object_id.as_deref();
                if let Some(account) = self.follower_account(follow, follow_id).await? {
                    self.ctx
                        .contacts
                        .follow_rejected(account.uid, &activity.actor)
                        .await?;
                    info!(uid = account.uid, followee = %activity.actor, "Follow rejected");
                }
                Ok(())
            }
            Route::UndoFollow => {
                let followee = activity
                    .object
                    .as_ref()
                    .and_then(|follow| id_of(follow.get("object")));
                let Some(followee) = followee else {
                    return Ok(());
                };
                if let Some(account) = self.ctx.contacts.local_account(&followee).await? {
                    self.ctx
                        .contacts
                        .unfollow(account.uid, &activity.actor)
                        .await?;
                    info!(uid = account.uid, follower = %activity.actor, "Unfollowed");
                } else if self
                    .ctx
                    .content
                    .remove_participation(&followee, &activity.actor)
                    .await?
                {
                    info!(object = %followee, actor = %activity.actor, "Thread subscription ended");
                } else {
                    debug!(activity_id = %activity.id, "Undone follow targets nothing local");
                }
                Ok(())
            }
            Route::UndoAccept => {
                let inner = activity.object.as_ref().and_then(|accept| accept.get("object"));
                let inner_id = id_of(inner);
                let follow = inner.filter(|v| v.is_object());
                if let Some(account) = self.follower_account(follow, inner_id.as_deref()).await? {
                    self.ctx
                        .contacts
                        .follow_rejected(account.uid, &activity.actor)
                        .await?;
                    info!(uid = account.uid, followee = %activity.actor, "Follow revoked");
                    return Ok(());
                }
                // Not a follow answer: an event attendance is withdrawn.
                if let Some(accept_id) = &activity.object_id {
                    if self
                        .ctx
                        .content
                        .remove_reaction(accept_id, &activity.actor)
                        .await?
                    {
                        info!(reaction = %accept_id, "Attendance withdrawn");
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn follow(&self, activity: &IncomingActivity) -> AppResult<()> {
        let Some(followee) = activity.object_id.as_deref() else {
            return Ok(());
        };

        let Some(account) = self.ctx.contacts.local_account(followee).await? else {
            // Following a post subscribes to its thread.
            if self.ctx.content.exists(followee).await? {
                self.ctx
                    .content
                    .add_participation(followee, &activity.actor)
                    .await?;
            } else {
                debug!(object = %followee, "Follow of an unknown target");
            }
            return Ok(());
        };

        let decision = self
            .ctx
            .contacts
            .follow_request(account.uid, &activity.actor, &activity.id)
            .await?;
        info!(uid = account.uid, follower = %activity.actor, ?decision, "Follow request recorded");

        let accept = match decision {
            FollowDecision::Accept => true,
            FollowDecision::Reject => false,
            FollowDecision::Pending => return Ok(()),
        };
        Transmitter::new(self.ctx.clone())
            .send_follow_response(&account, &activity.document, &activity.actor, accept)
            .await
    }

    /// The local account that sent the follow answered by an Accept or Reject.
    async fn follower_account(
        &self,
        follow: Option<&Value>,
        follow_id: Option<&str>,
    ) -> AppResult<Option<LocalAccount>> {
        if let Some(actor) = follow.and_then(|f| id_of(f.get("actor"))) {
            if let Some(account) = self.ctx.contacts.local_account(&actor).await? {
                return Ok(Some(account));
            }
        }
        match follow_id {
            Some(id) => self.ctx.contacts.account_for_follow(id).await,
            None => Ok(None),
        }
    }
}
