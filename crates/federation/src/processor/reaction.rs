//! Likes, dislikes, views, shares and event attendance, and their retraction.

use serde_json::Value;
use tracing::{debug, info};
use weft_common::{AppError, AppResult};

use super::{QueuedActivity, RouteOutcome};
use crate::context::FederationContext;
use crate::document::IncomingActivity;
use crate::fetch::{Completion, FetchRequest};
use crate::router::Route;
use crate::store::{Reaction, ReactionKind};

/// Records reactions against stored content.
#[derive(Clone)]
pub struct ReactionProcessor {
    ctx: FederationContext,
}

impl ReactionProcessor {
    #[must_use]
    pub const fn new(ctx: FederationContext) -> Self {
        Self { ctx }
    }

    pub async fn process(&self, queued: &QueuedActivity, route: Route) -> AppResult<RouteOutcome> {
        let activity = &queued.activity;
        let target = activity
            .object_id
            .clone()
            .ok_or_else(|| AppError::BadRequest(format!("object without id: {}", activity.id)))?;

        match route {
            Route::AnnounceContent => self.announce(queued, target).await,
            Route::React(kind) => {
                info!(actor = %activity.actor, target = %target, ?kind, "Processing reaction");
                if !self.ctx.content.exists(&target).await? {
                    debug!(target = %target, "Reaction to unknown content; dropping");
                    return Ok(RouteOutcome::done(route));
                }
                self.ctx
                    .content
                    .add_reaction(Reaction {
                        activity_id: activity.id.clone(),
                        kind,
                        actor: activity.actor.clone(),
                        target,
                        content: emoji_of(activity, kind),
                        receivers: queued.receivers.clone(),
                    })
                    .await?;
                Ok(RouteOutcome::done(route))
            }
            _ => {
                info!(actor = %activity.actor, reaction = %target, "Processing Undo activity");
                if !self.ctx.content.remove_reaction(&target, &activity.actor).await? {
                    debug!(reaction = %target, "Undone reaction was not stored");
                }
                Ok(RouteOutcome::done(route))
            }
        }
    }

    async fn announce(&self, queued: &QueuedActivity, target: String) -> AppResult<RouteOutcome> {
        let activity = &queued.activity;
        let route = Route::AnnounceContent;
        let from_relay = self.ctx.settings.is_relay(&activity.actor);

        info!(
            actor = %activity.actor,
            target = %target,
            relay = from_relay,
            "Processing Announce activity"
        );

        if !self.ctx.content.exists(&target).await? {
            let completion = if from_relay {
                Completion::Relay
            } else {
                Completion::Announce
            };
            let mut request = FetchRequest::new(target, completion);
            request.child_author = Some(activity.actor.clone());
            request.child_entry = Some(queued.entry_id);
            if from_relay {
                request.relay_actor = Some(activity.actor.clone());
            }
            return Ok(RouteOutcome::waiting(route, request));
        }

        // A relay only distributes content; it is not a sharer.
        if from_relay {
            return Ok(RouteOutcome::materialized(route, target));
        }

        self.ctx
            .content
            .add_reaction(Reaction {
                activity_id: activity.id.clone(),
                kind: ReactionKind::Announce,
                actor: activity.actor.clone(),
                target: target.clone(),
                content: None,
                receivers: queued.receivers.clone(),
            })
            .await?;
        Ok(RouteOutcome::materialized(route, target))
    }
}

fn emoji_of(activity: &IncomingActivity, kind: ReactionKind) -> Option<String> {
    if kind != ReactionKind::EmojiReact {
        return None;
    }
    activity
        .document
        .get("content")
        .and_then(Value::as_str)
        .map(String::from)
}
