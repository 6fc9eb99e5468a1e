//! Create and Update of content.

use tracing::{debug, info};
use weft_common::{AppError, AppResult};

use super::{QueuedActivity, RouteOutcome};
use crate::context::FederationContext;
use crate::fetch::{Completion, FetchRequest};
use crate::router::Route;
use crate::store::IncomingPost;

/// Materializes remote posts.
#[derive(Clone)]
pub struct CreateProcessor {
    ctx: FederationContext,
}

impl CreateProcessor {
    #[must_use]
    pub const fn new(ctx: FederationContext) -> Self {
        Self { ctx }
    }

    pub async fn process(&self, queued: &QueuedActivity, route: Route) -> AppResult<RouteOutcome> {
        let activity = &queued.activity;
        let uri = activity
            .object_id
            .clone()
            .ok_or_else(|| AppError::BadRequest(format!("object without id: {}", activity.id)))?;

        info!(
            actor = %activity.actor,
            object_id = %uri,
            activity_type = activity.verb.as_str(),
            "Processing Create activity"
        );

        let Some(object) = activity.object.clone() else {
            if self.ctx.content.exists(&uri).await? {
                return Ok(RouteOutcome::materialized(route, uri));
            }
            // Only a link was pushed; the object is taken from its origin.
            debug!(object_id = %uri, "Create carries a bare reference; fetching object");
            let mut request = FetchRequest::new(uri, follow_up_completion(queued.completion));
            request.child_author = queued.signer.clone().or_else(|| Some(activity.actor.clone()));
            request.refresh = route == Route::UpdateContent;
            return Ok(RouteOutcome {
                follow_ups: vec![request],
                ..RouteOutcome::done(route)
            });
        };

        let post = IncomingPost {
            uri: uri.clone(),
            author: activity
                .attributed_to
                .clone()
                .unwrap_or_else(|| activity.actor.clone()),
            object_type: activity.object_kind.as_str().to_string(),
            in_reply_to: activity.in_reply_to.clone(),
            conversation: activity.conversation.clone(),
            object,
            receivers: queued.receivers.clone(),
            completion: queued.completion,
        };

        if route == Route::UpdateContent {
            if !self.ctx.content.update(post.clone()).await? {
                debug!(object_id = %uri, "Updated post was not stored; inserting");
                self.ctx.content.insert(post).await?;
            }
            info!(object_id = %uri, "Post updated");
        } else {
            let id = self.ctx.content.insert(post).await?;
            info!(object_id = %uri, post_id = id, "Post stored");
        }

        Ok(RouteOutcome::materialized(route, uri))
    }
}

fn follow_up_completion(completion: Completion) -> Completion {
    match completion {
        Completion::Auto => Completion::Async,
        other => other,
    }
}
