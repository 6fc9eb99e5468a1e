//! Delete of content and of whole actors.

use tracing::{debug, info};
use weft_common::AppResult;

use crate::context::FederationContext;
use crate::document::IncomingActivity;
use crate::router::Route;

#[derive(Clone)]
pub struct DeleteProcessor {
    ctx: FederationContext,
}

impl DeleteProcessor {
    #[must_use]
    pub const fn new(ctx: FederationContext) -> Self {
        Self { ctx }
    }

    pub async fn process(&self, activity: &IncomingActivity, route: Route) -> AppResult<()> {
        info!(
            actor = %activity.actor,
            object = ?activity.object_id,
            "Processing Delete activity"
        );
        let Some(object) = activity.object_id.as_deref() else {
            return Ok(());
        };

        if route == Route::DeleteActor {
            let removed = self.ctx.contacts.remove_actor(&activity.actor).await?;
            self.ctx.actors.invalidate(&activity.actor).await?;
            info!(actor = %activity.actor, removed, "Remote actor deleted");
            return Ok(());
        }

        // Only the author may delete a post.
        if self.ctx.content.tombstone(object, &activity.actor).await? {
            info!(object = %object, "Post deleted");
        } else {
            debug!(object = %object, actor = %activity.actor, "Deleted post was not stored");
        }
        Ok(())
    }
}
