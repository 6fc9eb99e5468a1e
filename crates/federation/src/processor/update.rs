//! Update of a remote actor profile.

use tracing::info;
use weft_common::AppResult;

use crate::context::FederationContext;
use crate::document::IncomingActivity;

#[derive(Clone)]
pub struct UpdateProcessor {
    ctx: FederationContext,
}

impl UpdateProcessor {
    #[must_use]
    pub const fn new(ctx: FederationContext) -> Self {
        Self { ctx }
    }

    /// Refetch the actor so that renamed inboxes and rotated keys are picked up.
    pub async fn process(&self, activity: &IncomingActivity) -> AppResult<()> {
        info!(actor = %activity.actor, "Processing Update activity");
        let refreshed = self.ctx.actors.refresh(&activity.actor).await?;
        info!(actor = %activity.actor, refreshed = refreshed.is_some(), "Actor refreshed");
        Ok(())
    }
}
