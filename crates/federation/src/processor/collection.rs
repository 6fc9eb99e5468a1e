//! Featured-collection changes and hashtags added to existing posts.

use serde_json::Value;
use tracing::{debug, info};
use weft_common::AppResult;

use crate::context::FederationContext;
use crate::document::{IncomingActivity, id_of};
use crate::router::Route;

#[derive(Clone)]
pub struct CollectionProcessor {
    ctx: FederationContext,
}

impl CollectionProcessor {
    #[must_use]
    pub const fn new(ctx: FederationContext) -> Self {
        Self { ctx }
    }

    /// Missing posts are not fetched for these routes.
    pub async fn process(&self, activity: &IncomingActivity, route: Route) -> AppResult<()> {
        match route {
            Route::FeatureContent | Route::UnfeatureContent => {
                let Some(uri) = activity.object_id.as_deref() else {
                    return Ok(());
                };
                let featured = route == Route::FeatureContent;
                if self
                    .ctx
                    .content
                    .set_featured(uri, &activity.actor, featured)
                    .await?
                {
                    info!(object = %uri, actor = %activity.actor, featured, "Featured state changed");
                } else {
                    debug!(object = %uri, actor = %activity.actor, "Featured post is not stored");
                }
                Ok(())
            }
            Route::AddTag => {
                let name = activity
                    .object
                    .as_ref()
                    .and_then(|tag| tag.get("name"))
                    .and_then(Value::as_str)
                    .map(|name| name.trim_start_matches('#'))
                    .filter(|name| !name.is_empty());
                let target = id_of(activity.document.get("target"));
                let (Some(name), Some(target)) = (name, target) else {
                    debug!(activity_id = %activity.id, "Tag without name or target");
                    return Ok(());
                };
                if self.ctx.content.add_tag(&target, &activity.actor, name).await? {
                    info!(object = %target, tag = %name, "Post tagged");
                } else {
                    debug!(object = %target, actor = %activity.actor, "Tagged post is not stored");
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
