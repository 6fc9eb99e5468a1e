//! Side effects of routed inbound activities.

#![allow(missing_docs)]

mod account;
mod collection;
mod create;
mod delete;
mod follow;
mod reaction;
mod update;

pub use account::AccountProcessor;
pub use collection::CollectionProcessor;
pub use create::CreateProcessor;
pub use delete::DeleteProcessor;
pub use follow::FollowProcessor;
pub use reaction::ReactionProcessor;
pub use update::UpdateProcessor;

use tracing::{debug, warn};
use weft_common::AppResult;

use crate::context::FederationContext;
use crate::document::IncomingActivity;
use crate::fetch::{Completion, FetchRequest};
use crate::router::Route;

/// A queue entry ready to be routed.
#[derive(Debug, Clone)]
pub struct QueuedActivity {
    pub entry_id: i64,
    pub activity: IncomingActivity,
    /// Local accounts the activity was delivered to; `0` is the public.
    pub receivers: Vec<i64>,
    pub signer: Option<String>,
    pub push: bool,
    pub completion: Completion,
}

/// What routing one activity produced.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub route: Route,
    /// URI of content that became available locally.
    pub materialized: Option<String>,
    /// Objects that must be fetched before the activity can complete.
    pub follow_ups: Vec<FetchRequest>,
    /// Keep the entry queued; it is waiting on a follow-up.
    pub retain: bool,
}

impl RouteOutcome {
    fn done(route: Route) -> Self {
        Self {
            route,
            materialized: None,
            follow_ups: Vec::new(),
            retain: false,
        }
    }

    fn materialized(route: Route, uri: impl Into<String>) -> Self {
        Self {
            materialized: Some(uri.into()),
            ..Self::done(route)
        }
    }

    fn waiting(route: Route, request: FetchRequest) -> Self {
        Self {
            follow_ups: vec![request],
            retain: true,
            ..Self::done(route)
        }
    }
}

/// Dispatches a queued activity to the processor of its route.
#[derive(Clone)]
pub struct Processor {
    ctx: FederationContext,
}

impl Processor {
    #[must_use]
    pub const fn new(ctx: FederationContext) -> Self {
        Self { ctx }
    }

    pub async fn route(&self, queued: &QueuedActivity) -> AppResult<RouteOutcome> {
        let activity = &queued.activity;
        let route = Route::of(activity, self.ctx.settings.process_view);

        match route {
            Route::CreateContent | Route::UpdateContent => {
                CreateProcessor::new(self.ctx.clone())
                    .process(queued, route)
                    .await
            }
            Route::UpdateActor => {
                UpdateProcessor::new(self.ctx.clone()).process(activity).await?;
                Ok(RouteOutcome::done(route))
            }
            Route::DeleteContent | Route::DeleteActor => {
                DeleteProcessor::new(self.ctx.clone())
                    .process(activity, route)
                    .await?;
                Ok(RouteOutcome::done(route))
            }
            Route::AnnounceContent | Route::React(_) | Route::UndoReaction => {
                ReactionProcessor::new(self.ctx.clone())
                    .process(queued, route)
                    .await
            }
            Route::FollowActor
            | Route::FollowContent
            | Route::AcceptFollow
            | Route::RejectFollow
            | Route::UndoFollow
            | Route::UndoAccept => {
                FollowProcessor::new(self.ctx.clone())
                    .process(activity, route)
                    .await?;
                Ok(RouteOutcome::done(route))
            }
            Route::BlockAccount
            | Route::UnblockAccount
            | Route::MoveAccount
            | Route::ReportAccount => {
                AccountProcessor::new(self.ctx.clone())
                    .process(activity, route)
                    .await?;
                Ok(RouteOutcome::done(route))
            }
            Route::FeatureContent | Route::UnfeatureContent | Route::AddTag => {
                CollectionProcessor::new(self.ctx.clone())
                    .process(activity, route)
                    .await?;
                Ok(RouteOutcome::done(route))
            }
            Route::Ignore => {
                debug!(
                    activity_id = %activity.id,
                    activity_type = activity.verb.as_str(),
                    object_type = activity.object_kind.as_str(),
                    "Ignoring activity"
                );
                Ok(RouteOutcome::done(route))
            }
            Route::Unhandled => {
                warn!(
                    activity_id = %activity.id,
                    activity_type = activity.verb.as_str(),
                    object_type = activity.object_kind.as_str(),
                    "Unhandled activity"
                );
                Ok(RouteOutcome::done(route))
            }
        }
    }
}
