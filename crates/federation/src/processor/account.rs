//! Blocks, account moves and moderation reports.

use serde_json::Value;
use tracing::{debug, info, warn};
use weft_common::AppResult;

use crate::context::FederationContext;
use crate::document::{IncomingActivity, id_list, id_of};
use crate::router::Route;
use crate::store::Report;

#[derive(Clone)]
pub struct AccountProcessor {
    ctx: FederationContext,
}

impl AccountProcessor {
    #[must_use]
    pub const fn new(ctx: FederationContext) -> Self {
        Self { ctx }
    }

    pub async fn process(&self, activity: &IncomingActivity, route: Route) -> AppResult<()> {
        match route {
            Route::BlockAccount => {
                let blocked = activity.object_id.as_deref();
                self.set_blocked(activity, blocked, true).await
            }
            Route::UnblockAccount => {
                let blocked = activity
                    .object
                    .as_ref()
                    .and_then(|block| id_of(block.get("object")));
                self.set_blocked(activity, blocked.as_deref(), false).await
            }
            Route::MoveAccount => self.move_account(activity).await,
            Route::ReportAccount => self.report(activity).await,
            _ => Ok(()),
        }
    }

    async fn set_blocked(
        &self,
        activity: &IncomingActivity,
        blocked: Option<&str>,
        block: bool,
    ) -> AppResult<()> {
        let Some(blocked) = blocked else {
            return Ok(());
        };
        let Some(account) = self.ctx.contacts.local_account(blocked).await? else {
            debug!(object = %blocked, "Block does not target a local account");
            return Ok(());
        };
        self.ctx
            .contacts
            .set_blocked(account.uid, &activity.actor, block)
            .await?;
        info!(uid = account.uid, actor = %activity.actor, block, "Block state changed");
        Ok(())
    }

    /// Contacts follow a moved actor only when the new address names the old
    /// one in `alsoKnownAs`.
    async fn move_account(&self, activity: &IncomingActivity) -> AppResult<()> {
        let Some(target) = id_of(activity.document.get("target")) else {
            debug!(activity_id = %activity.id, "Move without target");
            return Ok(());
        };
        let Some(moved) = self.ctx.actors.refresh(&target).await? else {
            warn!(actor = %activity.actor, target = %target, "Move target unresolvable");
            return Ok(());
        };
        if !moved.also_known_as.contains(&activity.actor) {
            warn!(actor = %activity.actor, target = %target, "Move target does not claim the actor");
            return Ok(());
        }

        let moved_contacts = self
            .ctx
            .contacts
            .move_contacts(&activity.actor, &target)
            .await?;
        self.ctx.actors.invalidate(&activity.actor).await?;
        info!(actor = %activity.actor, target = %target, moved_contacts, "Account moved");
        Ok(())
    }

    async fn report(&self, activity: &IncomingActivity) -> AppResult<()> {
        let mut accounts = Vec::new();
        let mut posts = Vec::new();
        for id in id_list(activity.document.get("object")) {
            if self.ctx.content.exists(&id).await? {
                posts.push(id);
            } else if !accounts.contains(&id) {
                accounts.push(id);
            }
        }
        if accounts.is_empty() {
            debug!(activity_id = %activity.id, "Report names no account");
            return Ok(());
        }

        let report = Report {
            activity_id: activity.id.clone(),
            reporter: activity.actor.clone(),
            accounts,
            posts,
            comment: activity
                .document
                .get("content")
                .and_then(Value::as_str)
                .map(String::from),
        };
        info!(
            reporter = %report.reporter,
            accounts = report.accounts.len(),
            posts = report.posts.len(),
            "Report received"
        );
        self.ctx.contacts.file_report(report).await
    }
}
