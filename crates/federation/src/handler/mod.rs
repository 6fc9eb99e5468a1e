//! `ActivityPub` request handlers.

#![allow(missing_docs)]

mod actor;
mod inbox;

pub use actor::instance_actor_handler;
pub use inbox::{inbox_handler, user_inbox_handler};

use axum::{
    Router,
    routing::{get, post},
};

use crate::context::FederationContext;

/// Routes of the inbox and instance actor endpoints.
pub fn router(ctx: FederationContext) -> Router {
    Router::new()
        .route("/actor", get(instance_actor_handler))
        .route("/inbox", post(inbox_handler))
        .route("/users/{uid}/inbox", post(user_inbox_handler))
        .with_state(ctx)
}
