//! Outgoing `ActivityPub` activities.

#![allow(missing_docs)]

mod accept;
mod announce;
mod create;
mod delete;
mod follow;
mod like;
mod reject;

pub use accept::AcceptActivity;
pub use announce::AnnounceActivity;
pub use create::{CreateActivity, UpdateActivity};
pub use delete::DeleteActivity;
pub use follow::FollowActivity;
pub use like::{LikeActivity, ReactionType};
pub use reject::RejectActivity;

use url::Url;
use weft_common::{AppError, AppResult};

/// Parse an identifier of an outgoing document.
pub fn parse_url(value: &str) -> AppResult<Url> {
    Url::parse(value).map_err(|e| AppError::Federation(format!("invalid url {value}: {e}")))
}

/// Parse a list of identifiers, failing on the first invalid one.
pub fn parse_urls<'a>(values: impl IntoIterator<Item = &'a String>) -> AppResult<Vec<Url>> {
    values.into_iter().map(|v| parse_url(v)).collect()
}
