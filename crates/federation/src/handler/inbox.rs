//! Inbox endpoints receiving `ActivityPub` activities.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, info};

use crate::context::FederationContext;
use crate::receiver::{Admission, Receiver};

/// Shared inbox: `POST /inbox`.
pub async fn inbox_handler(
    State(ctx): State<FederationContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    receive(ctx, &headers, &body, "/inbox", None).await
}

/// Personal inbox: `POST /users/{uid}/inbox`.
pub async fn user_inbox_handler(
    State(ctx): State<FederationContext>,
    Path(uid): Path<i64>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = format!("/users/{uid}/inbox");
    receive(ctx, &headers, &body, &path, Some(uid)).await
}

async fn receive(
    ctx: FederationContext,
    headers: &HeaderMap,
    body: &[u8],
    path: &str,
    uid: Option<i64>,
) -> Response {
    match Receiver::new(ctx).process_inbox(body, headers, path, uid).await {
        Ok(admission) => {
            match admission {
                Admission::Queued { entry_id, scheduled } => {
                    info!(entry_id, scheduled, path = %path, "Activity admitted");
                }
                Admission::PendingFetch { entry_id } => {
                    info!(entry_id, path = %path, "Activity admitted pending fetch");
                }
                Admission::Duplicate => debug!(path = %path, "Duplicate activity"),
            }
            StatusCode::ACCEPTED.into_response()
        }
        Err(e) => e.into_response(),
    }
}
