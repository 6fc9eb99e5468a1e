//! Instance actor endpoint.

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::error;

use crate::context::FederationContext;
use crate::signature::public_key_pem;

const ACTIVITY_CONTENT_TYPE: &str = "application/activity+json";

/// Handle `GET /actor`.
///
/// Remote nodes fetch this document to verify signatures of relay
/// subscriptions and other instance-level activities.
pub async fn instance_actor_handler(State(ctx): State<FederationContext>) -> Response {
    let account = match ctx.contacts.instance_account().await {
        Ok(account) => account,
        Err(e) => {
            error!(error = %e, "Failed to load instance account");
            return e.into_response();
        }
    };
    let public_key = match public_key_pem(&account.private_key_pem) {
        Ok(pem) => pem,
        Err(e) => {
            error!(error = %e, "Instance account has no usable key");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let document = instance_actor_document(&ctx, &account.actor_url, &account.key_id, &public_key);
    (
        [(header::CONTENT_TYPE, ACTIVITY_CONTENT_TYPE)],
        Json(document),
    )
        .into_response()
}

fn instance_actor_document(
    ctx: &FederationContext,
    actor_url: &str,
    key_id: &str,
    public_key: &str,
) -> Value {
    let base = ctx.settings.base_url.as_str().trim_end_matches('/');
    json!({
        "@context": [
            "https://www.w3.org/ns/activitystreams",
            "https://w3id.org/security/v1",
        ],
        "id": actor_url,
        "type": "Application",
        "preferredUsername": ctx.settings.instance_name,
        "inbox": format!("{base}/inbox"),
        "endpoints": { "sharedInbox": format!("{base}/inbox") },
        "publicKey": {
            "id": key_id,
            "owner": actor_url,
            "publicKeyPem": public_key,
        },
    })
}
