//! Inbox and actor endpoints over the axum router.

#![allow(clippy::unwrap_used)]

mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use common::{Harness, SIGNER_HEADER, account, create_note};
use serde_json::{Value, json};
use tower::ServiceExt;
use weft_federation::{generate_keypair, router};

const ALICE: &str = "https://remote.example/users/alice";

fn app(h: &Harness) -> Router {
    router(h.federation.context().clone())
}

fn post(path: &str, body: &Value, signer: Option<&str>) -> Request<Body> {
    let mut request = Request::builder()
        .uri(path)
        .method("POST")
        .header("Content-Type", "application/activity+json");
    if let Some(signer) = signer {
        request = request.header(SIGNER_HEADER, signer);
    }
    request.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_signed_create_is_accepted() {
    let h = Harness::new();
    let doc = create_note(ALICE, "https://remote.example/notes/1", None);

    let response = app(&h).oneshot(post("/inbox", &doc, Some(ALICE))).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(
        h.content.order().await,
        vec!["https://remote.example/notes/1".to_string()]
    );
}

#[tokio::test]
async fn test_personal_inbox_records_the_receiver() {
    let h = Harness::with_settings(|_| {});
    h.contacts.add_account(account(3, "carol")).await;
    let doc = create_note(ALICE, "https://remote.example/notes/2", None);

    let response = app(&h)
        .oneshot(post("/users/3/inbox", &doc, Some(ALICE)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let entries = h.store.entries().await;
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let h = Harness::new();
    let request = Request::builder()
        .uri("/inbox")
        .method("POST")
        .body(Body::from("not json"))
        .unwrap();

    let response = app(&h).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert!(body["error"]["code"].is_string());
}

#[tokio::test]
async fn test_unsigned_follow_is_unauthorized() {
    let h = Harness::new();
    let follow = json!({
        "id": "https://remote.example/follows/9",
        "type": "Follow",
        "actor": ALICE,
        "object": "https://weft.example/users/bob",
    });

    let response = app(&h).oneshot(post("/inbox", &follow, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_instance_actor_publishes_its_key() {
    let h = Harness::new();
    let (private_pem, public_pem) = generate_keypair().unwrap();
    h.contacts.state.lock().await.instance_key = Some(private_pem);

    let request = Request::builder()
        .uri("/actor")
        .body(Body::empty())
        .unwrap();
    let response = app(&h).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let actor: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(actor["id"], "https://weft.example/actor");
    assert_eq!(actor["type"], "Application");
    assert_eq!(actor["inbox"], "https://weft.example/inbox");
    assert_eq!(actor["publicKey"]["publicKeyPem"], public_pem.as_str());
}

#[tokio::test]
async fn test_instance_actor_without_key_fails() {
    let h = Harness::new();
    let request = Request::builder()
        .uri("/actor")
        .body(Body::empty())
        .unwrap();

    let response = app(&h).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
