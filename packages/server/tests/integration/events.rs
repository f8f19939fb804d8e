use std::time::Duration;

use serde_json::json;

use crate::common::{TestApp, routes};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn owner_receives_chat_and_message_events() {
    let app = TestApp::spawn().await;
    let token = app.create_authenticated_user("alice@example.com").await;
    let mut events = app.open_events(&token, Some("chats,message")).await;

    let chat = app.create_chat(&token, "Live").await;
    let created = events.next(WAIT).await.expect("chat created event");
    assert_eq!(created.event, "chats");
    assert_eq!(created.data["kind"], "created");
    assert_eq!(created.data["data"]["id"], chat.to_string());

    app.post_with_token(
        &routes::chat_messages(chat),
        &json!({"content": "hi", "role": "user"}),
        &token,
    )
    .await;
    let message = events.next(WAIT).await.expect("message created event");
    assert_eq!(message.event, "message");
    assert_eq!(message.data["kind"], "created");
    assert_eq!(message.data["chat_id"], chat.to_string());
    assert_eq!(message.data["data"]["content"], "hi");

    let bumped = events.next(WAIT).await.expect("chat patched event");
    assert_eq!(bumped.event, "chats");
    assert_eq!(bumped.data["kind"], "patched");

    app.delete_with_token(&routes::chat(chat), &token).await;
    let removed = events.next(WAIT).await.expect("chat removed event");
    assert_eq!(removed.data["kind"], "removed");
}

#[tokio::test]
async fn other_users_events_are_never_delivered() {
    let app = TestApp::spawn().await;
    let alice = app.create_authenticated_user("alice@example.com").await;
    let bob = app.create_authenticated_user("bob@example.com").await;
    let mut bobs_events = app.open_events(&bob, None).await;

    app.create_chat(&alice, "Alice only").await;
    let bobs_chat = app.create_chat(&bob, "Bob's").await;

    let first = bobs_events.next(WAIT).await.expect("bob's own event");
    assert_eq!(first.data["data"]["id"], bobs_chat.to_string());
}

#[tokio::test]
async fn resource_filter_excludes_other_collections() {
    let app = TestApp::spawn().await;
    let token = app.create_authenticated_user("alice@example.com").await;
    let mut events = app.open_events(&token, Some("users")).await;

    app.create_chat(&token, "Ignored").await;
    app.patch_with_token(routes::PROFILE, &json!({"full_name": "Alice A"}), &token)
        .await;

    let event = events.next(WAIT).await.expect("users event");
    assert_eq!(event.event, "users");
    assert_eq!(event.data["data"]["full_name"], "Alice A");
    assert!(event.data["data"].get("password").is_none());
}

#[tokio::test]
async fn unknown_resource_is_rejected() {
    let app = TestApp::spawn().await;
    let token = app.create_authenticated_user("alice@example.com").await;

    let res = app
        .get_with_token(&format!("{}?resources=messages", routes::EVENTS), &token)
        .await;

    assert_eq!(res.status, 400);
}
