use serde_json::json;
use uuid::Uuid;

use crate::common::{TestApp, routes};

#[tokio::test]
async fn messages_list_oldest_first_with_filters() {
    let app = TestApp::spawn().await;
    let token = app.create_authenticated_user("alice@example.com").await;
    let chat = app.create_chat(&token, "Chat").await;

    for (content, role) in [("one", "user"), ("two", "assistant"), ("three", "user")] {
        let res = app
            .post_with_token(
                &routes::chat_messages(chat),
                &json!({"content": content, "role": role}),
                &token,
            )
            .await;
        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["content_type"], "text");
        assert_eq!(res.body["metadata"], json!({}));
    }

    let all = app.get_with_token(&routes::chat_messages(chat), &token).await;
    let contents: Vec<&str> = all
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, ["one", "two", "three"]);

    let users = app
        .get_with_token(&format!("{}?role=user", routes::chat_messages(chat)), &token)
        .await;
    assert_eq!(users.body.as_array().unwrap().len(), 2);

    let newest = app
        .get_with_token(
            &format!("{}?sort_order=desc&limit=1", routes::chat_messages(chat)),
            &token,
        )
        .await;
    assert_eq!(newest.body[0]["content"], "three");
}

#[tokio::test]
async fn client_ref_is_echoed_in_metadata() {
    let app = TestApp::spawn().await;
    let token = app.create_authenticated_user("alice@example.com").await;
    let chat = app.create_chat(&token, "Chat").await;
    let client_ref = Uuid::now_v7();

    let res = app
        .post_with_token(
            &routes::chat_messages(chat),
            &json!({"content": "hi", "role": "user", "metadata": {"k": 1}, "client_ref": client_ref}),
            &token,
        )
        .await;

    assert_eq!(res.status, 201);
    assert_eq!(res.body["metadata"]["client_ref"], client_ref.to_string());
    assert_eq!(res.body["metadata"]["k"], 1);
}

#[tokio::test]
async fn invalid_messages_are_rejected() {
    let app = TestApp::spawn().await;
    let token = app.create_authenticated_user("alice@example.com").await;
    let chat = app.create_chat(&token, "Chat").await;

    for body in [
        json!({"content": "", "role": "user"}),
        json!({"content": "hi", "role": "system"}),
        json!({"content": "hi", "role": "user", "content_type": "video"}),
        json!({"content": "hi", "role": "user", "metadata": "nope"}),
    ] {
        let res = app
            .post_with_token(&routes::chat_messages(chat), &body, &token)
            .await;
        assert_eq!(res.status, 400, "{body}");
    }

    let res = app
        .get_with_token(&format!("{}?limit=0", routes::chat_messages(chat)), &token)
        .await;
    assert_eq!(res.status, 400);
}

#[tokio::test]
async fn message_patch_and_delete_go_through_chat_ownership() {
    let app = TestApp::spawn().await;
    let alice = app.create_authenticated_user("alice@example.com").await;
    let mallory = app.create_authenticated_user("mallory@example.com").await;
    let chat = app.create_chat(&alice, "Chat").await;

    let created = app
        .post_with_token(
            &routes::chat_messages(chat),
            &json!({"content": "draft", "role": "user"}),
            &alice,
        )
        .await;
    let id: Uuid = created.body["id"].as_str().unwrap().parse().unwrap();

    let forbidden = app
        .patch_with_token(&routes::message(id), &json!({"content": "pwned"}), &mallory)
        .await;
    assert_eq!(forbidden.status, 403);

    let patched = app
        .patch_with_token(
            &routes::message(id),
            &json!({"content": "final", "metadata": {"edited": true}}),
            &alice,
        )
        .await;
    assert_eq!(patched.status, 200);
    assert_eq!(patched.body["content"], "final");
    assert_eq!(patched.body["metadata"]["edited"], true);

    assert_eq!(app.delete_with_token(&routes::message(id), &mallory).await.status, 403);
    assert_eq!(app.delete_with_token(&routes::message(id), &alice).await.status, 204);
    assert_eq!(app.get_with_token(&routes::message(id), &alice).await.status, 404);
}

#[tokio::test]
async fn listing_another_users_messages_is_forbidden() {
    let app = TestApp::spawn().await;
    let alice = app.create_authenticated_user("alice@example.com").await;
    let mallory = app.create_authenticated_user("mallory@example.com").await;
    let chat = app.create_chat(&alice, "Chat").await;

    let res = app.get_with_token(&routes::chat_messages(chat), &mallory).await;

    assert_eq!(res.status, 403);
}
