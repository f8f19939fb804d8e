use serde_json::json;
use uuid::Uuid;

use ::common::storage::{ObjectKey, ObjectStore};

use crate::common::{STUB_PNG, TestApp, routes};

#[tokio::test]
async fn created_generation_gets_defaults() {
    let app = TestApp::spawn().await;
    let token = app.create_authenticated_user("alice@example.com").await;
    let chat = app.create_chat(&token, "Art").await;

    let res = app
        .post_with_token(
            routes::GENERATIONS,
            &json!({"chat_id": chat, "prompt": "a fox", "url": "https://example.com/fox.png"}),
            &token,
        )
        .await;

    assert_eq!(res.status, 201, "{}", res.text);
    assert_eq!(res.body["model"], "upload");
    assert_eq!(res.body["width"], 1024);
    assert_eq!(res.body["height"], 768);
    assert_eq!(res.body["status"], "completed");
    assert_eq!(res.body["metadata"], json!({}));
}

#[tokio::test]
async fn generation_for_someone_elses_chat_is_forbidden() {
    let app = TestApp::spawn().await;
    let alice = app.create_authenticated_user("alice@example.com").await;
    let mallory = app.create_authenticated_user("mallory@example.com").await;
    let chat = app.create_chat(&alice, "Art").await;

    let res = app
        .post_with_token(
            routes::GENERATIONS,
            &json!({"chat_id": chat, "prompt": "x", "url": "https://example.com/x.png"}),
            &mallory,
        )
        .await;

    assert_eq!(res.status, 403);
}

#[tokio::test]
async fn gallery_is_newest_first_and_filterable_by_chat() {
    let app = TestApp::spawn().await;
    let token = app.create_authenticated_user("alice@example.com").await;
    let first_chat = app.create_chat(&token, "One").await;
    let second_chat = app.create_chat(&token, "Two").await;

    for (chat, prompt) in [(first_chat, "first"), (second_chat, "second"), (first_chat, "third")] {
        let res = app
            .post_with_token(
                routes::GENERATIONS,
                &json!({"chat_id": chat, "prompt": prompt, "url": "https://example.com/a.png"}),
                &token,
            )
            .await;
        assert_eq!(res.status, 201);
    }

    let all = app.get_with_token(routes::GENERATIONS, &token).await;
    assert_eq!(all.body["pagination"]["total"], 3);
    assert_eq!(all.body["data"][0]["prompt"], "third");

    let scoped = app
        .get_with_token(&routes::chat_generations(first_chat), &token)
        .await;
    assert_eq!(scoped.status, 200);
    assert_eq!(scoped.body["pagination"]["total"], 2);

    let filtered = app
        .get_with_token(
            &format!("{}?chat_id={second_chat}", routes::GENERATIONS),
            &token,
        )
        .await;
    assert_eq!(filtered.body["data"][0]["prompt"], "second");
}

#[tokio::test]
async fn patch_updates_status_and_metadata() {
    let app = TestApp::spawn().await;
    let token = app.create_authenticated_user("alice@example.com").await;
    let chat = app.create_chat(&token, "Art").await;
    let created = app
        .post_with_token(
            routes::GENERATIONS,
            &json!({"chat_id": chat, "prompt": "a", "url": "https://example.com/a.png"}),
            &token,
        )
        .await;
    let id: Uuid = created.body["id"].as_str().unwrap().parse().unwrap();

    let res = app
        .patch_with_token(
            &routes::generation(id),
            &json!({"status": "archived", "metadata": {"starred": true}}),
            &token,
        )
        .await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body["status"], "archived");
    assert_eq!(res.body["metadata"]["starred"], true);
    assert_eq!(res.body["prompt"], "a");
}

#[tokio::test]
async fn deleting_an_uploaded_generation_removes_the_object() {
    let app = TestApp::spawn().await;
    let token = app.create_authenticated_user("alice@example.com").await;
    let chat = app.create_chat(&token, "Art").await;

    let upload = app
        .multipart_with_token(
            routes::UPLOAD,
            "fox.png",
            "image/png",
            STUB_PNG.to_vec(),
            &[("chat_id", chat.to_string())],
            &token,
        )
        .await;
    assert_eq!(upload.status, 201, "{}", upload.text);
    let id: Uuid = upload.body["generation_id"].as_str().unwrap().parse().unwrap();
    let key = upload.body["key"].as_str().unwrap().to_string();
    assert_eq!(app.get_without_token(&routes::file(&key)).await.status, 200);

    let res = app.delete_with_token(&routes::generation(id), &token).await;
    assert_eq!(res.status, 204);

    assert_eq!(app.get_with_token(&routes::generation(id), &token).await.status, 404);
    assert_eq!(app.get_without_token(&routes::file(&key)).await.status, 404);
}

#[tokio::test]
async fn delete_checks_existence_before_ownership() {
    let app = TestApp::spawn().await;
    let alice = app.create_authenticated_user("alice@example.com").await;
    let mallory = app.create_authenticated_user("mallory@example.com").await;
    let chat = app.create_chat(&alice, "Art").await;
    let created = app
        .post_with_token(
            routes::GENERATIONS,
            &json!({"chat_id": chat, "prompt": "a", "url": "https://example.com/a.png"}),
            &alice,
        )
        .await;
    let id: Uuid = created.body["id"].as_str().unwrap().parse().unwrap();

    assert_eq!(
        app.delete_with_token(&routes::generation(Uuid::now_v7()), &mallory)
            .await
            .status,
        404
    );
    assert_eq!(app.delete_with_token(&routes::generation(id), &mallory).await.status, 403);
    assert_eq!(app.get_with_token(&routes::generation(id), &alice).await.status, 200);
}

#[tokio::test]
async fn deleting_a_generation_whose_object_is_gone_still_succeeds() {
    let app = TestApp::spawn().await;
    let token = app.create_authenticated_user("alice@example.com").await;
    let chat = app.create_chat(&token, "Art").await;

    let upload = app
        .multipart_with_token(
            routes::UPLOAD,
            "owl.png",
            "image/png",
            STUB_PNG.to_vec(),
            &[("chat_id", chat.to_string())],
            &token,
        )
        .await;
    assert_eq!(upload.status, 201, "{}", upload.text);
    let id: Uuid = upload.body["generation_id"].as_str().unwrap().parse().unwrap();
    let key = ObjectKey::parse(upload.body["key"].as_str().unwrap()).unwrap();

    assert!(app.state.objects.delete(&key).await.unwrap());
    assert!(!app.state.objects.exists(&key).await.unwrap());

    let res = app.delete_with_token(&routes::generation(id), &token).await;
    assert_eq!(res.status, 204);
    assert_eq!(app.get_with_token(&routes::generation(id), &token).await.status, 404);
}
