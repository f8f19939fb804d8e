use serde_json::json;
use uuid::Uuid;

use crate::common::{TestApp, routes};

mod crud {
    use super::*;

    #[tokio::test]
    async fn created_chat_round_trips_with_server_timestamps() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;
        let me = app.get_with_token(routes::ME, &token).await;

        let res = app
            .post_with_token(
                routes::CHATS,
                &json!({"title": "Trip planning", "user_id": me.body["id"]}),
                &token,
            )
            .await;
        assert_eq!(res.status, 201, "{}", res.text);
        let id: Uuid = res.body["id"].as_str().unwrap().parse().unwrap();

        let fetched = app.get_with_token(&routes::chat(id), &token).await;
        assert_eq!(fetched.status, 200);
        assert_eq!(fetched.body["title"], "Trip planning");
        assert_eq!(fetched.body["user_id"], me.body["id"]);
        assert!(fetched.body["created_at"].is_string());
        assert!(fetched.body["updated_at"].is_string());
        assert!(fetched.body["model"].is_null());
    }

    #[tokio::test]
    async fn missing_or_blank_title_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;

        for body in [json!({}), json!({"title": "   "})] {
            let res = app.post_with_token(routes::CHATS, &body, &token).await;
            assert_eq!(res.status, 400, "{body}");
            assert_eq!(res.body["code"], "VALIDATION_ERROR");
        }
    }

    #[tokio::test]
    async fn cannot_create_a_chat_for_someone_else() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;

        let res = app
            .post_with_token(
                routes::CHATS,
                &json!({"title": "x", "user_id": Uuid::now_v7()}),
                &token,
            )
            .await;

        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "PERMISSION_DENIED");
    }

    #[tokio::test]
    async fn patch_changes_only_the_given_fields() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;
        let id = app.create_chat(&token, "Original").await;

        let res = app
            .patch_with_token(&routes::chat(id), &json!({"model": "some/model"}), &token)
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["title"], "Original");
        assert_eq!(res.body["model"], "some/model");

        let res = app
            .patch_with_token(&routes::chat(id), &json!({"title": "Renamed", "model": null}), &token)
            .await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["title"], "Renamed");
        assert!(res.body["model"].is_null());
    }

    #[tokio::test]
    async fn missing_chat_is_not_found() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;

        let res = app.get_with_token(&routes::chat(Uuid::now_v7()), &token).await;

        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }
}

mod ownership {
    use super::*;

    #[tokio::test]
    async fn deleting_someone_elses_chat_is_forbidden_and_keeps_it() {
        let app = TestApp::spawn().await;
        let alice = app.create_authenticated_user("alice@example.com").await;
        let mallory = app.create_authenticated_user("mallory@example.com").await;
        let id = app.create_chat(&alice, "Private").await;

        let res = app.delete_with_token(&routes::chat(id), &mallory).await;
        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "PERMISSION_DENIED");

        let still_there = app.get_with_token(&routes::chat(id), &alice).await;
        assert_eq!(still_there.status, 200);
        assert_eq!(still_there.body["title"], "Private");
    }

    #[tokio::test]
    async fn listing_only_shows_own_chats() {
        let app = TestApp::spawn().await;
        let alice = app.create_authenticated_user("alice@example.com").await;
        let bob = app.create_authenticated_user("bob@example.com").await;
        app.create_chat(&alice, "Alice's").await;
        app.create_chat(&bob, "Bob's").await;

        let res = app.get_with_token(routes::CHATS, &alice).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["pagination"]["total"], 1);
        assert_eq!(res.body["data"][0]["title"], "Alice's");
    }
}

mod listing {
    use super::*;

    #[tokio::test]
    async fn most_recently_updated_chat_comes_first() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;
        let older = app.create_chat(&token, "Older").await;
        app.create_chat(&token, "Newer").await;

        // A new message bumps the older chat's updated_at.
        let res = app
            .post_with_token(
                &routes::chat_messages(older),
                &json!({"content": "hi", "role": "user"}),
                &token,
            )
            .await;
        assert_eq!(res.status, 201);

        let res = app.get_with_token(routes::CHATS, &token).await;
        assert_eq!(res.body["data"][0]["title"], "Older");
        assert_eq!(res.body["data"][1]["title"], "Newer");
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_pagination_counts() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;
        for title in ["Rust tips", "rusty bikes", "Cooking"] {
            app.create_chat(&token, title).await;
        }

        let res = app
            .get_with_token(&format!("{}?search=RUST&per_page=1", routes::CHATS), &token)
            .await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["pagination"]["total"], 2);
        assert_eq!(res.body["pagination"]["total_pages"], 2);
        assert_eq!(res.body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sort_by_title_ascending() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;
        for title in ["b", "c", "a"] {
            app.create_chat(&token, title).await;
        }

        let res = app
            .get_with_token(&format!("{}?sort_by=title&sort_order=asc", routes::CHATS), &token)
            .await;

        let titles: Vec<&str> = res.body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn unknown_sort_field_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;

        let res = app
            .get_with_token(&format!("{}?sort_by=bogus", routes::CHATS), &token)
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }
}

mod deletion {
    use super::*;

    #[tokio::test]
    async fn deleting_a_chat_removes_its_messages_but_keeps_generations() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("alice@example.com").await;
        let id = app.create_chat(&token, "Doomed").await;

        let msg = app
            .post_with_token(
                &routes::chat_messages(id),
                &json!({"content": "hello", "role": "user"}),
                &token,
            )
            .await;
        let message_id: Uuid = msg.body["id"].as_str().unwrap().parse().unwrap();
        let generation = app
            .post_with_token(
                routes::GENERATIONS,
                &json!({"chat_id": id, "prompt": "a fox", "url": "https://example.com/fox.png"}),
                &token,
            )
            .await;
        assert_eq!(generation.status, 201, "{}", generation.text);

        let res = app.delete_with_token(&routes::chat(id), &token).await;
        assert_eq!(res.status, 204);

        assert_eq!(app.get_with_token(&routes::chat(id), &token).await.status, 404);
        assert_eq!(
            app.get_with_token(&routes::message(message_id), &token)
                .await
                .status,
            404
        );
        let gallery = app.get_with_token(routes::GENERATIONS, &token).await;
        assert_eq!(gallery.body["pagination"]["total"], 1);
    }
}
