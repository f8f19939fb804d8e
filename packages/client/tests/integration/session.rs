use std::time::Duration;

use ::common::Resource;
use parley_client::store::EntryStatus;
use parley_client::{ActiveChat, SubscriptionKey};

use crate::common::{TestServer, UPLOAD_LIMIT, eventually};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn bootstrap_creates_a_first_chat_and_subscribes() {
    let server = TestServer::spawn().await;
    let mut session = server.session("alice@example.com").await;

    let outcome = session.bootstrap().await;
    assert!(outcome.is_success(), "{:?}", outcome.error());

    let store = session.store();
    assert_eq!(store.chats().len(), 1);
    assert_eq!(store.chats()[0].title, "New Chat");
    assert_eq!(store.active(), ActiveChat::Chat(store.chats()[0].id));
    assert!(store.messages().is_empty());

    let owner = session.user().unwrap().id;
    assert!(session.subscriptions().is_subscribed(SubscriptionKey::new(Resource::Chats, owner)));
    assert!(session.subscriptions().is_subscribed(SubscriptionKey::new(Resource::Message, owner)));

    // A second bootstrap reuses the chat and the listeners.
    assert!(session.bootstrap().await.is_success());
    assert_eq!(session.store().chats().len(), 1);
    assert_eq!(session.subscriptions().len(), 2);
}

#[tokio::test]
async fn bootstrap_selects_the_most_recently_updated_chat() {
    let server = TestServer::spawn().await;
    let mut session = server.session("alice@example.com").await;
    let api = session.api().clone();
    let older = api.create_chat("Older chat", None).await.unwrap();
    let newer = api.create_chat("Newer chat", None).await.unwrap();

    assert!(session.bootstrap().await.is_success());

    assert_eq!(session.store().active(), ActiveChat::Chat(newer.id));
    let ids: Vec<_> = session.store().chats().iter().map(|c| c.id).collect();
    assert_eq!(ids, [newer.id, older.id]);
}

#[tokio::test]
async fn sending_streams_the_reply_without_duplicates() {
    let server = TestServer::spawn().await;
    let mut session = server.session("alice@example.com").await;
    assert!(session.bootstrap().await.is_success());

    let mut deltas = Vec::new();
    let outcome = session
        .send_message_with("Hi there", None, |event| {
            if let ::common::TurnEvent::Delta { text } = event {
                deltas.push(text.clone());
            }
        })
        .await;
    let summary = outcome.into_data().expect("turn succeeds");
    assert_eq!(deltas, ["Hel", "lo", " world"]);
    assert_eq!(summary.reply_text(), Some("Hello world"));

    let contents: Vec<_> = session
        .store()
        .messages()
        .iter()
        .map(|e| e.message.content.clone())
        .collect();
    assert_eq!(contents, ["Hi there", "Hello world"]);
    assert!(session.store().messages().iter().all(|e| e.status == EntryStatus::Synced));

    // Change events for the same records arrive afterwards and must not add rows.
    tokio::time::sleep(Duration::from_millis(300)).await;
    session.pump_events();
    assert_eq!(session.store().messages().len(), 2);
    assert_eq!(session.store().pending().open_count(), 0);
}

#[tokio::test]
async fn sending_without_a_chat_creates_one_titled_after_the_message() {
    let server = TestServer::spawn().await;
    let mut session = server.session("alice@example.com").await;
    session.new_chat();

    let outcome = session
        .send_message("Explain the history of the Roman empire in detail", None)
        .await;
    assert!(outcome.is_success(), "{:?}", outcome.error());

    let chat_id = session.store().active_chat_id().expect("chat selected");
    let chat = session.store().chat(chat_id).unwrap();
    assert_eq!(chat.title, "Explain the history of the Rom...");
}

#[tokio::test]
async fn failed_turn_raises_a_notice_and_drops_the_placeholder() {
    let server = TestServer::spawn().await;
    let mut session = server.session("alice@example.com").await;
    assert!(session.bootstrap().await.is_success());

    let outcome = session.send_message("fail-upstream", None).await;

    assert_eq!(outcome.error().unwrap().code, "TURN_FAILED");
    assert_eq!(outcome.error().unwrap().message, "Completion request failed: 500");
    assert_eq!(session.store().notices().len(), 1);
    let roles: Vec<_> = session
        .store()
        .messages()
        .iter()
        .map(|e| e.message.role.as_str())
        .collect();
    assert_eq!(roles, ["user"]);
}

#[tokio::test]
async fn change_events_from_another_client_reach_the_store() {
    let server = TestServer::spawn().await;
    let mut session = server.session("alice@example.com").await;
    assert!(session.bootstrap().await.is_success());

    let other_tab = session.api().clone();
    let created = other_tab.create_chat("From another tab", None).await.unwrap();

    assert!(eventually(&mut session, WAIT, |s| s.store().chat(created.id).is_some()).await);

    other_tab.delete_chat(created.id).await.unwrap();
    assert!(eventually(&mut session, WAIT, |s| s.store().chat(created.id).is_none()).await);
}

#[tokio::test]
async fn other_users_changes_never_arrive() {
    let server = TestServer::spawn().await;
    let mut alice = server.session("alice@example.com").await;
    assert!(alice.bootstrap().await.is_success());
    tokio::time::sleep(Duration::from_millis(300)).await;

    let bob = server.session("bob@example.com").await;
    bob.api().create_chat("Bob's chat", None).await.unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    alice.pump_events();
    assert_eq!(alice.store().chats().len(), 1);
}

#[tokio::test]
async fn switching_chats_replaces_messages() {
    let server = TestServer::spawn().await;
    let mut session = server.session("alice@example.com").await;
    assert!(session.bootstrap().await.is_success());
    assert!(session.send_message("Hi", None).await.is_success());

    let empty = session.api().create_chat("Empty chat", None).await.unwrap();
    assert!(session.switch_chat(empty.id).await.is_success());
    assert!(session.store().messages().is_empty());
}

#[tokio::test]
async fn switching_to_a_missing_chat_keeps_state() {
    let server = TestServer::spawn().await;
    let mut session = server.session("alice@example.com").await;
    assert!(session.bootstrap().await.is_success());
    let before = session.store().active();

    let outcome = session.switch_chat(uuid::Uuid::new_v4()).await;

    assert_eq!(outcome.error().unwrap().code, "NOT_FOUND");
    assert_eq!(session.store().active(), before);
    assert_eq!(session.store().notices().len(), 1);
}

#[tokio::test]
async fn oversize_attachment_never_reaches_the_server() {
    let server = TestServer::spawn().await;
    let mut session = server.session("alice@example.com").await;
    assert!(session.bootstrap().await.is_success());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("huge.png");
    std::fs::write(&path, vec![0u8; UPLOAD_LIMIT as usize + 1]).unwrap();

    let outcome = session.attach_file(&path, None, None).await;

    assert_eq!(outcome.error().unwrap().code, "FILE_TOO_LARGE");
    let chat = session.store().active_chat_id().unwrap();
    let messages = session.api().list_messages(chat).await.unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn sign_out_tears_down_subscriptions() {
    let server = TestServer::spawn().await;
    let mut session = server.session("alice@example.com").await;
    assert!(session.bootstrap().await.is_success());

    session.sign_out();

    assert!(session.subscriptions().is_empty());
    assert!(session.user().is_none());
    assert!(session.api().token().is_none());
    assert!(session.store().chats().is_empty());
}

#[tokio::test]
async fn switching_to_a_long_chat_keeps_the_newest_messages() {
    let server = TestServer::spawn().await;
    let mut session = server.session("alice@example.com").await;
    let chat = session.api().create_chat("Long chat", None).await.unwrap();

    let http = reqwest::Client::new();
    let token = session.api().token().unwrap().to_string();
    let url = format!("http://{}/api/v1/chats/{}/messages", server.addr, chat.id);
    for i in 0..505 {
        let res = http
            .post(&url)
            .bearer_auth(&token)
            .json(&serde_json::json!({"content": format!("m{i}"), "role": "user"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 201);
    }

    assert!(session.switch_chat(chat.id).await.is_success());

    let contents: Vec<_> = session
        .store()
        .messages()
        .iter()
        .map(|e| e.message.content.as_str())
        .collect();
    assert_eq!(contents.len(), parley_client::api::HISTORY_LIMIT as usize);
    assert_eq!(contents.first(), Some(&"m5"));
    assert_eq!(contents.last(), Some(&"m504"));
}

#[tokio::test]
async fn failed_image_generation_keeps_the_settled_acknowledgement() {
    let server = TestServer::spawn().await;
    let mut session = server.session("alice@example.com").await;
    assert!(session.bootstrap().await.is_success());

    let outcome = session
        .send_message("Can you generate an image of a fox", None)
        .await;

    let error = outcome.error().unwrap();
    assert_eq!(error.code, "TURN_FAILED");
    assert!(error.message.starts_with("Image generation failed"), "{}", error.message);

    let entries = session.store().messages();
    let roles: Vec<_> = entries.iter().map(|e| e.message.role.as_str()).collect();
    assert_eq!(roles, ["user", "assistant"]);
    assert!(entries.iter().all(|e| e.status == EntryStatus::Synced));
    assert_eq!(session.store().pending().open_count(), 0);
}
