use ::common::Resource;
use parley_client::{SubscriptionKey, SubscriptionManager};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::common::TestServer;

#[tokio::test]
async fn second_subscribe_for_the_same_key_is_refused() {
    let server = TestServer::spawn().await;
    let session = server.session("alice@example.com").await;
    let owner = session.user().unwrap().id;
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut subs = SubscriptionManager::new(tx);

    let key = SubscriptionKey::new(Resource::Chats, owner);
    assert!(subs.subscribe(session.api(), key).await.unwrap());
    assert!(!subs.subscribe(session.api(), key).await.unwrap());
    assert_eq!(subs.len(), 1);

    let messages = SubscriptionKey::new(Resource::Message, owner);
    assert!(subs.subscribe(session.api(), messages).await.unwrap());
    assert_eq!(subs.len(), 2);
}

#[tokio::test]
async fn subscribing_without_a_token_is_rejected() {
    let server = TestServer::spawn().await;
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut subs = SubscriptionManager::new(tx);

    let key = SubscriptionKey::new(Resource::Chats, Uuid::new_v4());
    let err = subs.subscribe(&server.api(), key).await.unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert_eq!(err.code(), "TOKEN_MISSING");
    assert!(subs.is_empty());
}

#[tokio::test]
async fn events_made_right_after_subscribing_are_delivered() {
    let server = TestServer::spawn().await;
    let session = server.session("alice@example.com").await;
    let owner = session.user().unwrap().id;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut subs = SubscriptionManager::new(tx);

    subs.subscribe(session.api(), SubscriptionKey::new(Resource::Chats, owner))
        .await
        .unwrap();
    let chat = session.api().create_chat("Right away", None).await.unwrap();

    let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
        .await
        .expect("event arrives")
        .unwrap();
    assert_eq!(event.resource, Resource::Chats);
    assert_eq!(event.owner_id, owner);
    assert_eq!(event.data["id"], chat.id.to_string());
}

#[tokio::test]
async fn teardown_only_touches_that_owner() {
    let server = TestServer::spawn().await;
    let alice = server.session("alice@example.com").await;
    let bob = server.session("bob@example.com").await;
    let (alice_id, bob_id) = (alice.user().unwrap().id, bob.user().unwrap().id);
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut subs = SubscriptionManager::new(tx);

    for resource in [Resource::Chats, Resource::Message] {
        subs.subscribe(alice.api(), SubscriptionKey::new(resource, alice_id))
            .await
            .unwrap();
    }
    subs.subscribe(bob.api(), SubscriptionKey::new(Resource::Chats, bob_id))
        .await
        .unwrap();

    assert_eq!(subs.teardown_owner(alice_id), 2);
    assert_eq!(subs.len(), 1);
    assert!(subs.is_subscribed(SubscriptionKey::new(Resource::Chats, bob_id)));
}
