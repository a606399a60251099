mod common;

use std::time::Duration;

use hushmatch::ChatError;
use hushmatch::chats::registry::ConnectionRegistry;
use hushmatch::chats::relay::relay;
use hushmatch::chats::store;
use hushmatch::db::ChatKind;
use hushmatch::users;
use tokio::time::timeout;

async fn recv_frame(rx: &mut tokio::sync::mpsc::UnboundedReceiver<String>) -> serde_json::Value {
    let raw = timeout(Duration::from_millis(250), rx.recv())
        .await
        .expect("frame within timeout")
        .expect("channel open");
    serde_json::from_str(&raw).expect("valid json frame")
}

#[tokio::test]
async fn relayed_message_is_persisted_then_broadcast() {
    let pool = common::test_pool().await;
    let registry = ConnectionRegistry::new();

    let sender = users::create_anonymous_user(&pool, Some("a"), None, None)
        .await
        .unwrap();
    let chat = store::create_chat(&pool, None, ChatKind::Anonymous)
        .await
        .unwrap();

    let (_id_a, mut rx_a) = registry.register(chat.id).await;
    let (_id_b, mut rx_b) = registry.register(chat.id).await;

    relay(&pool, &registry, chat.id, sender.id, "first").await.unwrap();
    relay(&pool, &registry, chat.id, sender.id, "second").await.unwrap();

    // exact content, retrievable in insertion order
    let history = store::chat_messages(&pool, chat.id).await.unwrap();
    let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second"]);

    // both connections got the anonymized frame
    for rx in [&mut rx_a, &mut rx_b] {
        let frame = recv_frame(rx).await;
        assert_eq!(frame["type"], "message");
        assert_eq!(frame["content"], "Anonymous: first");
        assert!(frame["timestamp"].as_str().unwrap().contains('T'));
    }
}

#[tokio::test]
async fn group_frames_carry_the_sender_name() {
    let pool = common::test_pool().await;
    let registry = ConnectionRegistry::new();

    let sender = common::named_user(&pool, "alice").await;
    let chat = store::create_chat(&pool, Some("club"), ChatKind::Group)
        .await
        .unwrap();
    let (_id, mut rx) = registry.register(chat.id).await;

    relay(&pool, &registry, chat.id, sender.id, "hello").await.unwrap();

    let frame = recv_frame(&mut rx).await;
    assert_eq!(frame["content"], "alice: hello");
}

#[tokio::test]
async fn unknown_sender_aborts_before_persist_and_broadcast() {
    let pool = common::test_pool().await;
    let registry = ConnectionRegistry::new();

    let chat = store::create_chat(&pool, None, ChatKind::Anonymous)
        .await
        .unwrap();
    let (_id, mut rx) = registry.register(chat.id).await;

    let err = relay(&pool, &registry, chat.id, 999, "hi").await.unwrap_err();
    assert!(matches!(err, ChatError::NotFound(_)));

    assert!(store::chat_messages(&pool, chat.id).await.unwrap().is_empty());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn empty_and_oversized_messages_are_rejected() {
    let pool = common::test_pool().await;
    let registry = ConnectionRegistry::new();

    let sender = users::create_anonymous_user(&pool, Some("a"), None, None)
        .await
        .unwrap();
    let chat = store::create_chat(&pool, None, ChatKind::Anonymous)
        .await
        .unwrap();

    let empty = relay(&pool, &registry, chat.id, sender.id, "").await.unwrap_err();
    assert!(matches!(empty, ChatError::ValidationFailure(_)));

    let oversized = "x".repeat(hushmatch::chats::relay::MAX_MESSAGE_LEN + 1);
    let too_big = relay(&pool, &registry, chat.id, sender.id, &oversized)
        .await
        .unwrap_err();
    assert!(matches!(too_big, ChatError::ValidationFailure(_)));

    assert!(store::chat_messages(&pool, chat.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn message_limit_counts_characters_not_bytes() {
    let pool = common::test_pool().await;
    let registry = ConnectionRegistry::new();

    let sender = users::create_anonymous_user(&pool, Some("a"), None, None)
        .await
        .unwrap();
    let chat = store::create_chat(&pool, None, ChatKind::Anonymous)
        .await
        .unwrap();

    // at the limit in characters even though far past it in bytes
    let at_limit = "é".repeat(hushmatch::chats::relay::MAX_MESSAGE_LEN);
    relay(&pool, &registry, chat.id, sender.id, &at_limit).await.unwrap();

    let over = "é".repeat(hushmatch::chats::relay::MAX_MESSAGE_LEN + 1);
    let err = relay(&pool, &registry, chat.id, sender.id, &over)
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::ValidationFailure(_)));

    assert_eq!(store::chat_messages(&pool, chat.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn broadcast_survives_a_dead_connection() {
    let pool = common::test_pool().await;
    let registry = ConnectionRegistry::new();

    let sender = users::create_anonymous_user(&pool, Some("a"), None, None)
        .await
        .unwrap();
    let chat = store::create_chat(&pool, None, ChatKind::Anonymous)
        .await
        .unwrap();

    let (_dead, rx_dead) = registry.register(chat.id).await;
    let (_live, mut rx_live) = registry.register(chat.id).await;
    drop(rx_dead);

    relay(&pool, &registry, chat.id, sender.id, "still here").await.unwrap();

    let frame = recv_frame(&mut rx_live).await;
    assert_eq!(frame["content"], "Anonymous: still here");
    assert_eq!(registry.connection_count(chat.id).await, 1);
}
