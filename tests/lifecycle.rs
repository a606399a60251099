mod common;

use hushmatch::ChatError;
use hushmatch::chats::matchmaker::{MatchFilter, find_or_create_anonymous_chat};
use hushmatch::chats::membership::{LeaveOutcome, join, leave};
use hushmatch::chats::store;
use hushmatch::db::ChatKind;
use hushmatch::users;

#[tokio::test]
async fn join_error_ladder() {
    let pool = common::test_pool().await;
    let user = common::named_user(&pool, "alice").await;

    let missing = join(&pool, &user, 999).await.unwrap_err();
    assert!(matches!(missing, ChatError::NotFound(_)));

    let anon_chat = store::create_chat(&pool, None, ChatKind::Anonymous)
        .await
        .unwrap();
    let wrong_kind = join(&pool, &user, anon_chat.id).await.unwrap_err();
    assert!(matches!(wrong_kind, ChatError::InvalidOperation(_)));

    let group = store::create_chat(&pool, Some("club"), ChatKind::Group)
        .await
        .unwrap();
    join(&pool, &user, group.id).await.unwrap();
    let twice = join(&pool, &user, group.id).await.unwrap_err();
    assert!(matches!(twice, ChatError::AlreadyMember));
}

#[tokio::test]
async fn leave_requires_membership() {
    let pool = common::test_pool().await;
    let user = common::named_user(&pool, "alice").await;
    let group = store::create_chat(&pool, Some("club"), ChatKind::Group)
        .await
        .unwrap();

    let err = leave(&pool, &user, group.id).await.unwrap_err();
    assert!(matches!(err, ChatError::NotMember));
}

#[tokio::test]
async fn group_chat_survives_its_last_member_leaving() {
    let pool = common::test_pool().await;
    let user = common::named_user(&pool, "alice").await;
    let group = store::create_chat(&pool, Some("club"), ChatKind::Group)
        .await
        .unwrap();
    join(&pool, &user, group.id).await.unwrap();

    let outcome = leave(&pool, &user, group.id).await.unwrap();
    assert_eq!(outcome, LeaveOutcome::Left);

    // empty, but still there — and the identity survives too
    assert!(store::get_chat(&pool, group.id).await.unwrap().is_some());
    assert_eq!(store::member_count(&pool, group.id).await.unwrap(), 0);
    assert!(users::get_user(&pool, user.id).await.unwrap().is_some());
}

#[tokio::test]
async fn empty_anonymous_chat_is_torn_down_with_tags_and_messages() {
    let pool = common::test_pool().await;

    let a = users::create_anonymous_user(&pool, Some("a"), None, None)
        .await
        .unwrap();
    let chat = find_or_create_anonymous_chat(
        &pool,
        &a,
        &MatchFilter {
            interests: vec!["music".into()],
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .chat;

    let b = users::create_anonymous_user(&pool, Some("b"), None, None)
        .await
        .unwrap();
    let matched = find_or_create_anonymous_chat(
        &pool,
        &b,
        &MatchFilter {
            interests: vec!["music".into()],
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(matched.chat.id, chat.id);

    store::insert_message(&pool, chat.id, a.id, "hi").await.unwrap();

    assert_eq!(leave(&pool, &a, chat.id).await.unwrap(), LeaveOutcome::IdentityDestroyed);
    // one member remains, so the chat is still alive
    assert!(store::get_chat(&pool, chat.id).await.unwrap().is_some());

    assert_eq!(leave(&pool, &b, chat.id).await.unwrap(), LeaveOutcome::IdentityDestroyed);

    // last member gone: chat, tags and messages are all gone with it
    assert!(store::get_chat(&pool, chat.id).await.unwrap().is_none());
    assert!(store::chat_interests(&pool, chat.id).await.unwrap().is_empty());
    assert!(store::chat_messages(&pool, chat.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn anonymous_leaver_is_destroyed_and_named_leaver_is_not() {
    let pool = common::test_pool().await;

    let anon = users::create_anonymous_user(&pool, Some("ghost"), None, None)
        .await
        .unwrap();
    let chat = find_or_create_anonymous_chat(&pool, &anon, &MatchFilter::default())
        .await
        .unwrap()
        .chat;

    let outcome = leave(&pool, &anon, chat.id).await.unwrap();
    assert_eq!(outcome, LeaveOutcome::IdentityDestroyed);
    assert!(users::get_user(&pool, anon.id).await.unwrap().is_none());

    let named = common::named_user(&pool, "alice").await;
    let group = store::create_chat(&pool, Some("club"), ChatKind::Group)
        .await
        .unwrap();
    join(&pool, &named, group.id).await.unwrap();
    assert_eq!(leave(&pool, &named, group.id).await.unwrap(), LeaveOutcome::Left);
    assert!(users::get_user(&pool, named.id).await.unwrap().is_some());
}

#[tokio::test]
async fn destroying_an_identity_sweeps_other_memberships_and_messages() {
    let pool = common::test_pool().await;

    let anon = users::create_anonymous_user(&pool, Some("ghost"), None, None)
        .await
        .unwrap();
    let solo = find_or_create_anonymous_chat(&pool, &anon, &MatchFilter::default())
        .await
        .unwrap()
        .chat;

    // the defensive sweep also covers a group membership held on the side
    let group = store::create_chat(&pool, Some("club"), ChatKind::Group)
        .await
        .unwrap();
    join(&pool, &anon, group.id).await.unwrap();
    store::insert_message(&pool, group.id, anon.id, "hello").await.unwrap();

    assert_eq!(leave(&pool, &anon, solo.id).await.unwrap(), LeaveOutcome::IdentityDestroyed);

    assert_eq!(store::member_count(&pool, group.id).await.unwrap(), 0);
    assert!(store::chat_messages(&pool, group.id).await.unwrap().is_empty());
    assert!(users::get_user(&pool, anon.id).await.unwrap().is_none());
}
