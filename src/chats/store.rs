use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::{
    AppResult,
    db::{Chat, ChatKind, Message, User},
};

/// A chat plus the relations the boundary layer serializes with it.
#[derive(Debug, Serialize)]
pub struct ChatView {
    #[serde(flatten)]
    pub chat: Chat,
    pub participants: Vec<User>,
    pub interests: Vec<String>,
}

pub async fn get_chat(pool: &SqlitePool, chat_id: i64) -> AppResult<Option<Chat>> {
    let chat = sqlx::query_as::<_, Chat>(
        "SELECT id, name, kind, created_at FROM chats WHERE id = ?",
    )
    .bind(chat_id)
    .fetch_optional(pool)
    .await?;

    Ok(chat)
}

pub async fn create_chat(
    pool: &SqlitePool,
    name: Option<&str>,
    kind: ChatKind,
) -> AppResult<Chat> {
    let chat = sqlx::query_as::<_, Chat>(
        "INSERT INTO chats (name, kind, created_at) VALUES (?, ?, ?) \
         RETURNING id, name, kind, created_at",
    )
    .bind(name)
    .bind(kind)
    .bind(OffsetDateTime::now_utc())
    .fetch_one(pool)
    .await?;

    Ok(chat)
}

pub async fn member_count(pool: &SqlitePool, chat_id: i64) -> AppResult<i64> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM chat_users WHERE chat_id = ?")
            .bind(chat_id)
            .fetch_one(pool)
            .await?;

    Ok(count)
}

pub async fn is_member(pool: &SqlitePool, chat_id: i64, user_id: i64) -> AppResult<bool> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM chat_users WHERE chat_id = ? AND user_id = ?")
            .bind(chat_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.is_some())
}

pub async fn insert_membership(pool: &SqlitePool, chat_id: i64, user_id: i64) -> AppResult<()> {
    sqlx::query("INSERT INTO chat_users (chat_id, user_id, joined_at) VALUES (?, ?, ?)")
        .bind(chat_id)
        .bind(user_id)
        .bind(OffsetDateTime::now_utc())
        .execute(pool)
        .await?;

    Ok(())
}

/// Returns the number of rows removed (0 when there was no membership).
pub async fn delete_membership(pool: &SqlitePool, chat_id: i64, user_id: i64) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM chat_users WHERE chat_id = ? AND user_id = ?")
        .bind(chat_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

pub async fn chat_members(pool: &SqlitePool, chat_id: i64) -> AppResult<Vec<User>> {
    let members = sqlx::query_as::<_, User>(
        "SELECT u.id, u.username, u.role, u.age, u.gender \
         FROM users u JOIN chat_users m ON m.user_id = u.id \
         WHERE m.chat_id = ? ORDER BY m.id",
    )
    .bind(chat_id)
    .fetch_all(pool)
    .await?;

    Ok(members)
}

/// Case-sensitive exact-label lookup, inserting the tag if it is new.
pub async fn get_or_create_interest(pool: &SqlitePool, label: &str) -> AppResult<i64> {
    sqlx::query("INSERT OR IGNORE INTO interests (interest) VALUES (?)")
        .bind(label)
        .execute(pool)
        .await?;

    let (id,): (i64,) = sqlx::query_as("SELECT id FROM interests WHERE interest = ?")
        .bind(label)
        .fetch_one(pool)
        .await?;

    Ok(id)
}

pub async fn tag_chat(pool: &SqlitePool, chat_id: i64, interest_id: i64) -> AppResult<()> {
    sqlx::query("INSERT OR IGNORE INTO chat_interests (chat_id, interest_id) VALUES (?, ?)")
        .bind(chat_id)
        .bind(interest_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn chat_interests(pool: &SqlitePool, chat_id: i64) -> AppResult<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT i.interest FROM interests i \
         JOIN chat_interests ci ON ci.interest_id = i.id \
         WHERE ci.chat_id = ? ORDER BY i.interest",
    )
    .bind(chat_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(label,)| label).collect())
}

pub async fn insert_message(
    pool: &SqlitePool,
    chat_id: i64,
    sender_id: i64,
    content: &str,
) -> AppResult<Message> {
    let message = sqlx::query_as::<_, Message>(
        "INSERT INTO messages (chat_id, sender_id, content, created_at) VALUES (?, ?, ?, ?) \
         RETURNING id, chat_id, sender_id, content, created_at",
    )
    .bind(chat_id)
    .bind(sender_id)
    .bind(content)
    .bind(OffsetDateTime::now_utc())
    .fetch_one(pool)
    .await?;

    Ok(message)
}

/// Message history in insertion order.
pub async fn chat_messages(pool: &SqlitePool, chat_id: i64) -> AppResult<Vec<Message>> {
    let messages = sqlx::query_as::<_, Message>(
        "SELECT id, chat_id, sender_id, content, created_at \
         FROM messages WHERE chat_id = ? ORDER BY id",
    )
    .bind(chat_id)
    .fetch_all(pool)
    .await?;

    Ok(messages)
}

/// Tear down an anonymous chat: tags and messages first, then the chat row.
pub async fn delete_chat_cascade(pool: &SqlitePool, chat_id: i64) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM chat_interests WHERE chat_id = ?")
        .bind(chat_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM messages WHERE chat_id = ?")
        .bind(chat_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chats WHERE id = ?")
        .bind(chat_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn chat_view(pool: &SqlitePool, chat: Chat) -> AppResult<ChatView> {
    let participants = chat_members(pool, chat.id).await?;
    let interests = chat_interests(pool, chat.id).await?;

    Ok(ChatView {
        chat,
        participants,
        interests,
    })
}
