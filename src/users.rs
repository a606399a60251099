use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::{AppResult, db::{Role, User}};

pub async fn get_user(pool: &SqlitePool, user_id: i64) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, role, age, gender FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Create the short-lived identity behind an anonymous chat seat. The caller
/// is expected to destroy it again via [`destroy_identity`] when the user
/// leaves.
pub async fn create_anonymous_user(
    pool: &SqlitePool,
    nickname: Option<&str>,
    gender: Option<&str>,
    age: Option<i64>,
) -> AppResult<User> {
    let username = format!(
        "anon_{}_{}",
        nickname.unwrap_or("user"),
        Uuid::now_v7().simple()
    );

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (username, role, age, gender) VALUES (?, ?, ?, ?) \
         RETURNING id, username, role, age, gender",
    )
    .bind(&username)
    .bind(Role::Anonymous)
    .bind(age)
    .bind(gender)
    .fetch_one(pool)
    .await?;

    info!(user_id = user.id, username = %user.username, "created anonymous user");
    Ok(user)
}

/// Remove an anonymous user and everything they left behind: memberships in
/// any chat (defensive, they should hold at most one) and every message they
/// sent, then the user row itself.
pub async fn destroy_identity(pool: &SqlitePool, user_id: i64) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM chat_users WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM messages WHERE sender_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(user_id, "destroyed anonymous identity");
    Ok(())
}
