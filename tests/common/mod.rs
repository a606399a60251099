#![allow(dead_code)]

use hushmatch::db::{self, User};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

/// One connection keeps every query on the same in-memory database.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    db::init_schema(&pool).await.expect("schema init");
    pool
}

/// A registered (non-anonymous) user, inserted directly; account CRUD is
/// outside the crate's surface.
pub async fn named_user(pool: &SqlitePool, username: &str) -> User {
    sqlx::query_as::<_, User>(
        "INSERT INTO users (username, role) VALUES (?, 'USER') \
         RETURNING id, username, role, age, gender",
    )
    .bind(username)
    .fetch_one(pool)
    .await
    .expect("insert user")
}
