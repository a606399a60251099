use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{AppResult, db::User, users};

pub const USER_ID: &str = "user_id";

/// Resolve the acting user from the session, if any. A stale id (e.g. a
/// destroyed anonymous identity) resolves to `None`, not an error.
pub async fn current_user(session: &Session, db_pool: &SqlitePool) -> AppResult<Option<User>> {
    let Some(user_id) = session.get::<i64>(USER_ID).await? else {
        return Ok(None);
    };

    users::get_user(db_pool, user_id).await
}
