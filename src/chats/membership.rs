use sqlx::SqlitePool;
use tracing::info;

use crate::{
    AppResult, ChatError,
    chats::store,
    db::{Chat, ChatKind, Role, User},
};

/// What `leave` did beyond removing the membership. `IdentityDestroyed`
/// tells the boundary to discard the caller's credentials.
#[derive(Debug, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left,
    IdentityDestroyed,
}

/// Join a group chat. Anonymous chats are only ever seated through the
/// matchmaker, never through this path.
pub async fn join(pool: &SqlitePool, user: &User, chat_id: i64) -> AppResult<Chat> {
    let chat = store::get_chat(pool, chat_id)
        .await?
        .ok_or(ChatError::NotFound("chat"))?;

    if chat.kind != ChatKind::Group {
        return Err(ChatError::InvalidOperation("can only join group chats"));
    }
    if store::is_member(pool, chat_id, user.id).await? {
        return Err(ChatError::AlreadyMember);
    }

    store::insert_membership(pool, chat_id, user.id).await?;
    info!(chat_id, user_id = user.id, "joined group chat");
    Ok(chat)
}

/// Leave a chat. Ordering matters: the membership is removed first, then an
/// emptied anonymous chat is torn down, then an anonymous leaver's identity
/// is destroyed. Once the membership delete has committed, a later failure
/// never rolls the leave back.
pub async fn leave(pool: &SqlitePool, user: &User, chat_id: i64) -> AppResult<LeaveOutcome> {
    let chat = store::get_chat(pool, chat_id)
        .await?
        .ok_or(ChatError::NotFound("chat"))?;

    let removed = store::delete_membership(pool, chat_id, user.id).await?;
    if removed == 0 {
        return Err(ChatError::NotMember);
    }
    info!(chat_id, user_id = user.id, "left chat");

    if chat.kind == ChatKind::Anonymous && store::member_count(pool, chat_id).await? == 0 {
        store::delete_chat_cascade(pool, chat_id).await?;
        info!(chat_id, "deleted empty anonymous chat");
    }

    if user.role == Role::Anonymous {
        crate::users::destroy_identity(pool, user.id).await?;
        return Ok(LeaveOutcome::IdentityDestroyed);
    }

    Ok(LeaveOutcome::Left)
}
