use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    AppResult, ChatError,
    chats::{registry::ConnectionRegistry, store},
    db::ChatKind,
    users,
};

pub const MAX_MESSAGE_LEN: usize = 2048;

/// Display label used in place of the sender's name in anonymous chats, so
/// no identity leaks to the other party.
pub const ANONYMOUS_LABEL: &str = "Anonymous";

#[derive(Serialize)]
struct OutboundFrame<'a> {
    r#type: &'static str,
    content: &'a str,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}

/// Persist an inbound message and fan it out to the chat's live connections.
/// The broadcast only happens after the insert succeeds; per-connection
/// delivery failures are the registry's problem, not ours.
pub async fn relay(
    pool: &SqlitePool,
    registry: &ConnectionRegistry,
    chat_id: i64,
    sender_id: i64,
    content: &str,
) -> AppResult<()> {
    if content.is_empty() {
        return Err(ChatError::ValidationFailure("empty message".to_string()));
    }
    if content.chars().count() > MAX_MESSAGE_LEN {
        return Err(ChatError::ValidationFailure(format!(
            "message exceeds {MAX_MESSAGE_LEN} characters"
        )));
    }

    let chat = store::get_chat(pool, chat_id)
        .await?
        .ok_or(ChatError::NotFound("chat"))?;
    let sender = users::get_user(pool, sender_id)
        .await?
        .ok_or(ChatError::NotFound("user"))?;

    let message = store::insert_message(pool, chat_id, sender_id, content).await?;

    let display = match chat.kind {
        ChatKind::Group => format!("{}: {}", sender.username, message.content),
        ChatKind::Anonymous => format!("{ANONYMOUS_LABEL}: {}", message.content),
    };
    let frame = serde_json::to_string(&OutboundFrame {
        r#type: "message",
        content: &display,
        timestamp: message.created_at,
    })?;

    debug!(chat_id, message_id = message.id, "relaying message");
    registry.broadcast(chat_id, &frame).await;
    Ok(())
}
