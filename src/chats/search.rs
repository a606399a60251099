use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{AppResult, db::Chat};

#[derive(Debug, Default, Deserialize)]
pub struct GroupChatQuery {
    pub name: Option<String>,
    pub min_participants: Option<i64>,
    #[serde(default)]
    pub interests: Vec<String>,
}

/// Group chats the requester is not already in, filtered by name substring,
/// minimum member count and interest tags, in creation order.
pub async fn group_chats(
    pool: &SqlitePool,
    requester_id: i64,
    filter: &GroupChatQuery,
) -> AppResult<Vec<Chat>> {
    let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
        "SELECT c.id, c.name, c.kind, c.created_at FROM chats c \
         WHERE c.kind = 'GROUP' \
         AND NOT EXISTS (SELECT 1 FROM chat_users m WHERE m.chat_id = c.id AND m.user_id = ",
    );
    query.push_bind(requester_id);
    query.push(")");

    if let Some(name) = filter.name.as_deref().filter(|n| !n.is_empty()) {
        query.push(" AND c.name LIKE ");
        query.push_bind(format!("%{name}%"));
    }

    if let Some(min_participants) = filter.min_participants.filter(|&n| n > 0) {
        query.push(" AND (SELECT COUNT(*) FROM chat_users m WHERE m.chat_id = c.id) >= ");
        query.push_bind(min_participants);
    }

    if !filter.interests.is_empty() {
        query.push(
            " AND EXISTS (SELECT 1 FROM chat_interests ci \
             JOIN interests i ON i.id = ci.interest_id \
             WHERE ci.chat_id = c.id AND i.interest IN (",
        );
        let mut tags = query.separated(", ");
        for tag in &filter.interests {
            tags.push_bind(tag);
        }
        query.push("))");
    }

    query.push(" ORDER BY c.id");

    let chats = query.build_query_as::<Chat>().fetch_all(pool).await?;
    Ok(chats)
}
